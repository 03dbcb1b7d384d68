//! Configuration for the PostgreSQL MCP server
//!
//! Every setting can come from a command-line flag or its environment
//! variable; a `.env` file in the working directory is read first by
//! [`Settings::from_env`]. Settings are validated once and are immutable
//! afterwards: the server holds them behind an `Arc`.

use std::fmt;
use std::time::Duration;

use clap::{builder::BoolishValueParser, ArgAction, Parser, ValueEnum};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("POSTGRES_PASSWORD is required")]
    MissingPassword,

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error(transparent)]
    Args(#[from] clap::Error),
}

/// libpq-style `sslmode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// TLS is attempted for every mode except `disable`.
    pub fn uses_tls(self) -> bool {
        self != SslMode::Disable
    }

    /// Whether the server certificate chain must validate.
    pub fn verifies_certificate(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }

    /// Whether the certificate must also match the host name.
    pub fn verifies_hostname(self) -> bool {
        self == SslMode::VerifyFull
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        };
        f.write_str(name)
    }
}

/// Raw command-line / environment input
#[derive(Parser, Clone)]
#[command(name = "postgres-mcp")]
#[command(about = "MCP server for PostgreSQL introspection and guarded query execution")]
#[command(version)]
pub struct Args {
    /// Database host
    #[arg(long, env = "POSTGRES_HOST", default_value = "localhost")]
    pub host: String,

    /// Database port
    #[arg(long, env = "POSTGRES_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database user
    #[arg(long, env = "POSTGRES_USER", default_value = "postgres")]
    pub user: String,

    /// Database password (required)
    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name
    #[arg(long, env = "POSTGRES_DB", default_value = "postgres")]
    pub database: String,

    /// TLS mode: disable, allow, prefer, require, verify-ca, verify-full
    #[arg(long, env = "POSTGRES_SSLMODE", value_enum, default_value_t = SslMode::Prefer)]
    pub sslmode: SslMode,

    /// Permit INSERT/UPDATE/DELETE/DDL through the query tool
    #[arg(
        long,
        env = "ALLOW_WRITE_OPERATIONS",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub allow_write_operations: bool,

    /// Server-side statement timeout in seconds
    #[arg(long, env = "QUERY_TIMEOUT", default_value_t = 30)]
    pub query_timeout: u64,

    /// Maximum rows returned by a single query
    #[arg(long, env = "MAX_ROWS", default_value_t = 1000)]
    pub max_rows: usize,

    /// Maximum pooled connections
    #[arg(long, env = "POSTGRES_POOL_SIZE", default_value_t = 10)]
    pub pool_size: usize,
}

/// Validated, immutable server settings
#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub sslmode: SslMode,
    pub allow_write_operations: bool,
    pub query_timeout: Duration,
    pub max_rows: usize,
    pub pool_size: usize,
}

impl Settings {
    /// Load `.env`, then read flags and environment variables.
    ///
    /// `--help`, `--version` and malformed flags exit the process the way
    /// clap normally does.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::info!("Loaded environment from {}", path.display());
        }
        Self::try_from(Args::parse())
    }

    /// Parse an explicit argument list.
    ///
    /// Intended for tests and embedding; no `.env` file is read.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_from(Args::try_parse_from(args)?)
    }
}

impl TryFrom<Args> for Settings {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let password = args
            .password
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassword)?;

        if args.query_timeout == 0 {
            return Err(ConfigError::NotPositive("QUERY_TIMEOUT"));
        }
        if args.max_rows == 0 {
            return Err(ConfigError::NotPositive("MAX_ROWS"));
        }
        if args.pool_size == 0 {
            return Err(ConfigError::NotPositive("POSTGRES_POOL_SIZE"));
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            user: args.user,
            password,
            database: args.database,
            sslmode: args.sslmode,
            allow_write_operations: args.allow_write_operations,
            query_timeout: Duration::from_secs(args.query_timeout),
            max_rows: args.max_rows,
            pool_size: args.pool_size,
        })
    }
}

// Keeps the password out of logs and panic messages.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("sslmode", &self.sslmode)
            .field("allow_write_operations", &self.allow_write_operations)
            .field("query_timeout", &self.query_timeout)
            .field("max_rows", &self.max_rows)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Flags override any POSTGRES_* variables present in the test environment.
    fn parse(extra: &[&str]) -> Result<Settings, ConfigError> {
        let mut args = vec![
            "postgres-mcp",
            "--host",
            "db.internal",
            "--port",
            "5433",
            "--user",
            "reporter",
            "--database",
            "analytics",
        ];
        args.extend_from_slice(extra);
        Settings::try_parse_from(args)
    }

    #[test]
    fn test_explicit_values() {
        let settings = parse(&[
            "--password",
            "test_fake_password_123",
            "--sslmode",
            "verify-full",
            "--allow-write-operations",
            "true",
            "--query-timeout",
            "5",
            "--max-rows",
            "50",
            "--pool-size",
            "2",
        ])
        .unwrap();

        assert_eq!(settings.host, "db.internal");
        assert_eq!(settings.port, 5433);
        assert_eq!(settings.user, "reporter");
        assert_eq!(settings.database, "analytics");
        assert_eq!(settings.sslmode, SslMode::VerifyFull);
        assert!(settings.allow_write_operations);
        assert_eq!(settings.query_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_rows, 50);
        assert_eq!(settings.pool_size, 2);
    }

    #[test]
    fn test_boolish_write_flag() {
        let settings = parse(&["--password", "x", "--allow-write-operations", "yes"]).unwrap();
        assert!(settings.allow_write_operations);
        let settings = parse(&["--password", "x", "--allow-write-operations", "0"]).unwrap();
        assert!(!settings.allow_write_operations);
    }

    #[test]
    fn test_empty_password_rejected() {
        let err = parse(&["--password", ""]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPassword));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = parse(&["--password", "x", "--max-rows", "0"]).unwrap_err();
        assert_eq!(err.to_string(), "MAX_ROWS must be greater than zero");
        let err = parse(&["--password", "x", "--query-timeout", "0"]).unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive("QUERY_TIMEOUT")));
    }

    #[test]
    fn test_invalid_sslmode_rejected() {
        let err = parse(&["--password", "x", "--sslmode", "sometimes"]).unwrap_err();
        assert!(matches!(err, ConfigError::Args(_)));
    }

    #[test]
    fn test_debug_hides_password() {
        let settings = parse(&["--password", "test_fake_password_123"]).unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("test_fake_password_123"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_sslmode_policy() {
        assert!(!SslMode::Disable.uses_tls());
        assert!(SslMode::Prefer.uses_tls());
        assert!(!SslMode::Require.verifies_certificate());
        assert!(SslMode::VerifyCa.verifies_certificate());
        assert!(!SslMode::VerifyCa.verifies_hostname());
        assert!(SslMode::VerifyFull.verifies_hostname());
        assert_eq!(SslMode::VerifyFull.to_string(), "verify-full");
    }
}
