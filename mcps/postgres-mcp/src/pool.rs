//! Connection pool construction

use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_native_tls::MakeTlsConnector;
use thiserror::Error;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::NoTls;

use crate::config::{Settings, SslMode};

const APPLICATION_NAME: &str = "postgres-mcp";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PoolSetupError {
    #[error("Failed to configure TLS: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Failed to build connection pool: {0}")]
    Build(String),
}

/// Driver configuration for `settings`.
///
/// The statement timeout is applied as a session option so the server
/// cancels long-running statements itself.
pub fn pg_config(settings: &Settings) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&settings.host)
        .port(settings.port)
        .user(&settings.user)
        .password(&settings.password)
        .dbname(&settings.database)
        .application_name(APPLICATION_NAME)
        .connect_timeout(CONNECT_TIMEOUT)
        .options(&format!(
            "-c statement_timeout={}",
            settings.query_timeout.as_millis()
        ))
        .ssl_mode(driver_ssl_mode(settings.sslmode));
    config
}

/// The driver only distinguishes disable / prefer / require; certificate
/// checks are the TLS connector's job.
///
/// `allow` maps to `prefer`: TLS is tried first and plaintext is the
/// fallback, where libpq's `allow` tries plaintext first.
fn driver_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow | SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => PgSslMode::Require,
    }
}

/// Connections are reset on every checkout (`RESET ALL`, `SET SESSION
/// AUTHORIZATION DEFAULT`, `DISCARD TEMP`, ...), so a `SET` issued by one
/// operation never reaches the next one and the startup statement timeout
/// is restored.
fn manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Clean,
    }
}

/// Build the pool. No connection is opened until the first checkout.
pub fn build_pool(settings: &Settings) -> Result<Pool, PoolSetupError> {
    let config = pg_config(settings);
    let manager_config = manager_config();

    let manager = if settings.sslmode.uses_tls() {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!settings.sslmode.verifies_certificate())
            .danger_accept_invalid_hostnames(!settings.sslmode.verifies_hostname())
            .build()?;
        Manager::from_config(config, MakeTlsConnector::new(connector), manager_config)
    } else {
        Manager::from_config(config, NoTls, manager_config)
    };

    let pool = Pool::builder(manager)
        .max_size(settings.pool_size)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(settings.query_timeout))
        .create_timeout(Some(CONNECT_TIMEOUT))
        .build()
        .map_err(|e| PoolSetupError::Build(e.to_string()))?;

    tracing::info!(
        host = %settings.host,
        port = settings.port,
        database = %settings.database,
        sslmode = %settings.sslmode,
        pool_size = settings.pool_size,
        "Connection pool configured"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::config::Host;

    fn settings(sslmode: &str) -> Settings {
        Settings::try_parse_from([
            "postgres-mcp",
            "--host",
            "db.internal",
            "--port",
            "6543",
            "--user",
            "reporter",
            "--database",
            "analytics",
            "--password",
            "test_fake_password_123",
            "--sslmode",
            sslmode,
            "--query-timeout",
            "7",
            "--pool-size",
            "3",
        ])
        .unwrap()
    }

    #[test]
    fn test_pg_config_fields() {
        let config = pg_config(&settings("require"));
        assert_eq!(config.get_hosts(), &[Host::Tcp("db.internal".to_string())]);
        assert_eq!(config.get_ports(), &[6543]);
        assert_eq!(config.get_user(), Some("reporter"));
        assert_eq!(config.get_dbname(), Some("analytics"));
        assert_eq!(config.get_application_name(), Some("postgres-mcp"));
        assert_eq!(config.get_options(), Some("-c statement_timeout=7000"));
        assert_eq!(config.get_connect_timeout(), Some(&CONNECT_TIMEOUT));
        assert_eq!(config.get_ssl_mode(), PgSslMode::Require);
    }

    #[test]
    fn test_driver_ssl_modes() {
        assert_eq!(driver_ssl_mode(SslMode::Disable), PgSslMode::Disable);
        assert_eq!(driver_ssl_mode(SslMode::Allow), PgSslMode::Prefer);
        assert_eq!(driver_ssl_mode(SslMode::Prefer), PgSslMode::Prefer);
        assert_eq!(driver_ssl_mode(SslMode::VerifyCa), PgSslMode::Require);
        assert_eq!(driver_ssl_mode(SslMode::VerifyFull), PgSslMode::Require);
    }

    #[test]
    fn test_checkout_resets_session_state() {
        let reset = manager_config().recycling_method.query().map(str::to_string);
        let reset = reset.unwrap_or_default();
        assert!(reset.contains("RESET ALL"));
        assert!(reset.contains("SET SESSION AUTHORIZATION DEFAULT"));
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        let pool = build_pool(&settings("disable")).unwrap();
        let status = pool.status();
        assert_eq!(status.max_size, 3);
        assert_eq!(status.size, 0);
    }
}
