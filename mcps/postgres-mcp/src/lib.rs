//! PostgreSQL MCP Library
//!
//! Schema introspection and guarded query execution for PostgreSQL via MCP.
//! Every caller-supplied statement passes the [`validator`] before the
//! [`Gateway`] sends it to the database; values travel as bound parameters.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use postgres_mcp::{build_pool, Gateway, QueryOptions, Settings};
//!
//! let settings = Arc::new(Settings::from_env()?);
//! let gateway = Gateway::new(build_pool(&settings)?, settings);
//! let result = gateway
//!     .execute_query("SELECT id FROM orders WHERE status = $1", &[json!("open")], QueryOptions::default())
//!     .await?;
//! ```
//!
//! # Usage as Binary
//!
//! Run directly: `POSTGRES_PASSWORD=... postgres-mcp`
//!
//! Or configure in `.mcp.json`:
//! ```json
//! { "mcpServers": { "postgres": { "command": "./postgres-mcp", "env": { "POSTGRES_PASSWORD": "..." } } } }
//! ```

pub mod bind;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod params;
pub mod pool;
pub mod server;
pub mod types;
pub mod validator;
pub mod values;
pub mod wire;

pub use config::{ConfigError, Settings, SslMode};
pub use gateway::Gateway;
pub use pool::{build_pool, PoolSetupError};
pub use server::PostgresMcpServer;
pub use types::*;
pub use validator::{validate, validate_identifier, ValidatedQuery, ValidationError};

// Re-export EmbeddableMcp trait for in-process usage
pub use mcp_common::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
