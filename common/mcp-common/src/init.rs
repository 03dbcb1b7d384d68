//! Server startup
//!
//! Tracing goes to stderr because stdout carries the MCP protocol.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A server that can assemble itself from process configuration.
///
/// Returning an error from `bootstrap` aborts startup: `serve_stdio!`
/// propagates it out of `main` so the process exits non-zero before any
/// request is accepted.
pub trait Bootstrap: Sized {
    fn bootstrap() -> anyhow::Result<Self>;
}

/// Initialize tracing for an MCP server process.
///
/// `RUST_LOG` is honoured; `<crate_name>=info` is added on top of it.
/// Set `LOG_FORMAT=json` for one JSON object per line.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let json_lines = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if json_lines {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

/// Generate `main` for a stdio MCP server.
///
/// ```rust,ignore
/// mcp_common::serve_stdio!(PostgresMcpServer, "postgres_mcp");
/// ```
///
/// The generated `main` initializes tracing, calls
/// [`Bootstrap::bootstrap`](crate::Bootstrap::bootstrap), serves on stdio and
/// waits for the peer to disconnect.
#[macro_export]
macro_rules! serve_stdio {
    ($server_type:ty, $crate_name:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            use rmcp::ServiceExt;

            $crate::init_tracing($crate_name)?;

            tracing::info!(concat!("Starting ", $crate_name, " MCP Server"));

            let server = match <$server_type as $crate::Bootstrap>::bootstrap() {
                Ok(server) => server,
                Err(e) => {
                    tracing::error!("Startup failed: {:#}", e);
                    return Err(e);
                }
            };
            let service = server.serve(rmcp::transport::stdio()).await?;

            tracing::info!("Server running, waiting for requests...");

            service.waiting().await?;

            tracing::info!("Server shutting down");
            Ok(())
        }
    };
}
