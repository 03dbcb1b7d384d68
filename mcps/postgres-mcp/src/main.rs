//! PostgreSQL MCP Server binary
//!
//! Configuration comes from POSTGRES_* environment variables (or a `.env`
//! file) and the matching command-line flags; see `postgres-mcp --help`.

use postgres_mcp::PostgresMcpServer;

mcp_common::serve_stdio!(PostgresMcpServer, "postgres_mcp");
