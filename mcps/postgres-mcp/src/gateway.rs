//! Execution gateway
//!
//! Owns the connection pool and is the only path by which caller SQL reaches
//! the database. Each operation validates first, then borrows one pooled
//! connection for its own duration; the connection goes back to the pool when
//! the guard drops, whether the operation succeeded or not.

use std::fmt;
use std::sync::Arc;

use deadpool_postgres::{GenericClient, Object, Pool};
use futures_util::{pin_mut, TryStreamExt};
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tracing::instrument;

use crate::bind::bind_params;
use crate::config::Settings;
use crate::types::{ExecutionResult, ExplainResult, GatewayError, QueryOptions};
use crate::validator::{validate, ValidatedQuery, ValidationError};
use crate::values::row_to_json;

/// Query execution and catalog access over a shared pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Gateway {
    pool: Pool,
    settings: Arc<Settings>,
}

impl Gateway {
    pub fn new(pool: Pool, settings: Arc<Settings>) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate and run caller-supplied SQL.
    ///
    /// Statements that describe result columns (`SELECT`, `WITH … SELECT`,
    /// `SHOW`, `EXPLAIN`, `… RETURNING`) come back as rows capped at
    /// `max_rows`; everything else reports its affected-row count.
    ///
    /// Without write permission the statement runs inside a `READ ONLY`
    /// transaction, so a write hidden behind an allowed keyword
    /// (`EXPLAIN ANALYZE DELETE …`, `WITH d AS (DELETE …) SELECT …`) is
    /// refused by the server.
    #[instrument(skip(self, query, params), fields(param_count = params.len()))]
    pub async fn execute_query(
        &self,
        query: &str,
        params: &[Value],
        options: QueryOptions,
    ) -> Result<ExecutionResult, GatewayError> {
        let max_rows = options.max_rows.unwrap_or(self.settings.max_rows).max(1);
        let allow_write = options
            .allow_write
            .unwrap_or(self.settings.allow_write_operations);

        let validated = self.check(query, allow_write)?;

        let mut client = self.client().await?;
        if allow_write {
            return self.dispatch(&client, &validated, params, max_rows).await;
        }

        let tx = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(|e| self.driver_error(&e))?;
        let result = self.dispatch(&tx, &validated, params, max_rows).await?;
        tx.commit().await.map_err(|e| self.driver_error(&e))?;
        Ok(result)
    }

    async fn dispatch<C: GenericClient>(
        &self,
        client: &C,
        validated: &ValidatedQuery,
        params: &[Value],
        max_rows: usize,
    ) -> Result<ExecutionResult, GatewayError> {
        let statement = client
            .prepare(validated.as_str())
            .await
            .map_err(|e| self.driver_error(&e))?;

        let bound = bind_params(params, statement.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        if statement.columns().is_empty() {
            let affected = client
                .execute(&statement, &refs)
                .await
                .map_err(|e| self.driver_error(&e))?;
            tracing::info!(keyword = %validated.keyword(), affected, "Statement executed");
            return Ok(ExecutionResult::affected(affected));
        }

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let stream = client
            .query_raw(&statement, refs.iter().copied())
            .await
            .map_err(|e| self.driver_error(&e))?;
        pin_mut!(stream);

        // One row past the cap is enough to know the result was truncated.
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await.map_err(|e| self.driver_error(&e))? {
            rows.push(row_to_json(&row));
            if rows.len() > max_rows {
                break;
            }
        }

        let result = ExecutionResult::from_rows(columns, rows, max_rows);
        tracing::info!(
            keyword = %validated.keyword(),
            rows = result.row_count,
            truncated = result.truncated,
            "Query returned rows"
        );
        Ok(result)
    }

    /// Fetch the JSON execution plan for a read query.
    ///
    /// The query is validated as read-only and explained inside a
    /// `READ ONLY` transaction even when the server allows writes:
    /// `EXPLAIN ANALYZE` runs the statement, so anything else would let a
    /// write through. With `analyze` the statement really executes and
    /// costs what it costs.
    #[instrument(skip(self, query))]
    pub async fn explain_query(
        &self,
        query: &str,
        analyze: bool,
    ) -> Result<ExplainResult, GatewayError> {
        let validated = self.check(query, false)?;
        let sql = explain_sql(&validated, analyze);

        let mut client = self.client().await?;
        let tx = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(|e| self.driver_error(&e))?;
        let rows = tx
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| self.driver_error(&e))?;
        tx.commit().await.map_err(|e| self.driver_error(&e))?;

        let Some(row) = rows.first() else {
            return Ok(ExplainResult::Failure(
                "EXPLAIN returned no plan".to_string(),
            ));
        };
        let plan: Value = row.try_get(0).map_err(|e| self.driver_error(&e))?;
        Ok(ExplainResult::Plan(plan))
    }

    /// Borrow a pooled connection for the duration of one operation.
    pub(crate) async fn client(&self) -> Result<Object, GatewayError> {
        self.pool.get().await.map_err(|e| {
            let message = scrub_secret(&e.to_string(), &self.settings.password);
            tracing::error!("Connection pool error: {}", message);
            GatewayError::Pool(message)
        })
    }

    /// Wrap a driver failure, never letting the password through.
    pub(crate) fn driver_error(&self, err: &tokio_postgres::Error) -> GatewayError {
        let message = scrub_secret(&describe_pg_error(err), &self.settings.password);
        tracing::error!("Database error: {}", message);
        GatewayError::Execution(message)
    }

    fn check(&self, query: &str, allow_write: bool) -> Result<ValidatedQuery, ValidationError> {
        validate(query, allow_write).inspect_err(|e| {
            tracing::warn!(allow_write, "Query rejected: {}", e);
        })
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("pool", &self.pool.status())
            .field("settings", &self.settings)
            .finish()
    }
}

fn explain_sql(query: &ValidatedQuery, analyze: bool) -> String {
    let options = if analyze {
        "FORMAT JSON, ANALYZE, BUFFERS"
    } else {
        "FORMAT JSON"
    };
    format!("EXPLAIN ({}) {}", options, query)
}

/// Server errors carry severity, message, detail and hint; everything else
/// uses the driver's own text.
fn describe_pg_error(err: &tokio_postgres::Error) -> String {
    let Some(db) = err.as_db_error() else {
        return err.to_string();
    };
    let mut message = format!("{}: {}", db.severity(), db.message());
    if let Some(detail) = db.detail() {
        message.push_str(&format!(" (DETAIL: {})", detail));
    }
    if let Some(hint) = db.hint() {
        message.push_str(&format!(" (HINT: {})", hint));
    }
    message
}

pub(crate) fn scrub_secret(message: &str, secret: &str) -> String {
    if secret.is_empty() {
        message.to_string()
    } else {
        message.replace(secret, "***")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::build_pool;
    use serde_json::json;

    // Nothing listens on port 1; any test that gets past validation fails
    // with a pool error instead.
    pub(crate) fn unreachable_gateway(allow_write: bool) -> Gateway {
        let args = [
            "postgres-mcp",
            "--host",
            "127.0.0.1",
            "--port",
            "1",
            "--password",
            "test_fake_password_123",
            "--sslmode",
            "disable",
            "--allow-write-operations",
            if allow_write { "true" } else { "false" },
        ];
        let settings = Arc::new(Settings::try_parse_from(args).unwrap());
        let pool = build_pool(&settings).unwrap();
        Gateway::new(pool, settings)
    }

    #[tokio::test]
    async fn test_execute_rejects_before_connecting() {
        let gateway = unreachable_gateway(false);
        let err = gateway
            .execute_query("DROP TABLE customers", &[], QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::WriteNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn test_stacked_statement_rejected_even_with_writes() {
        let gateway = unreachable_gateway(true);
        let err = gateway
            .execute_query("SELECT 1; DROP TABLE x", &[], QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::DangerousPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_explain_ignores_write_setting() {
        let gateway = unreachable_gateway(true);
        assert!(gateway.settings().allow_write_operations);
        let err = gateway
            .explain_query("DELETE FROM orders", true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::WriteNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn test_call_option_overrides_write_setting() {
        let gateway = unreachable_gateway(true);
        let options = QueryOptions {
            allow_write: Some(false),
            max_rows: None,
        };
        let err = gateway
            .execute_query("INSERT INTO t VALUES (1)", &[json!(1)], options)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_valid_query_reaches_pool() {
        let gateway = unreachable_gateway(false);
        let err = gateway
            .execute_query("SELECT 1", &[], QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Pool(_)));
        assert!(!err.to_string().contains("test_fake_password_123"));
    }

    #[test]
    fn test_explain_sql() {
        let q = validate("SELECT * FROM orders", false).unwrap();
        assert_eq!(explain_sql(&q, false), "EXPLAIN (FORMAT JSON) SELECT * FROM orders");
        assert_eq!(
            explain_sql(&q, true),
            "EXPLAIN (FORMAT JSON, ANALYZE, BUFFERS) SELECT * FROM orders"
        );
    }

    #[test]
    fn test_scrub_secret() {
        assert_eq!(
            scrub_secret("password authentication failed: hunter2", "hunter2"),
            "password authentication failed: ***"
        );
        assert_eq!(scrub_secret("no secret here", ""), "no secret here");
    }
}
