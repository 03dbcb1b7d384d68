//! Catalog introspection
//!
//! Fixed queries against `information_schema` and `pg_catalog`. Caller
//! supplied names are checked with [`validate_identifier`] and then bound as
//! parameters; the exact row count in [`Gateway::get_table_stats`] is the one
//! statement that splices a (quoted) identifier into SQL text.

use deadpool_postgres::Object;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::instrument;

use crate::gateway::Gateway;
use crate::types::{
    ColumnDescription, ColumnMatch, Constraint, ConstraintRow, DatabaseInfo, ForeignKey,
    FunctionInfo, GatewayError, IndexInfo, SchemaInfo, TableDescription, TableInfo, TableStats,
    TableStatsDetails, ViewDescription, ViewInfo,
};
use crate::validator::{escape_like_pattern, quote_identifier, sanitize_limit, validate_identifier};

// ============================================================================
// Queries
// ============================================================================

const LIST_SCHEMAS_SQL: &str = "
    SELECT schema_name::text AS schema_name, schema_owner::text AS schema_owner
    FROM information_schema.schemata
    WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
      AND schema_name NOT LIKE 'pg\\_temp\\_%'
      AND schema_name NOT LIKE 'pg\\_toast\\_temp\\_%'
    ORDER BY schema_name";

const LIST_TABLES_SQL: &str = "
    SELECT table_name::text AS table_name, table_type::text AS table_type
    FROM information_schema.tables
    WHERE table_schema::text = $1
    ORDER BY table_name";

const LIST_VIEWS_SQL: &str = "
    SELECT table_name::text AS table_name, (is_updatable::text = 'YES') AS is_updatable
    FROM information_schema.views
    WHERE table_schema::text = $1
    ORDER BY table_name";

const LIST_FUNCTIONS_SQL: &str = "
    SELECT p.proname::text AS function_name,
           pg_get_function_arguments(p.oid) AS arguments,
           pg_get_function_result(p.oid) AS return_type,
           CASE p.prokind
               WHEN 'f' THEN 'function'
               WHEN 'p' THEN 'procedure'
               WHEN 'a' THEN 'aggregate'
               WHEN 'w' THEN 'window'
           END AS function_type,
           l.lanname::text AS language
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    JOIN pg_language l ON l.oid = p.prolang
    WHERE n.nspname::text = $1
    ORDER BY p.proname, arguments";

const COLUMNS_SQL: &str = "
    SELECT column_name::text AS column_name,
           data_type::text AS data_type,
           (is_nullable::text = 'YES') AS is_nullable,
           column_default::text AS column_default,
           character_maximum_length::int4 AS character_maximum_length,
           numeric_precision::int4 AS numeric_precision,
           numeric_scale::int4 AS numeric_scale
    FROM information_schema.columns
    WHERE table_schema::text = $1 AND table_name::text = $2
    ORDER BY ordinal_position";

const PRIMARY_KEYS_SQL: &str = "
    SELECT kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
     AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
      AND tc.table_schema::text = $1
      AND tc.table_name::text = $2
    ORDER BY kcu.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "
    SELECT kcu.column_name::text AS column_name,
           ccu.table_schema::text AS foreign_table_schema,
           ccu.table_name::text AS foreign_table_name,
           ccu.column_name::text AS foreign_column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.constraint_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_schema::text = $1
      AND tc.table_name::text = $2
    ORDER BY kcu.ordinal_position";

const VIEW_DEFINITION_SQL: &str = "
    SELECT view_definition::text AS view_definition
    FROM information_schema.views
    WHERE table_schema::text = $1 AND table_name::text = $2";

const LIST_INDEXES_SQL: &str = "
    SELECT i.relname::text AS index_name,
           pg_get_indexdef(ix.indexrelid) AS index_definition,
           ix.indisunique AS is_unique,
           ix.indisprimary AS is_primary,
           COALESCE(
               array_agg(a.attname::text ORDER BY k.ord) FILTER (WHERE a.attname IS NOT NULL),
               ARRAY[]::text[]
           ) AS columns,
           pg_size_pretty(pg_relation_size(ix.indexrelid)) AS index_size
    FROM pg_index ix
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
    LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname::text = $1 AND t.relname::text = $2
    GROUP BY i.relname, ix.indexrelid, ix.indisunique, ix.indisprimary
    ORDER BY i.relname";

// One row per (constraint, column), in key order.
const LIST_CONSTRAINTS_SQL: &str = "
    SELECT c.conname::text AS constraint_name,
           CASE c.contype
               WHEN 'p' THEN 'PRIMARY KEY'
               WHEN 'f' THEN 'FOREIGN KEY'
               WHEN 'u' THEN 'UNIQUE'
               WHEN 'c' THEN 'CHECK'
               WHEN 'x' THEN 'EXCLUDE'
               WHEN 'n' THEN 'NOT NULL'
               ELSE c.contype::text
           END AS constraint_type,
           a.attname::text AS column_name,
           ft.relname::text AS foreign_table_name,
           fa.attname::text AS foreign_column_name,
           CASE WHEN c.contype = 'c' THEN pg_get_constraintdef(c.oid) END AS check_clause
    FROM pg_constraint c
    JOIN pg_class t ON t.oid = c.conrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    LEFT JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord) ON true
    LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    LEFT JOIN pg_class ft ON ft.oid = c.confrelid
    LEFT JOIN pg_attribute fa ON fa.attrelid = c.confrelid AND fa.attnum = c.confkey[k.ord::int]
    WHERE n.nspname::text = $1 AND t.relname::text = $2
    ORDER BY c.conname, k.ord";

const TABLE_STATS_SQL: &str = "
    SELECT GREATEST(c.reltuples, 0)::int8 AS estimated_rows,
           pg_size_pretty(pg_total_relation_size(c.oid)) AS total_size,
           pg_size_pretty(pg_relation_size(c.oid)) AS table_size,
           pg_size_pretty(pg_indexes_size(c.oid)) AS indexes_size,
           s.seq_scan::int8 AS sequential_scans,
           s.idx_scan::int8 AS index_scans,
           s.n_live_tup::int8 AS live_tuples,
           s.n_dead_tup::int8 AS dead_tuples,
           s.last_vacuum,
           s.last_autovacuum,
           s.last_analyze,
           s.last_autoanalyze
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_stat_user_tables s ON s.relid = c.oid
    WHERE n.nspname::text = $1
      AND c.relname::text = $2
      AND c.relkind IN ('r', 'p', 'm')";

const SEARCH_COLUMNS_SQL: &str = r"
    SELECT table_schema::text AS table_schema,
           table_name::text AS table_name,
           column_name::text AS column_name,
           data_type::text AS data_type
    FROM information_schema.columns
    WHERE column_name::text ILIKE $1 ESCAPE '\'
      AND ($2::text IS NULL OR table_schema::text = $2::text)
      AND table_schema::text NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_schema, table_name, ordinal_position
    LIMIT $3";

const DATABASE_INFO_SQL: &str = "
    SELECT current_database()::text AS database,
           version() AS version,
           current_user::text AS current_user,
           current_setting('server_encoding') AS server_encoding,
           current_setting('TimeZone') AS timezone,
           pg_size_pretty(pg_database_size(current_database())) AS size,
           current_setting('max_connections')::int4 AS max_connections,
           (SELECT count(*) FROM pg_stat_activity WHERE datname = current_database())
               AS active_connections";

// ============================================================================
// Operations
// ============================================================================

impl Gateway {
    #[instrument(skip(self))]
    pub async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, GatewayError> {
        let client = self.client().await?;
        let rows = self.fetch(&client, LIST_SCHEMAS_SQL, &[]).await?;
        self.decode(&rows, |row| {
            Ok(SchemaInfo {
                schema_name: row.try_get("schema_name")?,
                schema_owner: row.try_get("schema_owner")?,
            })
        })
    }

    #[instrument(skip(self))]
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<TableInfo>, GatewayError> {
        validate_identifier(schema)?;
        let client = self.client().await?;
        let rows = self.fetch(&client, LIST_TABLES_SQL, &[&schema]).await?;
        self.decode(&rows, |row| {
            Ok(TableInfo {
                table_name: row.try_get("table_name")?,
                table_type: row.try_get("table_type")?,
            })
        })
    }

    #[instrument(skip(self))]
    pub async fn list_views(&self, schema: &str) -> Result<Vec<ViewInfo>, GatewayError> {
        validate_identifier(schema)?;
        let client = self.client().await?;
        let rows = self.fetch(&client, LIST_VIEWS_SQL, &[&schema]).await?;
        self.decode(&rows, |row| {
            Ok(ViewInfo {
                table_name: row.try_get("table_name")?,
                is_updatable: row.try_get("is_updatable")?,
            })
        })
    }

    #[instrument(skip(self))]
    pub async fn list_functions(&self, schema: &str) -> Result<Vec<FunctionInfo>, GatewayError> {
        validate_identifier(schema)?;
        let client = self.client().await?;
        let rows = self.fetch(&client, LIST_FUNCTIONS_SQL, &[&schema]).await?;
        self.decode(&rows, |row| {
            Ok(FunctionInfo {
                function_name: row.try_get("function_name")?,
                arguments: row.try_get("arguments")?,
                return_type: row.try_get("return_type")?,
                function_type: row.try_get("function_type")?,
                language: row.try_get("language")?,
            })
        })
    }

    /// Columns, primary key and foreign keys of a table.
    ///
    /// A table with no visible columns is reported as `found: false`.
    #[instrument(skip(self))]
    pub async fn describe_table(
        &self,
        table: &str,
        schema: &str,
    ) -> Result<TableDescription, GatewayError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        let client = self.client().await?;

        let primary_keys: Vec<String> = {
            let rows = self.fetch(&client, PRIMARY_KEYS_SQL, &[&schema, &table]).await?;
            self.decode(&rows, |row| row.try_get("column_name"))?
        };
        let mut columns = self.columns(&client, schema, table).await?;
        for column in &mut columns {
            column.is_primary_key = primary_keys.contains(&column.column_name);
        }
        let foreign_keys = {
            let rows = self.fetch(&client, FOREIGN_KEYS_SQL, &[&schema, &table]).await?;
            self.decode(&rows, |row| {
                Ok(ForeignKey {
                    column_name: row.try_get("column_name")?,
                    foreign_table_schema: row.try_get("foreign_table_schema")?,
                    foreign_table_name: row.try_get("foreign_table_name")?,
                    foreign_column_name: row.try_get("foreign_column_name")?,
                })
            })?
        };

        Ok(TableDescription {
            found: !columns.is_empty(),
            schema: schema.to_string(),
            table_name: table.to_string(),
            columns,
            primary_keys,
            foreign_keys,
        })
    }

    #[instrument(skip(self))]
    pub async fn describe_view(
        &self,
        view: &str,
        schema: &str,
    ) -> Result<ViewDescription, GatewayError> {
        validate_identifier(schema)?;
        validate_identifier(view)?;
        let client = self.client().await?;

        let rows = self.fetch(&client, VIEW_DEFINITION_SQL, &[&schema, &view]).await?;
        let Some(row) = rows.first() else {
            return Ok(ViewDescription {
                found: false,
                schema: schema.to_string(),
                view_name: view.to_string(),
                definition: None,
                columns: Vec::new(),
            });
        };
        let definition: Option<String> = row
            .try_get("view_definition")
            .map_err(|e| self.driver_error(&e))?;
        let columns = self.columns(&client, schema, view).await?;

        Ok(ViewDescription {
            found: true,
            schema: schema.to_string(),
            view_name: view.to_string(),
            definition,
            columns,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_indexes(&self, table: &str, schema: &str) -> Result<Vec<IndexInfo>, GatewayError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        let client = self.client().await?;
        let rows = self.fetch(&client, LIST_INDEXES_SQL, &[&schema, &table]).await?;
        self.decode(&rows, |row| {
            Ok(IndexInfo {
                index_name: row.try_get("index_name")?,
                index_definition: row.try_get("index_definition")?,
                is_unique: row.try_get("is_unique")?,
                is_primary: row.try_get("is_primary")?,
                columns: row.try_get("columns")?,
                index_size: row.try_get("index_size")?,
            })
        })
    }

    #[instrument(skip(self))]
    pub async fn list_constraints(
        &self,
        table: &str,
        schema: &str,
    ) -> Result<Vec<Constraint>, GatewayError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        let client = self.client().await?;
        let rows = self.fetch(&client, LIST_CONSTRAINTS_SQL, &[&schema, &table]).await?;
        let rows = self.decode(&rows, |row| {
            Ok(ConstraintRow {
                constraint_name: row.try_get("constraint_name")?,
                constraint_type: row.try_get("constraint_type")?,
                column_name: row.try_get("column_name")?,
                foreign_table_name: row.try_get("foreign_table_name")?,
                foreign_column_name: row.try_get("foreign_column_name")?,
                check_clause: row.try_get("check_clause")?,
            })
        })?;
        Ok(group_constraints(rows))
    }

    /// Sizes, planner estimate, scan counters and an exact row count.
    ///
    /// The exact count scans the whole table.
    #[instrument(skip(self))]
    pub async fn get_table_stats(&self, table: &str, schema: &str) -> Result<TableStats, GatewayError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        let client = self.client().await?;

        let rows = self.fetch(&client, TABLE_STATS_SQL, &[&schema, &table]).await?;
        let Some(row) = rows.first() else {
            return Ok(TableStats {
                found: false,
                schema: schema.to_string(),
                table_name: table.to_string(),
                details: None,
            });
        };

        let count_sql = format!(
            "SELECT count(*) FROM {}.{}",
            quote_identifier(schema),
            quote_identifier(table)
        );
        let counted = self.fetch(&client, &count_sql, &[]).await?;
        let row_count: i64 = match counted.first() {
            Some(r) => r.try_get(0).map_err(|e| self.driver_error(&e))?,
            None => 0,
        };

        let details = stats_from_row(row, row_count).map_err(|e| self.driver_error(&e))?;
        Ok(TableStats {
            found: true,
            schema: schema.to_string(),
            table_name: table.to_string(),
            details: Some(details),
        })
    }

    /// Columns whose name contains `term`, case-insensitively.
    ///
    /// `%` and `_` in the term match literally.
    #[instrument(skip(self))]
    pub async fn search_columns(
        &self,
        term: &str,
        schema: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<ColumnMatch>, GatewayError> {
        if let Some(schema) = schema {
            validate_identifier(schema)?;
        }
        let pattern = format!("%{}%", escape_like_pattern(term));
        let limit = sanitize_limit(limit, self.settings().max_rows) as i64;

        let client = self.client().await?;
        let rows = self
            .fetch(&client, SEARCH_COLUMNS_SQL, &[&pattern, &schema, &limit])
            .await?;
        self.decode(&rows, |row| {
            Ok(ColumnMatch {
                table_schema: row.try_get("table_schema")?,
                table_name: row.try_get("table_name")?,
                column_name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
            })
        })
    }

    #[instrument(skip(self))]
    pub async fn get_database_info(&self) -> Result<DatabaseInfo, GatewayError> {
        let client = self.client().await?;
        let row = client
            .query_one(DATABASE_INFO_SQL, &[])
            .await
            .map_err(|e| self.driver_error(&e))?;
        let settings = self.settings();
        database_info_from_row(&row, settings.allow_write_operations, settings.max_rows)
            .map_err(|e| self.driver_error(&e))
    }

    async fn columns(
        &self,
        client: &Object,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDescription>, GatewayError> {
        let rows = self.fetch(client, COLUMNS_SQL, &[&schema, &table]).await?;
        self.decode(&rows, |row| {
            Ok(ColumnDescription {
                column_name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                is_nullable: row.try_get("is_nullable")?,
                column_default: row.try_get("column_default")?,
                character_maximum_length: row.try_get("character_maximum_length")?,
                numeric_precision: row.try_get("numeric_precision")?,
                numeric_scale: row.try_get("numeric_scale")?,
                is_primary_key: false,
            })
        })
    }

    async fn fetch(
        &self,
        client: &Object,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, GatewayError> {
        client
            .query(sql, params)
            .await
            .map_err(|e| self.driver_error(&e))
    }

    fn decode<T>(
        &self,
        rows: &[Row],
        f: impl Fn(&Row) -> Result<T, tokio_postgres::Error>,
    ) -> Result<Vec<T>, GatewayError> {
        rows.iter()
            .map(|row| f(row).map_err(|e| self.driver_error(&e)))
            .collect()
    }
}

fn stats_from_row(row: &Row, row_count: i64) -> Result<TableStatsDetails, tokio_postgres::Error> {
    Ok(TableStatsDetails {
        row_count,
        estimated_rows: row.try_get("estimated_rows")?,
        total_size: row.try_get("total_size")?,
        table_size: row.try_get("table_size")?,
        indexes_size: row.try_get("indexes_size")?,
        sequential_scans: row.try_get("sequential_scans")?,
        index_scans: row.try_get("index_scans")?,
        live_tuples: row.try_get("live_tuples")?,
        dead_tuples: row.try_get("dead_tuples")?,
        last_vacuum: row.try_get("last_vacuum")?,
        last_autovacuum: row.try_get("last_autovacuum")?,
        last_analyze: row.try_get("last_analyze")?,
        last_autoanalyze: row.try_get("last_autoanalyze")?,
    })
}

fn database_info_from_row(
    row: &Row,
    allow_write: bool,
    max_rows: usize,
) -> Result<DatabaseInfo, tokio_postgres::Error> {
    Ok(DatabaseInfo {
        database: row.try_get("database")?,
        version: row.try_get("version")?,
        current_user: row.try_get("current_user")?,
        server_encoding: row.try_get("server_encoding")?,
        timezone: row.try_get("timezone")?,
        size: row.try_get("size")?,
        max_connections: row.try_get("max_connections")?,
        active_connections: row.try_get("active_connections")?,
        read_only: !allow_write,
        max_rows,
    })
}

/// Collapse per-column constraint rows into one record per constraint.
///
/// Constraints come out in the order their names first appear. Columns keep
/// row order; a column repeated within a constraint is listed once. Type,
/// referenced table/column and check clause come from the first row seen.
pub fn group_constraints(rows: Vec<ConstraintRow>) -> Vec<Constraint> {
    let mut grouped: Vec<Constraint> = Vec::new();
    for row in rows {
        let existing = grouped
            .iter_mut()
            .find(|c| c.constraint_name == row.constraint_name);
        match existing {
            Some(constraint) => {
                if let Some(column) = row.column_name {
                    if !constraint.columns.contains(&column) {
                        constraint.columns.push(column);
                    }
                }
            }
            None => grouped.push(Constraint {
                constraint_name: row.constraint_name,
                constraint_type: row.constraint_type,
                columns: row.column_name.into_iter().collect(),
                foreign_table_name: row.foreign_table_name,
                foreign_column_name: row.foreign_column_name,
                check_clause: row.check_clause,
            }),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, kind: &str, column: Option<&str>) -> ConstraintRow {
        ConstraintRow {
            constraint_name: name.to_string(),
            constraint_type: kind.to_string(),
            column_name: column.map(str::to_string),
            foreign_table_name: None,
            foreign_column_name: None,
            check_clause: None,
        }
    }

    #[test]
    fn test_group_constraints_collapses_columns() {
        let rows = vec![
            ConstraintRow {
                foreign_table_name: Some("customers".into()),
                foreign_column_name: Some("region".into()),
                ..row("fk_orders_customer", "FOREIGN KEY", Some("region_id"))
            },
            ConstraintRow {
                foreign_table_name: Some("ignored".into()),
                ..row("fk_orders_customer", "FOREIGN KEY", Some("customer_id"))
            },
            row("fk_orders_customer", "FOREIGN KEY", Some("branch_id")),
        ];

        let grouped = group_constraints(rows);
        assert_eq!(grouped.len(), 1);
        let fk = &grouped[0];
        assert_eq!(fk.columns, vec!["region_id", "customer_id", "branch_id"]);
        assert_eq!(fk.foreign_table_name.as_deref(), Some("customers"));
        assert_eq!(fk.foreign_column_name.as_deref(), Some("region"));
    }

    #[test]
    fn test_group_constraints_first_seen_order() {
        let rows = vec![
            row("orders_pkey", "PRIMARY KEY", Some("id")),
            row("orders_total_check", "CHECK", Some("total")),
            row("orders_pkey", "PRIMARY KEY", Some("tenant_id")),
            row("orders_ref_key", "UNIQUE", Some("ref")),
        ];
        let names: Vec<_> = group_constraints(rows)
            .into_iter()
            .map(|c| c.constraint_name)
            .collect();
        assert_eq!(names, vec!["orders_pkey", "orders_total_check", "orders_ref_key"]);
    }

    #[test]
    fn test_group_constraints_skips_repeats_and_missing_columns() {
        let rows = vec![
            row("uq_pair", "UNIQUE", Some("a")),
            row("uq_pair", "UNIQUE", Some("a")),
            row("uq_pair", "UNIQUE", Some("b")),
            row("excl_range", "EXCLUDE", None),
        ];
        let grouped = group_constraints(rows);
        assert_eq!(grouped[0].columns, vec!["a", "b"]);
        assert!(grouped[1].columns.is_empty());
    }

    #[test]
    fn test_group_constraints_empty() {
        assert!(group_constraints(Vec::new()).is_empty());
    }

    #[test]
    fn test_search_pattern_escaping() {
        assert_eq!(format!("%{}%", escape_like_pattern("50%_off")), r"%50\%\_off%");
    }
}
