//! Pooled access to PostgreSQL and text rendering of query results.

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::debug;

/// One column of a described table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Rows and columns of one statement's result, already stringified
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Outcome of one statement in a (possibly multi-statement) query
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows(ResultSet),
    Affected(u64),
}

#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Build the pool; connections are opened lazily on first use
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.dbname.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool = PoolConfig::new(config.pool_max);
        pool.timeouts.wait = Some(config.pool_timeout);
        pool.timeouts.create = Some(config.pool_timeout);
        pool.timeouts.recycle = Some(config.pool_timeout);
        cfg.pool = Some(pool);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Self { pool })
    }

    /// Run arbitrary SQL through the simple query protocol
    pub async fn execute(&self, sql: &str) -> Result<Vec<StatementOutcome>, DatabaseError> {
        let client = self.pool.get().await?;
        debug!(sql, "Executing query");
        let messages = client.simple_query(sql).await?;
        Ok(collect_outcomes(messages))
    }

    /// User tables outside the system schemas as `schema.table`
    pub async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT table_schema::text, table_name::text \
                 FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' \
                   AND table_schema NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY table_schema, table_name",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let schema: String = row.get(0);
                let table: String = row.get(1);
                qualified_name(&schema, &table)
            })
            .collect())
    }

    /// Columns of `table` (optionally `schema.table`) in declaration order
    pub async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let (schema, name) = split_table_name(table);
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text \
                 FROM information_schema.columns \
                 WHERE table_schema::text = $1 AND table_name::text = $2 \
                 ORDER BY ordinal_position",
                &[&schema, &name],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let nullable: String = row.get(2);
                ColumnInfo {
                    name: row.get(0),
                    data_type: row.get(1),
                    nullable: nullable == "YES",
                    default: row.get(3),
                }
            })
            .collect())
    }

    pub async fn server_version(&self) -> Result<String, DatabaseError> {
        let client = self.pool.get().await?;
        let row = client.query_one("SELECT version()", &[]).await?;
        Ok(row.get(0))
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

fn qualified_name(schema: &str, table: &str) -> String {
    if schema == "public" {
        table.to_string()
    } else {
        format!("{}.{}", schema, table)
    }
}

/// `orders` → (`public`, `orders`); `sales.orders` → (`sales`, `orders`)
pub fn split_table_name(table: &str) -> (&str, &str) {
    match table.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (schema, name),
        _ => ("public", table),
    }
}

fn collect_outcomes(messages: Vec<SimpleQueryMessage>) -> Vec<StatementOutcome> {
    let mut outcomes = Vec::new();
    let mut current: Option<ResultSet> = None;

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                current = Some(ResultSet {
                    columns: columns.iter().map(|c| c.name().to_string()).collect(),
                    rows: Vec::new(),
                });
            }
            SimpleQueryMessage::Row(row) => {
                let set = current.get_or_insert_with(|| ResultSet {
                    columns: row.columns().iter().map(|c| c.name().to_string()).collect(),
                    rows: Vec::new(),
                });
                set.rows
                    .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
            }
            SimpleQueryMessage::CommandComplete(affected) => match current.take() {
                Some(set) => outcomes.push(StatementOutcome::Rows(set)),
                None => outcomes.push(StatementOutcome::Affected(affected)),
            },
            _ => {}
        }
    }

    if let Some(set) = current {
        outcomes.push(StatementOutcome::Rows(set));
    }
    outcomes
}

/// psql-style aligned table with a row count footer
pub fn render_result_set(set: &ResultSet) -> String {
    let cells: Vec<Vec<&str>> = set
        .rows
        .iter()
        .map(|row| row.iter().map(|c| c.as_deref().unwrap_or("NULL")).collect())
        .collect();

    let mut widths: Vec<usize> = set.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |values: &[&str]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:<width$} ", v, width = *w))
            .collect::<Vec<_>>()
            .join("|")
            .trim_end()
            .to_string()
    };

    let header: Vec<&str> = set.columns.iter().map(String::as_str).collect();
    let mut out = vec![line(&header)];
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+"),
    );
    out.extend(cells.iter().map(|row| line(row)));

    let count = set.rows.len();
    out.push(format!("({} {})", count, if count == 1 { "row" } else { "rows" }));
    out.join("\n")
}

pub fn render_outcomes(outcomes: &[StatementOutcome]) -> String {
    if outcomes.is_empty() {
        return "Query executed successfully".to_string();
    }
    outcomes
        .iter()
        .map(|outcome| match outcome {
            StatementOutcome::Rows(set) => render_result_set(set),
            StatementOutcome::Affected(n) => format!("{} rows affected", n),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_columns(table: &str, columns: &[ColumnInfo]) -> String {
    let set = ResultSet {
        columns: vec![
            "column".to_string(),
            "type".to_string(),
            "nullable".to_string(),
            "default".to_string(),
        ],
        rows: columns
            .iter()
            .map(|c| {
                vec![
                    Some(c.name.clone()),
                    Some(c.data_type.clone()),
                    Some(if c.nullable { "YES" } else { "NO" }.to_string()),
                    c.default.clone(),
                ]
            })
            .collect(),
    };
    format!("Table \"{}\"\n{}", table, render_result_set(&set))
}
