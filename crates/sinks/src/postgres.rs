use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::runtime::Runtime;
use utils::{CanonicalRecord, CellValue, DomainSchema, KeyPolicy, RemoteTable};

/// A Postgres table named after the domain schema.
///
/// The rest of the pipeline is synchronous, so the table owns a
/// current-thread runtime and blocks on each query.
pub struct PostgresTable {
    runtime: Runtime,
    pool: PgPool,
    table: &'static str,
}

impl PostgresTable {
    /// Connects and creates the table if it does not exist yet.
    pub fn connect(database_url: &str, schema: &DomainSchema) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start tokio runtime")?;

        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect(database_url),
            )
            .context("Failed to connect to PostgreSQL")?;

        let ddl = create_table_sql(schema);
        runtime
            .block_on(sqlx::query(&ddl).execute(&pool))
            .with_context(|| format!("Failed to create table {}", schema.name))?;
        tracing::info!("PostgreSQL table {} ready", schema.name);

        Ok(Self {
            runtime,
            pool,
            table: schema.name,
        })
    }
}

impl RemoteTable for PostgresTable {
    fn describe(&self) -> String {
        format!("PostgreSQL table {}", self.table)
    }

    fn fetch_existing_keys(&mut self, key_column: &str) -> Result<HashSet<String>> {
        let sql = format!("SELECT {}::text FROM {}", key_column, self.table);
        let rows: Vec<Option<String>> = self
            .runtime
            .block_on(sqlx::query_scalar(&sql).fetch_all(&self.pool))
            .with_context(|| format!("Failed to read keys from {}", self.table))?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn insert_record(&mut self, schema: &DomainSchema, record: &CanonicalRecord) -> Result<()> {
        let sql = insert_sql(schema);
        let mut query = sqlx::query(&sql);
        for cell in record.cells() {
            query = match &cell.value {
                CellValue::Text(s) => query.bind(s.clone()),
                CellValue::Date(d) => query.bind(*d),
                CellValue::Float(f) => query.bind(*f),
                CellValue::Int(i) => query.bind(*i),
            };
        }
        self.runtime
            .block_on(query.execute(&self.pool))
            .with_context(|| format!("INSERT into {} failed", self.table))?;
        Ok(())
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a schema. Natural keys become the
/// primary key; content hashes are only deduplicated client-side.
pub fn create_table_sql(schema: &DomainSchema) -> String {
    let primary_key = match &schema.key {
        KeyPolicy::Natural { column } => Some(*column),
        KeyPolicy::Hashed { .. } => None,
    };

    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|&(name, ty)| {
            if Some(name) == primary_key {
                format!("    {} {} PRIMARY KEY", name, ty.sql_type())
            } else {
                format!("    {} {}", name, ty.sql_type())
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        schema.name,
        columns.join(",\n")
    )
}

/// Parameterised insert over every schema column, in column order.
pub fn insert_sql(schema: &DomainSchema) -> String {
    let names = schema.column_names();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name,
        names.join(", "),
        placeholders.join(", ")
    )
}
