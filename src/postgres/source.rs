// ABOUTME: TableSource backed by a PostgreSQL connection
// ABOUTME: Reads pages with LIMIT/OFFSET over the table's configured ordering

use super::converter::convert_row;
use crate::source::TableSource;
use crate::table_spec::TableSpec;
use crate::value::Row;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::Client;

/// Build the page query for a table; parameters are `$1` = limit, `$2` = offset
pub fn page_query(spec: &TableSpec) -> String {
    let mut sql = format!(
        "SELECT {} FROM {}",
        spec.projection(),
        spec.table().qualified()
    );
    if let Some(order) = spec.order_clause() {
        sql.push(' ');
        sql.push_str(&order);
    }
    sql.push_str(" LIMIT $1 OFFSET $2");
    sql
}

pub struct PostgresSource {
    client: Client,
    label: String,
}

impl PostgresSource {
    /// Wrap an open client; `label` is shown in logs and must not carry credentials
    pub fn new(client: Client, label: impl Into<String>) -> Self {
        Self {
            client,
            label: label.into(),
        }
    }

    /// Connect (with retries) and pin the session to read-only
    pub async fn connect(url: &str, max_retries: u32) -> Result<Self> {
        let client = super::connection::connect_with_retry(url, max_retries).await?;
        client
            .batch_execute("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
            .await
            .context("Failed to mark source session read-only")?;
        Ok(Self::new(client, crate::utils::redact_url(url)))
    }
}

#[async_trait]
impl TableSource for PostgresSource {
    async fn fetch_page(&self, spec: &TableSpec, offset: u64, limit: u64) -> Result<Vec<Row>> {
        let sql = page_query(spec);
        let limit = i64::try_from(limit).context("Page size too large")?;
        let offset = i64::try_from(offset).context("Offset too large")?;

        tracing::debug!("{} [limit={}, offset={}]", sql, limit, offset);

        let rows = self
            .client
            .query(sql.as_str(), &[&limit, &offset])
            .await
            .with_context(|| format!("Query against '{}' failed", spec.table()))?;

        rows.iter()
            .map(|row| {
                convert_row(row).with_context(|| format!("Failed to convert row of '{}'", spec.table()))
            })
            .collect()
    }

    fn describe(&self) -> String {
        format!("PostgreSQL {}", self.label)
    }
}
