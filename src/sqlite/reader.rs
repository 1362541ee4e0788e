// ABOUTME: Paginated reads from SQLite tables
// ABOUTME: Builds LIMIT/OFFSET page queries and converts result rows

use super::converter::sqlite_row_to_row;
use crate::table_spec::TableSpec;
use crate::value::Row;
use anyhow::{Context, Result};
use rusqlite::Connection;

/// Page query for SQLite; parameters are `?1` = limit, `?2` = offset
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
    sql.push_str(" LIMIT ?1 OFFSET ?2");
    sql
}

/// Read one page of a table
///
/// # Security
///
/// Identifiers in `spec` are validated when the spec is built; they are
/// interpolated into the query, values are bound as parameters.
pub fn read_page(conn: &Connection, spec: &TableSpec, offset: u64, limit: u64) -> Result<Vec<Row>> {
    let sql = page_query(spec);
    let limit = i64::try_from(limit).context("Page size too large")?;
    let offset = i64::try_from(offset).context("Offset too large")?;

    tracing::debug!("{} [limit={}, offset={}]", sql, limit, offset);

    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to prepare page query for table '{}'", spec.table()))?;

    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let width = columns.len();

    let raw = stmt
        .query_map(rusqlite::params![limit, offset], |row| {
            (0..width)
                .map(|idx| row.get::<_, rusqlite::types::Value>(idx))
                .collect::<Result<Vec<_>, _>>()
        })
        .with_context(|| format!("Failed to query rows from table '{}'", spec.table()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to collect rows from table '{}'", spec.table()))?;

    raw.into_iter()
        .map(|values| sqlite_row_to_row(spec, &columns, values))
        .collect()
}
