// ABOUTME: In-memory table source for tests and embedding
// ABOUTME: Serves stored rows page by page and can inject fetch failures

use super::TableSource;
use crate::table_spec::TableSpec;
use crate::value::{Row, Value};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// One recorded `fetch_page` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub table: String,
    pub offset: u64,
    pub limit: u64,
}

/// Tables held in memory, already in their export order
///
/// Keys are table names as displayed (`schema.table` or `table`). Column
/// allow-lists and excluded columns are applied the way the SQL sources
/// apply them, so an allow-listed excluded column comes back as NULL.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: BTreeMap<String, Vec<Row>>,
    failures: Mutex<HashMap<(String, u64), u32>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(table.into(), rows);
        self
    }

    /// Make the next `times` fetches of `table` at `offset` fail
    pub fn fail_at(self, table: impl Into<String>, offset: u64, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((table.into(), offset), times);
        self
    }

    /// Every page request served so far, in call order
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn take_failure(&self, table: &str, offset: u64) -> bool {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match failures.get_mut(&(table.to_string(), offset)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn project(spec: &TableSpec, row: &Row) -> Result<Row> {
        let Some(columns) = spec.columns() else {
            return Ok(row.clone());
        };

        let mut projected = Row::with_capacity(columns.len());
        for column in columns {
            let value = row
                .get(column)
                .ok_or_else(|| anyhow!("column \"{}\" does not exist", column))?;
            let value = if spec.excluded_columns().any(|c| c == column) {
                Value::Null
            } else {
                value.clone()
            };
            projected.push(column.clone(), value);
        }
        Ok(projected)
    }
}

#[async_trait]
impl TableSource for MemorySource {
    async fn fetch_page(&self, spec: &TableSpec, offset: u64, limit: u64) -> Result<Vec<Row>> {
        let table = spec.table().to_string();

        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(PageRequest {
                table: table.clone(),
                offset,
                limit,
            });

        if self.take_failure(&table, offset) {
            bail!("injected failure reading '{}' at offset {}", table, offset);
        }

        let rows = self
            .tables
            .get(&table)
            .ok_or_else(|| anyhow!("relation \"{}\" does not exist", table))?;

        rows.iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|row| Self::project(spec, row))
            .collect()
    }

    fn describe(&self) -> String {
        format!("in-memory source ({} tables)", self.tables.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_spec::TableName;

    fn rows(n: i64) -> Vec<Row> {
        (1..=n).map(|i| Row::new().with("id", i)).collect()
    }

    fn spec(name: &str) -> TableSpec {
        TableSpec::new(TableName::parse(name).unwrap())
    }

    #[tokio::test]
    async fn pages_cover_table_and_end_empty() {
        let source = MemorySource::new().with_table("t", rows(5));
        let spec = spec("t");

        assert_eq!(source.fetch_page(&spec, 0, 2).await.unwrap().len(), 2);
        assert_eq!(source.fetch_page(&spec, 4, 2).await.unwrap().len(), 1);
        assert!(source.fetch_page(&spec, 5, 2).await.unwrap().is_empty());
        assert!(source.fetch_page(&spec, 50, 2).await.unwrap().is_empty());
        assert_eq!(source.requests().len(), 4);
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let source = MemorySource::new();
        assert!(source.fetch_page(&spec("nope"), 0, 10).await.is_err());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let source = MemorySource::new()
            .with_table("t", rows(3))
            .fail_at("t", 0, 2);
        let spec = spec("t");

        assert!(source.fetch_page(&spec, 0, 10).await.is_err());
        assert!(source.fetch_page(&spec, 0, 10).await.is_err());
        assert_eq!(source.fetch_page(&spec, 0, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn allow_list_projects_and_nulls_excluded() {
        let source = MemorySource::new().with_table(
            "forms",
            vec![Row::new()
                .with("id", 1)
                .with("file_data", "huge")
                .with("title", "x")],
        );
        let mut spec = spec("forms");
        spec.set_columns(vec!["title".into(), "file_data".into()])
            .unwrap();
        spec.add_excluded_column("file_data".into()).unwrap();

        let page = source.fetch_page(&spec, 0, 10).await.unwrap();
        let names: Vec<&str> = page[0].column_names().collect();
        assert_eq!(names, vec!["title", "file_data"]);
        assert_eq!(page[0].get("file_data"), Some(&Value::Null));

        spec.set_columns(vec!["missing".into()]).unwrap();
        assert!(source.fetch_page(&spec, 0, 10).await.is_err());
    }
}
