// ABOUTME: Paginated row access to named tables, the only input the exporter needs
// ABOUTME: Defines the TableSource trait and an in-memory implementation

mod memory;

pub use memory::{MemorySource, PageRequest};

use crate::table_spec::TableSpec;
use crate::value::Row;
use anyhow::Result;
use async_trait::async_trait;

/// Ordered, paginated read access to the tables of one data source
///
/// Implementations hold the single connection of an export run; it is
/// acquired before the run and released when the source is dropped.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Rows at positions `[offset, offset + limit)` of the table's ordering
    ///
    /// Must return an empty page exactly when `offset` is at or past the
    /// end of the table; callers rely on that to stop paging.
    async fn fetch_page(&self, spec: &TableSpec, offset: u64, limit: u64) -> Result<Vec<Row>>;

    /// Short description for logs (driver and location, no credentials)
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: TableSource + ?Sized> TableSource for Box<T> {
    async fn fetch_page(&self, spec: &TableSpec, offset: u64, limit: u64) -> Result<Vec<Row>> {
        (**self).fetch_page(spec, offset, limit).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
