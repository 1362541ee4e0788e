// ABOUTME: TableSource backed by a read-only SQLite database file
// ABOUTME: Runs page reads on the blocking pool so page timeouts stay effective

use super::reader::read_page;
use crate::source::TableSource;
use crate::table_spec::TableSpec;
use crate::value::Row;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub struct SqliteSource {
    conn: Arc<Mutex<Connection>>,
    label: String,
}

impl SqliteSource {
    pub fn new(conn: Connection, label: impl Into<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            label: label.into(),
        }
    }

    /// Validate the path and open the file read-only
    pub fn open(path: &str) -> Result<Self> {
        let conn = super::open_sqlite(path)?;
        Ok(Self::new(conn, path))
    }
}

#[async_trait]
impl TableSource for SqliteSource {
    async fn fetch_page(&self, spec: &TableSpec, offset: u64, limit: u64) -> Result<Vec<Row>> {
        let conn = Arc::clone(&self.conn);
        let spec = spec.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
            read_page(&conn, &spec, offset, limit)
        })
        .await
        .context("SQLite read task failed")?
    }

    fn describe(&self) -> String {
        format!("SQLite {}", self.label)
    }
}
