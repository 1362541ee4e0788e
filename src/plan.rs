// ABOUTME: The ordered set of tables one export run processes, plus its script header
// ABOUTME: Rejects duplicate tables and fingerprints the plan for resume checks

use crate::script::ScriptHeader;
use crate::table_spec::TableSpec;
use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct ExportPlan {
    tables: Vec<TableSpec>,
    header: ScriptHeader,
}

impl ExportPlan {
    pub fn new(tables: Vec<TableSpec>, header: ScriptHeader) -> Result<Self> {
        if tables.is_empty() {
            bail!("Nothing to export: no tables configured. Use --table or a config file.");
        }

        let mut seen = BTreeSet::new();
        for spec in &tables {
            if !seen.insert(spec.table().clone()) {
                bail!("Table '{}' is listed more than once", spec.table());
            }
        }

        if let Some(ref schema) = header.search_path {
            crate::utils::validate_postgres_identifier(schema)
                .context("Invalid search_path schema")?;
        }

        Ok(Self { tables, header })
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn header(&self) -> &ScriptHeader {
        &self.header
    }

    /// Stable hash of everything that shapes the script body
    ///
    /// The generated-at timestamp is left out so a restarted run with the
    /// same settings produces the same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        let tables = serde_json::to_vec(&self.tables).context("Failed to serialize export plan")?;
        hasher.update(&tables);
        hasher.update(b"::");
        for line in &self.header.lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"::");
        if let Some(ref schema) = self.header.search_path {
            hasher.update(schema.as_bytes());
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}
