// ABOUTME: Persistent checkpoint for resumable exports
// ABOUTME: Tracks completed tables and their staged script sections between runs

use crate::plan::ExportPlan;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const EXPORT_CHECKPOINT_VERSION: u32 = 1;
const CHECKPOINT_FILE: &str = "checkpoint.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub source_hash: String,
    pub plan_hash: String,
}

impl CheckpointMetadata {
    pub fn new(source_url: &str, plan: &ExportPlan) -> Result<Self> {
        Ok(Self {
            source_hash: hash_string(source_url),
            plan_hash: plan.fingerprint()?,
        })
    }
}

/// Outcome of a table whose section is already staged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedTable {
    pub rows: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointData {
    version: u32,
    metadata: CheckpointMetadata,
    tables: Vec<String>,
    completed: BTreeMap<String, CompletedTable>,
}

/// Checkpoint plus the staging directory that holds finished sections
#[derive(Debug, Clone)]
pub struct ExportCheckpoint {
    data: CheckpointData,
    dir: PathBuf,
}

impl ExportCheckpoint {
    /// Staging directory used for an output file: `<output>.parts`
    pub fn staging_dir(output: &Path) -> PathBuf {
        let mut name = output
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "export.sql".into());
        name.push(".parts");
        output.with_file_name(name)
    }

    /// Open the checkpoint for `output`
    ///
    /// With `resume`, an existing checkpoint is loaded and must match
    /// `metadata` and `tables`. Without it, any previous staging is wiped.
    pub fn open(
        output: &Path,
        metadata: CheckpointMetadata,
        tables: &[String],
        resume: bool,
    ) -> Result<Self> {
        let dir = Self::staging_dir(output);
        let path = dir.join(CHECKPOINT_FILE);

        if resume {
            if let Some(existing) = Self::load(&path)? {
                existing.validate(&metadata, tables)?;
                tracing::info!(
                    "Resuming export: {}/{} table(s) already staged in {}",
                    existing.completed_count(),
                    existing.total_tables(),
                    dir.display()
                );
                return Ok(existing);
            }
        } else if dir.exists() {
            tracing::info!("Discarding previous staging at {}", dir.display());
            fs::remove_dir_all(&dir).with_context(|| {
                format!("Failed to remove staging directory {}", dir.display())
            })?;
        }

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create staging directory {}", dir.display()))?;

        let checkpoint = Self {
            data: CheckpointData {
                version: EXPORT_CHECKPOINT_VERSION,
                metadata,
                tables: tables.to_vec(),
                completed: BTreeMap::new(),
            },
            dir,
        };
        checkpoint.save()?;
        Ok(checkpoint)
    }

    fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint at {}", path.display()))?;
        let data: CheckpointData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse checkpoint JSON at {}", path.display()))?;

        if data.version != EXPORT_CHECKPOINT_VERSION {
            bail!(
                "Checkpoint version mismatch (found {}, expected {}). Run with --no-resume to start fresh.",
                data.version,
                EXPORT_CHECKPOINT_VERSION
            );
        }

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Some(Self { data, dir }))
    }

    pub fn save(&self) -> Result<()> {
        let path = self.dir.join(CHECKPOINT_FILE);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).with_context(|| {
            format!("Failed to create temp checkpoint in {}", self.dir.display())
        })?;

        serde_json::to_writer_pretty(tmp.as_file_mut(), &self.data)
            .with_context(|| format!("Failed to serialize checkpoint at {}", path.display()))?;

        tmp.persist(&path)
            .with_context(|| format!("Failed to persist checkpoint at {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self, metadata: &CheckpointMetadata, tables: &[String]) -> Result<()> {
        if self.data.metadata != *metadata {
            bail!(
                "Checkpoint was written for a different source or table configuration. \
                 Run with --no-resume to discard the previous state."
            );
        }

        if self.data.tables != tables {
            bail!(
                "Checkpoint table list differs from the current plan. Run with --no-resume to start fresh."
            );
        }

        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the staged section of the `index`-th table lives
    pub fn part_path(&self, index: usize, table: &str) -> PathBuf {
        self.dir.join(format!("{:03}-{}.sql", index, table))
    }

    /// Completed entry, only if its staged section is still on disk
    pub fn completed(&self, index: usize, table: &str) -> Option<&CompletedTable> {
        self.data
            .completed
            .get(table)
            .filter(|_| self.part_path(index, table).is_file())
    }

    pub fn mark_completed(&mut self, table: &str, outcome: CompletedTable) -> Result<()> {
        self.data.completed.insert(table.to_string(), outcome);
        self.save()
    }

    pub fn completed_count(&self) -> usize {
        self.data.completed.len()
    }

    pub fn total_tables(&self) -> usize {
        self.data.tables.len()
    }

    /// Remove the staging directory after the artifact is committed
    pub fn remove(self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).with_context(|| {
                format!("Failed to remove staging directory {}", self.dir.display())
            })?;
        }
        Ok(())
    }
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
