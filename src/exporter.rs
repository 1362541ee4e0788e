// ABOUTME: Drives an export run: pages every table through the encoder into one script
// ABOUTME: Handles retries, page timeouts, cancellation and resumable staging

use crate::checkpoint::{CompletedTable, ExportCheckpoint};
use crate::error::{ExportError, ExportResult};
use crate::plan::ExportPlan;
use crate::script::{insert_statement, ScriptWriter};
use crate::sink::Sink;
use crate::source::TableSource;
use crate::table_spec::TableSpec;
use crate::utils;
use crate::value::Row;
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tuning for page reads
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Upper bound on a single page query
    pub page_timeout: Duration,
    /// Retries after the first failed attempt of a page
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_delay: Duration,
    /// Show a spinner per table on stderr
    pub show_progress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            show_progress: false,
        }
    }
}

/// Where the exporter is in its run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Exporting { table_index: usize, offset: u64 },
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub rows: u64,
    pub pages: u64,
    /// Section reused from a previous run's staging
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub destination: String,
    pub bytes: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub tables: Vec<TableReport>,
    pub total_rows: u64,
    pub artifact: ArtifactReport,
}

/// Exports the tables of one source into a single script
///
/// The exporter owns the source (and with it the connection) for the
/// whole run. A run either commits a complete script to the sink or
/// commits nothing.
pub struct Exporter<S: TableSource> {
    source: S,
    options: ExportOptions,
    cancel: CancellationToken,
    state: ExportState,
}

impl<S: TableSource> Exporter<S> {
    pub fn new(source: S, options: ExportOptions) -> Self {
        Self {
            source,
            options,
            cancel: CancellationToken::new(),
            state: ExportState::Idle,
        }
    }

    /// Stop the run at the next page boundary when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &ExportState {
        &self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Release the source (and its connection)
    pub fn into_source(self) -> S {
        self.source
    }

    /// Export every table of `plan` in order and commit the script to `sink`
    pub async fn run<K: Sink>(&mut self, plan: &ExportPlan, sink: K) -> ExportResult<ExportSummary> {
        let result = self.run_inner(plan, sink, None).await;
        self.finish(result)
    }

    /// Like [`Exporter::run`], staging each finished table so a failed run can resume
    ///
    /// Tables the checkpoint already holds are copied from staging without
    /// querying the source. The staging directory is removed once the
    /// script is committed.
    pub async fn run_resumable<K: Sink>(
        &mut self,
        plan: &ExportPlan,
        sink: K,
        mut checkpoint: ExportCheckpoint,
    ) -> ExportResult<ExportSummary> {
        let result = self.run_inner(plan, sink, Some(&mut checkpoint)).await;
        let summary = self.finish(result)?;
        checkpoint.remove().map_err(ExportError::Checkpoint)?;
        Ok(summary)
    }

    fn finish(&mut self, result: ExportResult<ExportSummary>) -> ExportResult<ExportSummary> {
        self.state = match result {
            Ok(_) => ExportState::Done,
            Err(ExportError::Cancelled { .. }) => ExportState::Cancelled,
            Err(_) => ExportState::Failed,
        };
        result
    }

    async fn run_inner<K: Sink>(
        &mut self,
        plan: &ExportPlan,
        sink: K,
        mut checkpoint: Option<&mut ExportCheckpoint>,
    ) -> ExportResult<ExportSummary> {
        let destination = sink.destination();
        tracing::info!(
            "Exporting {} table(s) from {} to {}",
            plan.tables().len(),
            self.source.describe(),
            destination
        );

        let mut script = ScriptWriter::new(sink);
        script
            .write_header(plan.header())
            .map_err(|e| ExportError::sink(&destination, e))?;

        let mut reports = Vec::with_capacity(plan.tables().len());
        for (index, spec) in plan.tables().iter().enumerate() {
            let report = match checkpoint.as_deref_mut() {
                Some(checkpoint) => {
                    self.export_staged(index, spec, &mut script, &destination, checkpoint)
                        .await?
                }
                None => self.export_table(index, spec, &mut script, &destination).await?,
            };
            reports.push(report);
        }

        script
            .flush()
            .map_err(|e| ExportError::sink(&destination, e))?;
        let artifact = ArtifactReport {
            destination,
            bytes: script.bytes_written(),
            lines: script.lines_written(),
        };
        script.into_inner().commit()?;

        let total_rows = reports.iter().map(|r| r.rows).sum();
        tracing::info!(
            "✓ Export complete: {} rows from {} table(s), {} lines ({}) written to {}",
            total_rows,
            reports.len(),
            artifact.lines,
            utils::format_bytes(artifact.bytes),
            artifact.destination
        );

        Ok(ExportSummary {
            tables: reports,
            total_rows,
            artifact,
        })
    }

    /// Page through one table and append its section to `out`
    ///
    /// The section comment is written only once the first row arrives, so a
    /// table with no rows leaves no trace in the script.
    async fn export_table<W: Write>(
        &mut self,
        index: usize,
        spec: &TableSpec,
        out: &mut ScriptWriter<W>,
        destination: &str,
    ) -> ExportResult<TableReport> {
        let table = spec.table().to_string();
        if spec.order_by().is_empty() {
            tracing::warn!(
                "Table '{}' has no ordering key; rows may be skipped or repeated across pages",
                table
            );
        }

        tracing::info!("Exporting '{}' (page size {})", table, spec.page_size());
        let progress = self.progress_bar(&table);

        let mut offset = 0u64;
        let mut rows = 0u64;
        let mut pages = 0u64;
        let mut columns: Option<Vec<String>> = None;

        loop {
            self.state = ExportState::Exporting {
                table_index: index,
                offset,
            };

            if self.cancel.is_cancelled() {
                progress.abandon_with_message(format!("{}: cancelled", table));
                tracing::warn!("Export cancelled while reading '{}' at offset {}", table, offset);
                return Err(ExportError::Cancelled { table });
            }

            let page = self.fetch_page(spec, offset).await?;
            if page.is_empty() {
                break;
            }
            pages += 1;

            for row in &page {
                match columns {
                    None => columns = Some(row.column_names().map(str::to_string).collect()),
                    Some(ref expected) if !row.has_columns(expected) => {
                        return Err(ExportError::EncodingFailure {
                            table,
                            column: first_mismatch(expected, row.column_names()),
                            reason: "column list differs from earlier rows of the table"
                                .to_string(),
                        });
                    }
                    Some(_) => {}
                }

                let statement = insert_statement(spec, row)?;
                if rows == 0 {
                    out.begin_section(spec)
                        .map_err(|e| ExportError::sink(destination, e))?;
                }
                out.write_statement(&statement)
                    .map_err(|e| ExportError::sink(destination, e))?;
                rows += 1;
            }

            offset += spec.page_size();
            progress.set_message(format!("{}: {} rows", table, rows));
            tracing::debug!("Processed {} rows of '{}' ({} pages)", rows, table, pages);
        }

        progress.finish_and_clear();
        if rows == 0 {
            tracing::info!("  '{}' is empty; no section written", table);
        } else {
            tracing::info!("  ✓ '{}': {} rows exported", table, rows);
        }

        Ok(TableReport {
            table,
            rows,
            pages,
            resumed: false,
        })
    }

    /// Export one table through its staging file, or reuse a staged section
    async fn export_staged<K: Sink>(
        &mut self,
        index: usize,
        spec: &TableSpec,
        script: &mut ScriptWriter<K>,
        destination: &str,
        checkpoint: &mut ExportCheckpoint,
    ) -> ExportResult<TableReport> {
        let table = spec.table().to_string();
        let part_path = checkpoint.part_path(index, &table);

        let report = match checkpoint.completed(index, &table).cloned() {
            Some(done) => {
                tracing::info!(
                    "  ✓ '{}': reusing {} staged rows from previous run",
                    table,
                    done.rows
                );
                TableReport {
                    table,
                    rows: done.rows,
                    pages: done.pages,
                    resumed: true,
                }
            }
            None => {
                let part_label = part_path.display().to_string();
                let tmp = tempfile::NamedTempFile::new_in(checkpoint.dir())
                    .map_err(|e| ExportError::sink(&part_path, e))?;
                let mut part = ScriptWriter::new(BufWriter::new(tmp));

                let report = self.export_table(index, spec, &mut part, &part_label).await?;

                let tmp = part
                    .into_inner()
                    .into_inner()
                    .map_err(|e| ExportError::sink(&part_path, e.into_error()))?;
                tmp.persist(&part_path)
                    .map_err(|e| ExportError::sink(&part_path, e.error))?;
                checkpoint
                    .mark_completed(
                        &report.table,
                        CompletedTable {
                            rows: report.rows,
                            pages: report.pages,
                        },
                    )
                    .map_err(ExportError::Checkpoint)?;
                report
            }
        };

        let file = File::open(&part_path).map_err(|e| ExportError::sink(&part_path, e))?;
        script
            .append_section_from(BufReader::new(file))
            .map_err(|e| ExportError::sink(destination, e))?;

        Ok(report)
    }

    /// One page with a per-attempt timeout, retried with backoff
    async fn fetch_page(&self, spec: &TableSpec, offset: u64) -> ExportResult<Vec<Row>> {
        let source = &self.source;
        let timeout = self.options.page_timeout;
        let limit = spec.page_size();

        utils::retry_with_backoff(
            "Page fetch",
            || async move {
                match tokio::time::timeout(timeout, source.fetch_page(spec, offset, limit)).await {
                    Ok(page) => page,
                    Err(_) => Err(anyhow::anyhow!(
                        "page query timed out after {:?}",
                        timeout
                    )),
                }
            },
            self.options.max_retries,
            self.options.retry_delay,
        )
        .await
        .map_err(|cause| ExportError::SourceUnavailable {
            table: spec.table().to_string(),
            offset,
            cause,
        })
    }

    fn progress_bar(&self, table: &str) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new_spinner();
        progress.enable_steady_tick(Duration::from_millis(120));
        progress.set_message(format!("{}: starting", table));
        progress
    }
}

fn first_mismatch<'a>(expected: &[String], actual: impl Iterator<Item = &'a str>) -> String {
    let actual: Vec<&str> = actual.collect();
    for (i, column) in expected.iter().enumerate() {
        match actual.get(i) {
            Some(found) if *found == column.as_str() => continue,
            Some(found) => return (*found).to_string(),
            None => return column.clone(),
        }
    }
    actual
        .get(expected.len())
        .map(|c| c.to_string())
        .unwrap_or_default()
}
