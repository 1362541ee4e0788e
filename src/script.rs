// ABOUTME: Assembles the export script: header block, table sections and INSERT statements
// ABOUTME: Streams into any writer while counting bytes and lines for the final report

use crate::encoder::encode_value;
use crate::error::{ExportError, ExportResult};
use crate::table_spec::TableSpec;
use crate::utils::quote_ident;
use crate::value::Row;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::{self, BufRead, Write};

/// Fixed comment block at the top of every script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptHeader {
    pub lines: Vec<String>,
    pub generated_at: Option<DateTime<Utc>>,
    /// Emits `SET search_path TO <schema>;` after the comments
    pub search_path: Option<String>,
}

impl Default for ScriptHeader {
    fn default() -> Self {
        Self {
            lines: vec!["Database Data Export".to_string()],
            generated_at: None,
            search_path: None,
        }
    }
}

impl ScriptHeader {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            // a newline inside a header line would end the comment
            let line = line.replace(['\r', '\n'], " ");
            out.push_str("-- ");
            out.push_str(line.trim_end());
            out.push('\n');
        }
        if let Some(ts) = self.generated_at {
            out.push_str("-- Generated at ");
            out.push_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true));
            out.push('\n');
        }
        out.push('\n');
        if let Some(ref schema) = self.search_path {
            out.push_str(&format!("SET search_path TO {};\n\n", quote_ident(schema)));
        }
        out
    }
}

/// Build the INSERT statement for one row, without the line terminator
///
/// The column list is the row's own columns in row order.
pub fn insert_statement(spec: &TableSpec, row: &Row) -> ExportResult<String> {
    if row.is_empty() {
        return Ok(format!(
            "INSERT INTO {} DEFAULT VALUES;",
            spec.table().qualified()
        ));
    }

    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (column, value) in row.iter() {
        let literal = encode_value(value, spec.column_kind(column)).map_err(|e| {
            ExportError::EncodingFailure {
                table: spec.table().to_string(),
                column: column.to_string(),
                reason: e.to_string(),
            }
        })?;
        columns.push(quote_ident(column));
        values.push(literal);
    }

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({});",
        spec.table().qualified(),
        columns.join(", "),
        values.join(", ")
    ))
}

/// Script writer over any byte sink
pub struct ScriptWriter<W: Write> {
    inner: W,
    bytes: u64,
    lines: u64,
    sections: usize,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes: 0,
            lines: 0,
            sections: 0,
        }
    }

    pub fn write_header(&mut self, header: &ScriptHeader) -> io::Result<()> {
        self.write_text(&header.render())
    }

    /// Open a table section; sections after the first get a blank separator line
    pub fn begin_section(&mut self, spec: &TableSpec) -> io::Result<()> {
        if self.sections > 0 {
            self.write_text("\n")?;
        }
        self.sections += 1;
        let comment = spec.section_comment();
        self.write_text(&comment)?;
        self.write_text("\n")
    }

    /// Append a pre-rendered section (comment plus statements)
    pub fn append_section(&mut self, section: &str) -> io::Result<()> {
        self.append_section_from(section.as_bytes())
    }

    /// Stream a pre-rendered section from `reader`; empty input adds nothing
    pub fn append_section_from<R: BufRead>(&mut self, mut reader: R) -> io::Result<()> {
        let mut started = false;
        loop {
            let chunk = reader.fill_buf()?;
            if chunk.is_empty() {
                return Ok(());
            }
            if !started {
                if self.sections > 0 {
                    self.write_bytes(b"\n")?;
                }
                self.sections += 1;
                started = true;
            }
            let len = chunk.len();
            self.write_bytes(chunk)?;
            reader.consume(len);
        }
    }

    pub fn write_statement(&mut self, statement: &str) -> io::Result<()> {
        self.write_text(statement)?;
        self.write_text("\n")
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.bytes += bytes.len() as u64;
        self.lines += bytes.iter().filter(|b| **b == b'\n').count() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn sections(&self) -> usize {
        self.sections
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
