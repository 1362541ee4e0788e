// ABOUTME: Destinations for the finished export script
// ABOUTME: Nothing becomes visible at the destination until commit succeeds

use crate::error::{ExportError, ExportResult};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Destination for the script
///
/// Bytes written before [`Sink::commit`] are provisional. Dropping a sink
/// without committing discards them.
pub trait Sink: Write {
    /// Human-readable destination, used in reports and errors
    fn destination(&self) -> String;

    /// Make the written script durable and visible at the destination
    fn commit(self) -> ExportResult<()>
    where
        Self: Sized;
}

/// Writes into a temp file next to the destination and renames it on commit
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref().to_path_buf();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        fs::create_dir_all(&parent).map_err(|e| ExportError::sink(&parent, e))?;

        let tmp = tempfile::Builder::new()
            .prefix(".pg-insert-export-")
            .suffix(".sql.tmp")
            .tempfile_in(&parent)
            .map_err(|e| ExportError::sink(&path, e))?;

        tracing::debug!(
            "Staging export in {} until the run completes",
            tmp.path().display()
        );

        Ok(Self {
            path,
            writer: BufWriter::new(tmp),
        })
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Sink for FileSink {
    fn destination(&self) -> String {
        self.path.display().to_string()
    }

    fn commit(self) -> ExportResult<()> {
        let FileSink { path, writer } = self;

        let tmp = writer
            .into_inner()
            .map_err(|e| ExportError::sink(&path, e.into_error()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| ExportError::sink(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| ExportError::sink(&path, e.error))?;

        tracing::debug!("Committed export to {}", path.display());
        Ok(())
    }
}

/// Holds the whole script in memory and writes it out only on commit
///
/// Used for streams such as stdout, which cannot be renamed into place.
pub struct BufferedSink<W: Write> {
    buffer: Vec<u8>,
    out: W,
    label: String,
}

impl<W: Write> BufferedSink<W> {
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            buffer: Vec::new(),
            out,
            label: label.into(),
        }
    }
}

impl BufferedSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), "<stdout>")
    }
}

impl<W: Write> Write for BufferedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Sink for BufferedSink<W> {
    fn destination(&self) -> String {
        self.label.clone()
    }

    fn commit(mut self) -> ExportResult<()> {
        self.out
            .write_all(&self.buffer)
            .and_then(|_| self.out.flush())
            .map_err(|e| ExportError::sink(&self.label, e))
    }
}
