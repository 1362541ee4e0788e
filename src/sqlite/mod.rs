// ABOUTME: SQLite source support for exporting local database files
// ABOUTME: Provides path validation, read-only connections and the paginated table source

pub mod converter;
pub mod reader;
pub mod source;

pub use source::SqliteSource;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

const SQLITE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// Whether a `--source` value names a SQLite file rather than a PostgreSQL URL
///
/// ```
/// # use pg_insert_export::sqlite::is_sqlite_path;
/// assert!(is_sqlite_path("./data/app.sqlite3"));
/// assert!(!is_sqlite_path("postgresql://user@host/db"));
/// ```
pub fn is_sqlite_path(source: &str) -> bool {
    if source.contains("://") {
        return false;
    }
    Path::new(source)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SQLITE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validate a SQLite file path
///
/// Canonicalizes the path (resolving symlinks and `..`), then requires an
/// existing regular file with a .db, .sqlite or .sqlite3 extension.
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let canonical = PathBuf::from(path).canonicalize().with_context(|| {
        format!(
            "Failed to resolve SQLite file path '{}'. \
             File may not exist or may not be readable.",
            path
        )
    })?;

    if !canonical.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    match canonical.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if SQLITE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {}
        Some(ext) => bail!(
            "Invalid SQLite file extension '{}'. Must be .db, .sqlite, or .sqlite3",
            ext
        ),
        None => bail!(
            "SQLite file '{}' has no extension. Must be .db, .sqlite, or .sqlite3",
            path
        ),
    }

    tracing::debug!("Validated SQLite path: {}", canonical.display());
    Ok(canonical)
}

/// Open a SQLite database read-only after validating its path
pub fn open_sqlite(path: &str) -> Result<rusqlite::Connection> {
    let canonical = validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite database: {}", canonical.display());

    let conn = rusqlite::Connection::open_with_flags(
        &canonical,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .with_context(|| format!("Failed to open SQLite database: {}", canonical.display()))?;

    // fails early on files that are not SQLite databases
    let _version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version (database may be corrupted)")?;

    Ok(conn)
}
