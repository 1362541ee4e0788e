// ABOUTME: Library module for pg-insert-export
// ABOUTME: Exports all core functionality for use in the binary and tests

pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod encoder;
pub mod error;
pub mod exporter;
pub mod plan;
pub mod postgres;
pub mod script;
pub mod sink;
pub mod source;
pub mod sqlite;
pub mod table_spec;
pub mod utils;
pub mod value;

pub use error::{ExportError, ExportResult};
pub use exporter::{ExportOptions, ExportSummary, Exporter};
pub use plan::ExportPlan;
pub use value::{Row, Value};
