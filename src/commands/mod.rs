// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports the export command and its argument types

pub mod export;

pub use export::{export, ExportArgs};
