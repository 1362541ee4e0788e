// ABOUTME: Parses export configuration files (TOML) into table specs and run defaults
// ABOUTME: Also parses table.column references given on the command line

use crate::table_spec::{JsonCast, TableName, TableSpec, DEFAULT_PAGE_SIZE};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Top-level export configuration
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub output: Option<PathBuf>,
    pub search_path: Option<String>,
    pub page_size: Option<u64>,
    pub header: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// One `[[tables]]` entry
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub order_by: Vec<String>,
    pub page_size: Option<u64>,
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub json_columns: Vec<String>,
    #[serde(default)]
    pub json_cast: JsonCast,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl TableConfig {
    /// Build the table spec; `default_page_size` applies when the entry has none
    pub fn to_spec(&self, default_page_size: u64) -> Result<TableSpec> {
        let mut spec = TableSpec::new(
            TableName::parse(&self.name)
                .with_context(|| format!("Invalid table name '{}' in config", self.name))?,
        );
        spec.set_page_size(self.page_size.unwrap_or(default_page_size))?;
        spec.set_order_by(self.order_by.clone())?;
        if let Some(ref columns) = self.columns {
            spec.set_columns(columns.clone())?;
        }
        for column in &self.json_columns {
            spec.add_json_column(column.clone())?;
        }
        spec.set_json_cast(self.json_cast);
        for column in &self.exclude {
            spec.add_excluded_column(column.clone())?;
        }
        Ok(spec)
    }
}

impl ExportConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML export config")
    }

    /// Page size for tables without their own: CLI flag, then file, then built-in
    pub fn default_page_size(&self, cli: Option<u64>) -> u64 {
        cli.or(self.page_size).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Table specs in file order
    pub fn table_specs(&self, default_page_size: u64) -> Result<Vec<TableSpec>> {
        self.tables
            .iter()
            .map(|table| table.to_spec(default_page_size))
            .collect()
    }
}

pub fn load_export_config(path: &str) -> Result<ExportConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path))?;
    ExportConfig::parse(&raw).with_context(|| format!("Invalid config file at {}", path))
}

/// Parse a `[schema.]table.column` reference from the command line
///
/// The last dot separates the column from the table name.
pub fn parse_column_ref(reference: &str) -> Result<(TableName, String)> {
    let Some((table, column)) = reference.trim().rsplit_once('.') else {
        bail!(
            "Column reference '{}' must be table.column or schema.table.column",
            reference
        );
    };
    let table = TableName::parse(table)
        .with_context(|| format!("Invalid table in column reference '{}'", reference))?;
    crate::utils::validate_postgres_identifier(column)
        .with_context(|| format!("Invalid column in column reference '{}'", reference))?;
    Ok((table, column.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_spec::ColumnKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
        output = "insertdata.sql"
        search_path = "vespro"
        page_size = 50
        header = ["Vespro Database Data Export", "Generated for n8n Agent Integration"]
        timeout_secs = 30
        max_retries = 5

        [[tables]]
        name = "vespro.forms"
        order_by = ["created_at", "form_id"]
        page_size = 10
        columns = ["form_id", "form_code", "file_data", "metadata"]
        json_columns = ["metadata"]
        json_cast = "json"
        exclude = ["file_data"]

        [[tables]]
        name = "vespro.cost_items"
        order_by = ["id"]
    "#;

    #[test]
    fn parse_sample_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{}", SAMPLE).unwrap();

        let config = load_export_config(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(config.output, Some(PathBuf::from("insertdata.sql")));
        assert_eq!(config.search_path.as_deref(), Some("vespro"));
        assert_eq!(config.max_retries, Some(5));
        assert_eq!(config.header.as_ref().map(Vec::len), Some(2));

        let specs = config
            .table_specs(config.default_page_size(None))
            .unwrap();
        assert_eq!(specs.len(), 2);

        let forms = &specs[0];
        assert_eq!(forms.table().to_string(), "vespro.forms");
        assert_eq!(forms.page_size(), 10);
        assert_eq!(forms.order_by(), ["created_at", "form_id"]);
        assert_eq!(forms.column_kind("metadata"), ColumnKind::Json(JsonCast::Json));
        assert_eq!(forms.column_kind("file_data"), ColumnKind::Excluded);
        assert_eq!(
            forms.projection(),
            "form_id, form_code, NULL AS file_data, metadata"
        );

        // falls back to the file-level page size
        assert_eq!(specs[1].page_size(), 50);

        let specs = config.table_specs(config.default_page_size(Some(7))).unwrap();
        assert_eq!(specs[0].page_size(), 10);
        assert_eq!(specs[1].page_size(), 7);
    }

    #[test]
    fn empty_config_uses_builtin_page_size() {
        let config = ExportConfig::parse("").unwrap();
        assert_eq!(config.default_page_size(None), DEFAULT_PAGE_SIZE);
        assert!(config.table_specs(DEFAULT_PAGE_SIZE).unwrap().is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ExportConfig::parse("[[tables]]\nname = \"t\"\nwhere = \"x > 1\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("where"));
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        let config =
            ExportConfig::parse("[[tables]]\nname = \"t\"\norder_by = [\"id; DROP TABLE t\"]\n")
                .unwrap();
        assert!(config.table_specs(100).is_err());
    }

    #[test]
    fn parse_column_references() {
        let (table, column) = parse_column_ref("vespro.forms.file_data").unwrap();
        assert_eq!(table.to_string(), "vespro.forms");
        assert_eq!(column, "file_data");

        let (table, column) = parse_column_ref("widgets.meta").unwrap();
        assert_eq!(table.to_string(), "widgets");
        assert_eq!(column, "meta");

        assert!(parse_column_ref("nodot").is_err());
        assert!(parse_column_ref("a.b.c.d").is_err());
    }
}
