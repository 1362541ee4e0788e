// ABOUTME: Per-table export settings: qualified name, ordering key and column handling
// ABOUTME: Parses CLI table specs and validates identifiers before they reach SQL

use crate::utils::{self, quote_ident};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Table name, optionally qualified by schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    pub fn new(schema: Option<String>, name: String) -> Result<Self> {
        if let Some(ref schema) = schema {
            utils::validate_postgres_identifier(schema)
                .with_context(|| format!("Invalid schema name in table '{}.{}'", schema, name))?;
        }
        utils::validate_postgres_identifier(&name)
            .with_context(|| format!("Invalid table name '{}'", name))?;
        Ok(Self { schema, name })
    }

    /// Parse `table` or `schema.table`
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        match spec.split_once('.') {
            Some((schema, name)) => {
                if name.contains('.') {
                    bail!(
                        "Table '{}' has too many '.' separators; expected schema.table",
                        spec
                    );
                }
                Self::new(Some(schema.to_string()), name.to_string())
            }
            None => Self::new(None, spec.to_string()),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL form, with each part quoted only when it has to be
    pub fn qualified(&self) -> String {
        match self.schema {
            Some(ref schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schema {
            Some(ref schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Type a JSON-designated column is cast to in the generated literal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonCast {
    #[default]
    Jsonb,
    Json,
}

impl JsonCast {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JsonCast::Jsonb => "jsonb",
            JsonCast::Json => "json",
        }
    }
}

/// How the encoder treats one column of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Plain,
    Json(JsonCast),
    /// Always exported as NULL
    Excluded,
}

/// Everything needed to export one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSpec {
    table: TableName,
    order_by: Vec<String>,
    columns: Option<Vec<String>>,
    json_columns: BTreeSet<String>,
    json_cast: JsonCast,
    excluded: BTreeSet<String>,
    page_size: u64,
}

impl TableSpec {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            order_by: Vec::new(),
            columns: None,
            json_columns: BTreeSet::new(),
            json_cast: JsonCast::default(),
            excluded: BTreeSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Parse a CLI table spec: `schema.table[:key1+key2][:page_size]`
    ///
    /// An empty key section (`schema.table::50`) means no ordering key.
    pub fn parse_cli(spec: &str, default_page_size: u64) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() > 3 {
            bail!(
                "Table spec '{}' must be schema.table[:order_keys][:page_size]",
                spec
            );
        }

        let mut table = Self::new(TableName::parse(parts[0])?);
        table.set_page_size(default_page_size)?;

        if let Some(keys) = parts.get(1) {
            let keys: Vec<String> = keys
                .split('+')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            table.set_order_by(keys)?;
        }

        if let Some(page_size) = parts.get(2) {
            let page_size = page_size
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid page size in table spec '{}'", spec))?;
            table.set_page_size(page_size)?;
        }

        Ok(table)
    }

    pub fn set_order_by(&mut self, columns: Vec<String>) -> Result<()> {
        for column in &columns {
            utils::validate_postgres_identifier(column).with_context(|| {
                format!("Invalid ordering column for table '{}'", self.table)
            })?;
        }
        self.order_by = columns;
        Ok(())
    }

    /// Restrict the export to `columns`, in that order
    pub fn set_columns(&mut self, columns: Vec<String>) -> Result<()> {
        if columns.is_empty() {
            bail!("Column allow-list for table '{}' cannot be empty", self.table);
        }
        let mut seen = BTreeSet::new();
        for column in &columns {
            utils::validate_postgres_identifier(column)
                .with_context(|| format!("Invalid column for table '{}'", self.table))?;
            if !seen.insert(column.as_str()) {
                bail!(
                    "Column '{}' listed twice for table '{}'",
                    column,
                    self.table
                );
            }
        }
        self.columns = Some(columns);
        Ok(())
    }

    pub fn add_json_column(&mut self, column: String) -> Result<()> {
        utils::validate_postgres_identifier(&column)
            .with_context(|| format!("Invalid JSON column for table '{}'", self.table))?;
        self.json_columns.insert(column);
        Ok(())
    }

    pub fn set_json_cast(&mut self, cast: JsonCast) {
        self.json_cast = cast;
    }

    pub fn add_excluded_column(&mut self, column: String) -> Result<()> {
        utils::validate_postgres_identifier(&column)
            .with_context(|| format!("Invalid excluded column for table '{}'", self.table))?;
        self.excluded.insert(column);
        Ok(())
    }

    pub fn set_page_size(&mut self, page_size: u64) -> Result<()> {
        if page_size == 0 {
            bail!("Page size for table '{}' must be at least 1", self.table);
        }
        self.page_size = page_size;
        Ok(())
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn order_by(&self) -> &[String] {
        &self.order_by
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn excluded_columns(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Exclusion wins over JSON designation
    pub fn column_kind(&self, column: &str) -> ColumnKind {
        if self.excluded.contains(column) {
            ColumnKind::Excluded
        } else if self.json_columns.contains(column) {
            ColumnKind::Json(self.json_cast)
        } else {
            ColumnKind::Plain
        }
    }

    /// SELECT list for the page query
    ///
    /// Without an allow-list every column is read. With one, excluded columns
    /// are projected as NULL so their payload is never transferred.
    pub fn projection(&self) -> String {
        match self.columns {
            None => "*".to_string(),
            Some(ref columns) => columns
                .iter()
                .map(|column| {
                    if self.excluded.contains(column) {
                        format!("NULL AS {}", quote_ident(column))
                    } else {
                        quote_ident(column)
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// `ORDER BY ...` clause, or None when the table has no ordering key
    pub fn order_clause(&self) -> Option<String> {
        if self.order_by.is_empty() {
            return None;
        }
        let keys: Vec<String> = self.order_by.iter().map(|k| quote_ident(k)).collect();
        Some(format!("ORDER BY {}", keys.join(", ")))
    }

    /// Comment line that opens this table's section in the script
    pub fn section_comment(&self) -> String {
        if self.excluded.is_empty() {
            format!("-- {} table data", self.table)
        } else {
            let excluded: Vec<&str> = self.excluded_columns().collect();
            format!(
                "-- {} table data ({} excluded)",
                self.table,
                excluded.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_qualified_table_name() {
        let table = TableName::parse("vespro.forms").unwrap();
        assert_eq!(table.schema(), Some("vespro"));
        assert_eq!(table.name(), "forms");
        assert_eq!(table.to_string(), "vespro.forms");
        assert_eq!(table.qualified(), "vespro.forms");
    }

    #[test]
    fn qualified_quotes_mixed_case() {
        let table = TableName::parse("public.CostItems").unwrap();
        assert_eq!(table.qualified(), "public.\"CostItems\"");
    }

    #[test]
    fn reject_injection_in_table_name() {
        assert!(TableName::parse("forms; DROP TABLE forms").is_err());
        assert!(TableName::parse("a.b.c").is_err());
        assert!(TableName::parse("").is_err());
    }

    #[test]
    fn parse_cli_full_spec() {
        let spec = TableSpec::parse_cli("vespro.forms:created_at+form_id:10", 100).unwrap();
        assert_eq!(spec.table().to_string(), "vespro.forms");
        assert_eq!(spec.order_by(), &["created_at", "form_id"]);
        assert_eq!(spec.page_size(), 10);
    }

    #[test]
    fn parse_cli_defaults() {
        let spec = TableSpec::parse_cli("materials", 40).unwrap();
        assert!(spec.order_by().is_empty());
        assert_eq!(spec.page_size(), 40);

        let spec = TableSpec::parse_cli("vespro.cost_items::50", 40).unwrap();
        assert!(spec.order_by().is_empty());
        assert_eq!(spec.page_size(), 50);
    }

    #[test]
    fn parse_cli_rejects_bad_specs() {
        assert!(TableSpec::parse_cli("forms:id:0", 100).is_err());
        assert!(TableSpec::parse_cli("forms:id:abc", 100).is_err());
        assert!(TableSpec::parse_cli("forms:id:10:extra", 100).is_err());
        assert!(TableSpec::parse_cli("forms:id;drop", 100).is_err());
    }

    #[test]
    fn excluded_takes_precedence_over_json() {
        let mut spec = TableSpec::new(TableName::parse("forms").unwrap());
        spec.add_json_column("metadata".into()).unwrap();
        spec.add_json_column("file_data".into()).unwrap();
        spec.add_excluded_column("file_data".into()).unwrap();
        spec.set_json_cast(JsonCast::Json);

        assert_eq!(spec.column_kind("metadata"), ColumnKind::Json(JsonCast::Json));
        assert_eq!(spec.column_kind("file_data"), ColumnKind::Excluded);
        assert_eq!(spec.column_kind("notes"), ColumnKind::Plain);
    }

    #[test]
    fn projection_nulls_excluded_allow_listed_columns() {
        let mut spec = TableSpec::new(TableName::parse("vespro.forms").unwrap());
        assert_eq!(spec.projection(), "*");

        spec.set_columns(vec!["form_id".into(), "file_data".into(), "Title".into()])
            .unwrap();
        spec.add_excluded_column("file_data".into()).unwrap();
        assert_eq!(
            spec.projection(),
            "form_id, NULL AS file_data, \"Title\""
        );
    }

    #[test]
    fn duplicate_allow_list_column_rejected() {
        let mut spec = TableSpec::new(TableName::parse("forms").unwrap());
        assert!(spec.set_columns(vec!["id".into(), "id".into()]).is_err());
        assert!(spec.set_columns(vec![]).is_err());
    }

    #[test]
    fn order_clause_and_section_comment() {
        let mut spec = TableSpec::new(TableName::parse("vespro.forms").unwrap());
        assert_eq!(spec.order_clause(), None);
        assert_eq!(spec.section_comment(), "-- vespro.forms table data");

        spec.set_order_by(vec!["created_at".into(), "order".into()])
            .unwrap();
        spec.add_excluded_column("file_data".into()).unwrap();
        assert_eq!(
            spec.order_clause().unwrap(),
            "ORDER BY created_at, \"order\""
        );
        assert_eq!(
            spec.section_comment(),
            "-- vespro.forms table data (file_data excluded)"
        );
    }
}
