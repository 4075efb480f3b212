use std::collections::BTreeMap;

use super::validate::{ValidationError, validate_sample};
use super::{DetectedFormat, Field, SampleRow};

/// Logical field → source column header.
pub type ColumnMapping = BTreeMap<Field, String>;

type MappingCallback = Box<dyn Fn(&ColumnMapping)>;
type ValidationCallback = Box<dyn Fn(&[ValidationError])>;

/// Columns in source order, taken from the first row.
pub fn available_columns(rows: &[SampleRow]) -> Vec<String> {
    rows.first()
        .map(|r| r.columns().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Greedy first-match auto-mapping.
///
/// Columns are visited in source order; each column goes to the first field
/// (in [`Field::ALL`] order) whose keyword list contains it and that is still
/// unmapped. A mapped field is never reassigned.
pub fn auto_map(columns: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    for column in columns {
        if let Some(field) = Field::ALL
            .iter()
            .find(|f| !mapping.contains_key(*f) && f.matches_header(column))
        {
            mapping.insert(*field, column.clone());
        }
    }
    mapping
}

/// Mapping state for one wizard session.
pub struct ColumnMapper {
    rows: Vec<SampleRow>,
    format: DetectedFormat,
    columns: Vec<String>,
    mapping: ColumnMapping,
    errors: Vec<ValidationError>,
    on_mapping_change: Option<MappingCallback>,
    on_validation_change: Option<ValidationCallback>,
}

impl ColumnMapper {
    pub fn new(rows: Vec<SampleRow>, format: DetectedFormat) -> Self {
        let columns = available_columns(&rows);
        let mapping = auto_map(&columns);
        let errors = validate_sample(&rows, &mapping, format);
        Self {
            rows,
            format,
            columns,
            mapping,
            errors,
            on_mapping_change: None,
            on_validation_change: None,
        }
    }

    pub fn connect_mapping_changed<F: Fn(&ColumnMapping) + 'static>(&mut self, f: F) {
        self.on_mapping_change = Some(Box::new(f));
    }

    pub fn connect_validation_changed<F: Fn(&[ValidationError]) + 'static>(&mut self, f: F) {
        self.on_validation_change = Some(Box::new(f));
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn format(&self) -> DetectedFormat {
        self.format
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn required_fields(&self) -> &'static [Field] {
        self.format.required_fields()
    }

    pub fn has_blocking_errors(&self) -> bool {
        self.errors.iter().any(ValidationError::is_missing_required)
    }

    /// Replaces the sample. Auto-mapping runs again only if the column set
    /// changed; user edits survive a reload of the same file layout.
    pub fn set_sample(&mut self, rows: Vec<SampleRow>, format: DetectedFormat) {
        let columns = available_columns(&rows);
        self.rows = rows;
        self.format = format;
        if columns != self.columns {
            self.columns = columns;
            self.mapping = auto_map(&self.columns);
            self.emit_mapping();
        }
        self.revalidate();
    }

    /// Sets or clears (`None` or empty) the column for `field`.
    pub fn set_field(&mut self, field: Field, column: Option<&str>) {
        match column.map(str::trim).filter(|c| !c.is_empty()) {
            Some(col) => {
                self.mapping.insert(field, col.to_string());
            }
            None => {
                self.mapping.remove(&field);
            }
        }
        self.emit_mapping();
        self.revalidate();
    }

    fn emit_mapping(&self) {
        if let Some(cb) = &self.on_mapping_change {
            cb(&self.mapping);
        }
    }

    fn revalidate(&mut self) {
        let errors = validate_sample(&self.rows, &self.mapping, self.format);
        if errors != self.errors {
            self.errors = errors;
            if let Some(cb) = &self.on_validation_change {
                cb(&self.errors);
            }
        }
    }
}
