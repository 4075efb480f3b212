use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{ColumnMapping, DetectedFormat, Field, SAMPLE_LIMIT, SampleRow};

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationErrorKind {
    MissingRequired(Field),
    InvalidPhone,
    InvalidEmail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub row: usize,
    pub column: String,
    pub message: String,
    pub value: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn is_missing_required(&self) -> bool {
        matches!(self.kind, ValidationErrorKind::MissingRequired(_))
    }
}

/// Spaces and hyphens are ignored.
pub fn is_valid_phone(raw: &str) -> bool {
    let stripped: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    PHONE_RE.is_match(&stripped)
}

pub fn is_valid_email(raw: &str) -> bool {
    EMAIL_RE.is_match(raw)
}

/// Checks the first [`SAMPLE_LIMIT`] rows against `mapping`.
///
/// Missing required fields come first (one per field, row 0), then one entry
/// per failing phone or email cell. Nothing is deduplicated.
pub fn validate_sample(
    rows: &[SampleRow],
    mapping: &ColumnMapping,
    format: DetectedFormat,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for field in format.required_fields() {
        let mapped = mapping.get(field).is_some_and(|c| !c.trim().is_empty());
        if !mapped {
            errors.push(ValidationError {
                row: 0,
                column: field.as_str().to_string(),
                message: format!("Required field \"{}\" is not mapped to a column", field.label()),
                value: String::new(),
                kind: ValidationErrorKind::MissingRequired(*field),
            });
        }
    }

    let phone_col = mapping.get(&Field::Phone).filter(|c| !c.is_empty());
    let email_col = mapping.get(&Field::Email).filter(|c| !c.is_empty());

    for (idx, row) in rows.iter().take(SAMPLE_LIMIT).enumerate() {
        if let Some(col) = phone_col {
            let value = row.get(col).unwrap_or_default();
            if !is_valid_phone(value) {
                errors.push(ValidationError {
                    row: idx,
                    column: col.clone(),
                    message: format!("Invalid phone number in row {}", idx + 1),
                    value: value.to_string(),
                    kind: ValidationErrorKind::InvalidPhone,
                });
            }
        }
        if let Some(col) = email_col {
            let value = row.get(col).unwrap_or_default();
            if !is_valid_email(value) {
                errors.push(ValidationError {
                    row: idx,
                    column: col.clone(),
                    message: format!("Invalid email address in row {}", idx + 1),
                    value: value.to_string(),
                    kind: ValidationErrorKind::InvalidEmail,
                });
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> SampleRow {
        cells.iter().copied().collect()
    }

    #[test]
    fn phone_rules() {
        assert!(is_valid_phone("+56912345678"));
        assert!(!is_valid_phone("56912345678x"));
        assert!(is_valid_phone("123 456"));
        assert!(is_valid_phone("+56-9-1234-5678"));
        assert!(!is_valid_phone("0912345678"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn email_rules() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
    }

    #[test]
    fn one_error_per_missing_required_field() {
        let mapping = ColumnMapping::from([(Field::Name, "Nombre".to_string())]);
        let errors = validate_sample(&[], &mapping, DetectedFormat::DebtCollection);
        let missing: Vec<_> = errors.iter().filter(|e| e.is_missing_required()).collect();
        assert_eq!(missing.len(), 3);
        assert!(missing.iter().all(|e| e.row == 0));
        assert_eq!(
            missing.iter().filter(|e| e.kind == ValidationErrorKind::MissingRequired(Field::DueDate)).count(),
            1
        );
    }

    #[test]
    fn reports_every_failing_row_up_to_the_limit() {
        let rows: Vec<SampleRow> = (0..8)
            .map(|_| row(&[("Nombre", "X"), ("Fono", "abc"), ("Mail", "nope")]))
            .collect();
        let mapping = ColumnMapping::from([
            (Field::Name, "Nombre".to_string()),
            (Field::Phone, "Fono".to_string()),
            (Field::Email, "Mail".to_string()),
        ]);
        let errors = validate_sample(&rows, &mapping, DetectedFormat::Marketing);
        let phones = errors.iter().filter(|e| e.kind == ValidationErrorKind::InvalidPhone).count();
        let emails = errors.iter().filter(|e| e.kind == ValidationErrorKind::InvalidEmail).count();
        assert_eq!(phones, SAMPLE_LIMIT);
        assert_eq!(emails, SAMPLE_LIMIT);
        assert_eq!(errors[0].column, "Fono");
        assert_eq!(errors[0].value, "abc");
    }
}
