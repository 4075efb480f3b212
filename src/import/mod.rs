//! Contact-list import: sample rows, logical fields, column mapping and the
//! wizard that ties them to the spreadsheet endpoints.

pub mod mapper;
pub mod preview;
pub mod uploader;
pub mod validate;
pub mod wizard;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use mapper::{ColumnMapper, ColumnMapping};
pub use validate::{ValidationError, ValidationErrorKind};

/// Rows the validator looks at.
pub const SAMPLE_LIMIT: usize = 5;

/// One spreadsheet row as ordered `(column, value)` pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleRow {
    cells: Vec<(String, String)>,
}

impl SampleRow {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SampleRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    DebtCollection,
    Marketing,
    #[default]
    Generic,
}

impl DetectedFormat {
    pub const ALL: [DetectedFormat; 3] = [
        DetectedFormat::DebtCollection,
        DetectedFormat::Marketing,
        DetectedFormat::Generic,
    ];

    /// Unknown tags fall back to `Generic`.
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "debt_collection" | "cobranza" => DetectedFormat::DebtCollection,
            "marketing" => DetectedFormat::Marketing,
            _ => DetectedFormat::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedFormat::DebtCollection => "debt_collection",
            DetectedFormat::Marketing => "marketing",
            DetectedFormat::Generic => "generic",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DetectedFormat::DebtCollection => "Debt collection",
            DetectedFormat::Marketing => "Marketing",
            DetectedFormat::Generic => "Generic",
        }
    }

    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            DetectedFormat::DebtCollection => {
                &[Field::Name, Field::Phone, Field::DebtAmount, Field::DueDate]
            }
            DetectedFormat::Marketing => &[Field::Name, Field::Phone, Field::Email],
            DetectedFormat::Generic => &[Field::Name, Field::Phone],
        }
    }
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical variables a contact list can carry. Declaration order is the
/// auto-mapping priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Phone,
    Email,
    DebtAmount,
    DueDate,
    Rut,
    Company,
    Address,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Name,
        Field::Phone,
        Field::Email,
        Field::DebtAmount,
        Field::DueDate,
        Field::Rut,
        Field::Company,
        Field::Address,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Phone => "phone",
            Field::Email => "email",
            Field::DebtAmount => "debt_amount",
            Field::DueDate => "due_date",
            Field::Rut => "rut",
            Field::Company => "company",
            Field::Address => "address",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Phone => "Phone",
            Field::Email => "Email",
            Field::DebtAmount => "Debt amount",
            Field::DueDate => "Due date",
            Field::Rut => "RUT",
            Field::Company => "Company",
            Field::Address => "Address",
        }
    }

    /// Lower-cased header names recognised for this field. Lists are disjoint.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Field::Name => &["nombre", "name", "cliente", "nombre_cliente", "nombre completo", "full_name", "contacto"],
            Field::Phone => &["telefono", "teléfono", "phone", "celular", "movil", "móvil", "numero", "número"],
            Field::Email => &["email", "correo", "mail", "e-mail", "correo_electronico"],
            Field::DebtAmount => &["monto", "deuda", "debt", "debt_amount", "monto_deuda", "saldo", "amount"],
            Field::DueDate => &["vencimiento", "fecha_vencimiento", "due_date", "fecha_venc", "fecha"],
            Field::Rut => &["rut", "dni", "documento", "run"],
            Field::Company => &["empresa", "company", "compania", "compañia", "compañía"],
            Field::Address => &["direccion", "dirección", "address", "domicilio"],
        }
    }

    pub fn matches_header(&self, header: &str) -> bool {
        let normalized = header.trim().to_lowercase();
        self.keywords().contains(&normalized.as_str())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn debt_collection_extends_generic_by_two_fields() {
        let generic: HashSet<_> = DetectedFormat::Generic.required_fields().iter().copied().collect();
        let debt: HashSet<_> = DetectedFormat::DebtCollection.required_fields().iter().copied().collect();
        assert!(debt.is_superset(&generic));
        let diff: HashSet<_> = debt.difference(&generic).copied().collect();
        assert_eq!(diff, HashSet::from([Field::DebtAmount, Field::DueDate]));
    }

    #[test]
    fn keyword_lists_are_disjoint() {
        let mut seen = HashSet::new();
        for field in Field::ALL {
            for kw in field.keywords() {
                assert!(seen.insert(*kw), "keyword {kw} listed twice");
            }
        }
    }

    #[test]
    fn unknown_format_is_generic() {
        assert_eq!(DetectedFormat::parse_lenient("survey"), DetectedFormat::Generic);
        assert_eq!(DetectedFormat::parse_lenient(" Marketing "), DetectedFormat::Marketing);
    }

    #[test]
    fn sample_row_lookup() {
        let row: SampleRow = [("Nombre", "Ana"), ("Telefono", "")].into_iter().collect();
        assert_eq!(row.get("Nombre"), Some("Ana"));
        assert_eq!(row.get("Email"), None);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["Nombre", "Telefono"]);
        assert!(!row.is_empty());
    }
}
