use super::{DetectedFormat, Field, SAMPLE_LIMIT, SampleRow};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalPreview {
    pub columns: Vec<String>,
    pub rows: Vec<SampleRow>,
    pub total_rows: u64,
    pub format: DetectedFormat,
}

/// Spreadsheet exports from Excel in Spanish locales use `;`.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

/// Reads headers and the first [`SAMPLE_LIMIT`] non-empty rows of a CSV file.
pub fn sample_csv(bytes: &[u8]) -> Result<LocalPreview, csv::Error> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    let mut total_rows = 0u64;
    for record in reader.records() {
        let record = record?;
        let row: SampleRow = columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.clone(), record.get(i).unwrap_or_default().to_string()))
            .collect();
        if row.is_empty() {
            continue;
        }
        total_rows += 1;
        if rows.len() < SAMPLE_LIMIT {
            rows.push(row);
        }
    }

    let format = detect_format(&columns);
    Ok(LocalPreview {
        columns,
        rows,
        total_rows,
        format,
    })
}

/// Debt columns win over email columns; anything else is generic.
pub fn detect_format(columns: &[String]) -> DetectedFormat {
    let has = |field: Field| columns.iter().any(|c| field.matches_header(c));
    if has(Field::DebtAmount) || has(Field::DueDate) {
        DetectedFormat::DebtCollection
    } else if has(Field::Email) {
        DetectedFormat::Marketing
    } else {
        DetectedFormat::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_semicolon_csv_with_bom() {
        let mut data = "\u{feff}Nombre;Telefono;Deuda\n".to_string();
        for i in 0..8 {
            data.push_str(&format!("Cliente {i};+5691234567{i};{}\n", 1000 * i));
        }
        data.push_str(";;\n");
        let preview = sample_csv(data.as_bytes()).unwrap();
        assert_eq!(preview.columns, vec!["Nombre", "Telefono", "Deuda"]);
        assert_eq!(preview.rows.len(), SAMPLE_LIMIT);
        assert_eq!(preview.total_rows, 8);
        assert_eq!(preview.rows[2].get("Telefono"), Some("+56912345672"));
        assert_eq!(preview.format, DetectedFormat::DebtCollection);
    }

    #[test]
    fn detects_marketing_and_generic() {
        let cols = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(detect_format(&cols(&["Nombre", "Email"])), DetectedFormat::Marketing);
        assert_eq!(detect_format(&cols(&["Nombre", "Celular"])), DetectedFormat::Generic);
    }

    #[test]
    fn short_rows_are_padded() {
        let preview = sample_csv(b"name,phone,email\nAna,+56911111111\n").unwrap();
        assert_eq!(preview.rows[0].get("email"), Some(""));
    }
}
