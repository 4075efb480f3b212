//! Job list exports: UTF-8 CSV with a byte order mark, and an HTML table
//! saved as `.xls` that spreadsheet apps open directly.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::api::models::Job;

const BOM: &[u8] = b"\xEF\xBB\xBF";

pub const COLUMNS: [&str; 12] = [
    "Contact",
    "Phone",
    "Status",
    "Debt",
    "Agreed amount",
    "Shortfall",
    "Created",
    "Updated",
    "Cost",
    "Sentiment",
    "Summary",
    "Recording URL",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported export type: {0}")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xls,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xls => "xls",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xls" => Ok(ExportFormat::Xls),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

fn money(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_default()
}

/// Keeps one job on one line.
fn single_line(s: &str) -> String {
    s.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn row(job: &Job) -> [String; 12] {
    let result = job.result.as_ref();
    let text = |f: fn(&crate::api::models::CallResult) -> Option<&String>| {
        result.and_then(f).map(|s| single_line(s)).unwrap_or_default()
    };
    let ts = |t: Option<&chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default()
    };
    [
        single_line(&job.contact.name),
        single_line(&job.contact.phone),
        job.status.as_str().to_string(),
        money(job.finance.debt),
        money(job.finance.agreed_amount),
        money(job.finance.shortfall()),
        ts(job.created_at.as_ref()),
        ts(job.updated_at.as_ref()),
        money(result.and_then(|r| r.cost)),
        text(|r| r.sentiment.as_ref()),
        text(|r| r.summary.as_ref()),
        text(|r| r.recording_url.as_ref()),
    ]
}

pub fn jobs_to_csv(jobs: &[Job]) -> Result<Vec<u8>, ExportError> {
    let mut out = BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut out);
        writer.write_record(COLUMNS)?;
        for job in jobs {
            writer.write_record(row(job))?;
        }
        writer.flush()?;
    }
    Ok(out)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn jobs_to_xls(jobs: &[Job]) -> String {
    let mut html = String::from(
        "<html><head><meta charset=\"utf-8\"></head><body><table border=\"1\">\n<tr>",
    );
    for col in COLUMNS {
        html.push_str(&format!("<th>{}</th>", escape_html(col)));
    }
    html.push_str("</tr>\n");
    for job in jobs {
        html.push_str("<tr>");
        for cell in row(job) {
            html.push_str(&format!("<td>{}</td>", escape_html(&cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table></body></html>\n");
    html
}

/// Writes `jobs` to `path` in the format its extension names.
pub fn write_jobs(path: &Path, jobs: &[Job]) -> Result<ExportFormat, ExportError> {
    let format = ExportFormat::from_path(path)?;
    match format {
        ExportFormat::Csv => fs::write(path, jobs_to_csv(jobs)?)?,
        ExportFormat::Xls => fs::write(path, jobs_to_xls(jobs))?,
    }
    log::info!("exported {} jobs to {}", jobs.len(), path.display());
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{CallResult, Contact, JobFinance, JobStatus};

    fn job(name: &str, debt: f64, agreed: f64, summary: &str) -> Job {
        Job {
            id: name.into(),
            batch_id: Some("b1".into()),
            account_id: None,
            contact: Contact {
                name: name.into(),
                phone: "+56 9 1234 5678".into(),
                email: None,
            },
            status: JobStatus::Completed,
            attempts: 1,
            finance: JobFinance {
                debt: Some(debt),
                agreed_amount: Some(agreed),
            },
            result: Some(CallResult {
                summary: Some(summary.into()),
                cost: Some(0.1),
                ..Default::default()
            }),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn csv_has_bom_header_and_one_line_per_job() {
        let jobs = vec![
            job("Ana", 1000.0, 250.5, "agreed to pay\nnext week"),
            job("Luis, Jr.", 20.0, 0.0, "no answer"),
            job("Eva", 5.0, 5.0, "\"paid\""),
        ];
        let bytes = jobs_to_csv(&jobs).unwrap();
        assert!(bytes.starts_with(BOM));
        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).unwrap();
        assert_eq!(text.lines().count(), jobs.len() + 1);
        assert!(text.starts_with("Contact,Phone,Status,Debt"));

        let first = text.lines().nth(1).unwrap();
        assert!(first.contains("1000.00,250.50,749.50"));
        assert!(first.contains("agreed to pay next week"));
        assert!(first.contains(",0.10,"));
        assert!(text.lines().nth(2).unwrap().starts_with("\"Luis, Jr.\""));
    }

    #[test]
    fn empty_export_is_header_only() {
        let bytes = jobs_to_csv(&[]).unwrap();
        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn xls_escapes_cells() {
        let html = jobs_to_xls(&[job("<b>Tom & Jerry</b>", 1.0, 1.0, "ok")]);
        assert!(html.contains("<td>&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;</td>"));
        assert_eq!(html.matches("<tr>").count(), 2);
        assert!(html.contains("<td>0.00</td>"));
    }

    #[test]
    fn writes_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.XLS");
        assert_eq!(write_jobs(&path, &[job("Ana", 1.0, 0.0, "")]).unwrap(), ExportFormat::Xls);
        assert!(fs::read_to_string(&path).unwrap().contains("<table"));
        assert!(matches!(
            write_jobs(&dir.path().join("jobs.pdf"), &[]),
            Err(ExportError::UnknownFormat(_))
        ));
    }
}
