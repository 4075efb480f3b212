//! Wire → model conversion.
//!
//! The backend has shipped several shapes for the same records over time.
//! Every alternate key name is resolved here, once, so views only ever see
//! the typed models in [`crate::api::models`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::api::models::*;
use crate::error::ApiError;
use crate::import::SampleRow;

fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Reads a number that may arrive as a JSON number or a formatted string
/// such as `"$1.250.000"` or `"1250000.50"`.
fn num_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(value_to_f64))
}

pub fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Lenient amount parsing. The last separator is decimal when it differs
/// from an earlier one (`1.250,5`) or is the only one and is not followed by
/// exactly three digits (`1250.50`); otherwise separators group thousands.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(*c, '.' | ',' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let seps: Vec<(usize, char)> = cleaned.char_indices().filter(|(_, c)| *c == '.' || *c == ',').collect();
    let decimal_at = match seps.as_slice() {
        [] => None,
        [(i, _)] => (cleaned.len() - i - 1 != 3).then_some(*i),
        [.., (_, prev), (i, last)] => (prev != last).then_some(*i),
    };
    let normalized: String = match decimal_at {
        Some(i) => {
            let int: String = cleaned[..i].chars().filter(|c| *c != '.' && *c != ',').collect();
            format!("{}.{}", int, &cleaned[i + 1..])
        }
        None => cleaned.chars().filter(|c| *c != '.' && *c != ',').collect(),
    };
    normalized.parse().ok()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

fn time_field(obj: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    str_field(obj, keys).and_then(|s| parse_timestamp(&s))
}

fn id_of(obj: &Value) -> Option<String> {
    str_field(obj, &["id", "_id"]).or_else(|| {
        obj.get("_id")
            .and_then(|v| v.get("$oid"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}

/// Lists come back bare, or wrapped under a resource key, `data` or `items`.
pub fn unwrap_list(json: Value, resource_key: &str) -> Vec<Value> {
    match json {
        Value::Array(items) => items,
        Value::Object(mut obj) => [resource_key, "data", "items", "results"]
            .iter()
            .find_map(|k| match obj.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Single records may be wrapped as `{ "<resource>": {...} }` or `{ "data": {...} }`.
pub fn unwrap_object(json: Value, resource_key: &str) -> Value {
    if let Value::Object(obj) = &json {
        for key in [resource_key, "data"] {
            if let Some(inner @ Value::Object(_)) = obj.get(key) {
                return inner.clone();
            }
        }
    }
    json
}

pub fn account_from_wire(raw: &Value) -> Result<Account, ApiError> {
    let id = str_field(raw, &["account_id", "id", "_id"])
        .or_else(|| id_of(raw))
        .ok_or_else(|| ApiError::Decode("account without id".into()))?;
    let plan = str_field(raw, &["plan_type"])
        .map(PlanType::from)
        .unwrap_or(PlanType::Credits);
    let balance = match plan {
        PlanType::Minutes => {
            let total = num_field(raw, &["minutes_purchased", "total_minutes"]).unwrap_or(0.0);
            let spent = num_field(raw, &["minutes_used", "used_minutes"]).unwrap_or(0.0);
            Balance {
                plan: plan.clone(),
                total,
                spent,
                remaining: (total - spent).max(0.0),
            }
        }
        _ => {
            let remaining = num_field(raw, &["credit_balance", "credits_remaining", "balance"]).unwrap_or(0.0);
            let spent = num_field(raw, &["credits_used", "credits_spent"]).unwrap_or(0.0);
            let total = num_field(raw, &["credits_purchased", "total_credits"]).unwrap_or(remaining + spent);
            Balance {
                plan: plan.clone(),
                total,
                spent,
                remaining,
            }
        }
    };
    let features = match raw.get("features") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_bool().unwrap_or(!v.is_null())))
            .collect(),
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|v| v.as_str().map(|s| (s.to_string(), true)))
            .collect(),
        _ => BTreeMap::new(),
    };
    Ok(Account {
        id,
        name: str_field(raw, &["account_name", "name"]).unwrap_or_else(|| "Unnamed account".into()),
        status: str_field(raw, &["status"])
            .map(AccountStatus::from)
            .unwrap_or(AccountStatus::Active),
        balance,
        features,
        created_at: time_field(raw, &["created_at"]),
    })
}

/// `is_active` is authoritative only when no explicit status is sent.
pub fn batch_from_wire(raw: &Value) -> Result<Batch, ApiError> {
    let id = str_field(raw, &["batch_id", "id"])
        .or_else(|| id_of(raw))
        .ok_or_else(|| ApiError::Decode("batch without id".into()))?;
    let status = match str_field(raw, &["status"]).map(BatchStatus::from) {
        Some(s) if !matches!(s, BatchStatus::Unknown(_)) => s,
        _ => match raw.get("is_active").and_then(|v| v.as_bool()) {
            Some(true) => BatchStatus::Running,
            Some(false) => BatchStatus::Paused,
            None => BatchStatus::Pending,
        },
    };
    let stats_src = raw.get("stats").filter(|v| v.is_object()).unwrap_or(raw);
    let count = |keys: &[&str]| num_field(stats_src, keys).map(|n| n.max(0.0) as u64).unwrap_or(0);
    let stats = BatchStats {
        total_contacts: count(&["total_jobs", "total_contacts", "total"]),
        pending: count(&["pending_jobs", "pending"]),
        completed: count(&["completed_jobs", "completed"]),
        failed: count(&["failed_jobs", "failed"]),
        total_cost: num_field(stats_src, &["total_cost", "cost"]).unwrap_or(0.0),
    };
    Ok(Batch {
        id,
        account_id: str_field(raw, &["account_id"]).unwrap_or_default(),
        name: str_field(raw, &["name", "batch_name"]).unwrap_or_else(|| "Untitled batch".into()),
        description: str_field(raw, &["description"]),
        status,
        stats,
        call_settings: raw.get("call_settings").cloned().unwrap_or(Value::Null),
        created_at: time_field(raw, &["created_at"]),
    })
}

const DEBT_KEYS: &[&str] = &["debt_amount", "monto_deuda", "deuda", "amount", "monto"];
const AGREED_KEYS: &[&str] = &["agreed_amount", "monto_acordado", "acuerdo_monto", "payment_amount", "monto_pago"];

/// Current schema: contact data under `contact`, variables under `payload`,
/// call outcome under `call_result`.
pub fn job_from_wire_v2(raw: &Value) -> Result<Job, ApiError> {
    let id = id_of(raw).ok_or_else(|| ApiError::Decode("job without id".into()))?;
    let contact_src = raw.get("contact").unwrap_or(&Value::Null);
    let payload = raw.get("payload").unwrap_or(&Value::Null);
    let result_src = raw.get("call_result").filter(|v| v.is_object());
    let extracted = result_src
        .and_then(|r| r.get("extracted_data"))
        .unwrap_or(&Value::Null);

    let finance = JobFinance {
        debt: num_field(payload, DEBT_KEYS),
        agreed_amount: result_src
            .and_then(|r| num_field(r, AGREED_KEYS))
            .or_else(|| num_field(extracted, AGREED_KEYS))
            .or_else(|| num_field(payload, AGREED_KEYS)),
    };
    let result = result_src.map(|r| CallResult {
        recording_url: str_field(r, &["recording_url"]),
        summary: str_field(r, &["summary"]).or_else(|| str_field(extracted, &["summary", "resumen"])),
        sentiment: str_field(r, &["sentiment"]).or_else(|| str_field(extracted, &["sentiment"])),
        cost: num_field(r, &["cost", "call_cost"]),
        duration_seconds: num_field(r, &["duration_seconds", "duration"]),
    });
    Ok(Job {
        id,
        batch_id: str_field(raw, &["batch_id"]),
        account_id: str_field(raw, &["account_id"]),
        contact: Contact {
            name: str_field(contact_src, &["name"]).unwrap_or_default(),
            phone: str_field(contact_src, &["phone", "phones"])
                .or_else(|| {
                    contact_src
                        .get("phones")
                        .and_then(|v| v.as_array())
                        .and_then(|a| a.first())
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_default(),
            email: str_field(contact_src, &["email"]),
        },
        status: str_field(raw, &["status"]).map(JobStatus::from).unwrap_or(JobStatus::Pending),
        attempts: num_field(raw, &["attempts", "attempt_count"]).unwrap_or(0.0) as u32,
        finance,
        result,
        created_at: time_field(raw, &["created_at"]),
        updated_at: time_field(raw, &["updated_at", "last_attempt_at"]),
    })
}

/// Older records: everything flat on the top level.
pub fn job_from_wire_v1(raw: &Value) -> Result<Job, ApiError> {
    let id = id_of(raw).ok_or_else(|| ApiError::Decode("job without id".into()))?;
    let has_result = ["recording_url", "summary", "call_cost", "duration"]
        .iter()
        .any(|k| raw.get(*k).is_some_and(|v| !v.is_null()));
    Ok(Job {
        id,
        batch_id: str_field(raw, &["batch_id"]),
        account_id: str_field(raw, &["account_id"]),
        contact: Contact {
            name: str_field(raw, &["contact_name", "nombre", "name"]).unwrap_or_default(),
            phone: str_field(raw, &["contact_phone", "telefono", "phone"]).unwrap_or_default(),
            email: str_field(raw, &["contact_email", "email"]),
        },
        status: str_field(raw, &["status"]).map(JobStatus::from).unwrap_or(JobStatus::Pending),
        attempts: num_field(raw, &["attempts", "tries"]).unwrap_or(0.0) as u32,
        finance: JobFinance {
            debt: num_field(raw, DEBT_KEYS),
            agreed_amount: num_field(raw, AGREED_KEYS),
        },
        result: has_result.then(|| CallResult {
            recording_url: str_field(raw, &["recording_url"]),
            summary: str_field(raw, &["summary", "resumen"]),
            sentiment: str_field(raw, &["sentiment"]),
            cost: num_field(raw, &["call_cost", "cost"]),
            duration_seconds: num_field(raw, &["duration", "duration_seconds"]),
        }),
        created_at: time_field(raw, &["created_at"]),
        updated_at: time_field(raw, &["updated_at"]),
    })
}

pub fn job_from_wire(raw: &Value) -> Result<Job, ApiError> {
    if raw.get("contact").is_some_and(Value::is_object) || raw.get("call_result").is_some() {
        job_from_wire_v2(raw)
    } else {
        job_from_wire_v1(raw)
    }
}

/// Maps a list, dropping (and logging) records that cannot be read.
pub fn map_list<T>(items: &[Value], what: &str, f: fn(&Value) -> Result<T, ApiError>) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match f(item) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("skipping unreadable {what}: {e}");
                None
            }
        })
        .collect()
}

fn cell_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn excel_preview_from_wire(json: Value) -> ExcelPreview {
    let body = unwrap_object(json, "preview");
    let rows_src = ["sample_rows", "rows", "preview_rows", "sample"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_array()))
        .cloned()
        .unwrap_or_default();
    let mut columns: Vec<String> = body
        .get("columns")
        .or_else(|| body.get("headers"))
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let sample_rows: Vec<SampleRow> = rows_src
        .iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(object_row(map, &columns)),
            Value::Array(cells) if !columns.is_empty() => Some(SampleRow::new(
                columns
                    .iter()
                    .cloned()
                    .zip(cells.iter().map(cell_to_string).chain(std::iter::repeat(String::new())))
                    .collect(),
            )),
            _ => None,
        })
        .collect();
    if columns.is_empty() {
        columns = sample_rows
            .first()
            .map(|r| r.columns().map(str::to_string).collect())
            .unwrap_or_default();
    }
    ExcelPreview {
        columns,
        total_rows: num_field(&body, &["total_rows", "row_count"]).unwrap_or(sample_rows.len() as f64) as u64,
        detected_format: str_field(&body, &["detected_format", "format"]),
        sample_rows,
    }
}

fn object_row(map: &Map<String, Value>, columns: &[String]) -> SampleRow {
    if columns.is_empty() {
        SampleRow::new(map.iter().map(|(k, v)| (k.clone(), cell_to_string(v))).collect())
    } else {
        SampleRow::new(
            columns
                .iter()
                .map(|c| (c.clone(), map.get(c).map(cell_to_string).unwrap_or_default()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_is_active_maps_to_display_status() {
        let b = batch_from_wire(&json!({"_id": "b1", "name": "Marzo", "is_active": false})).unwrap();
        assert_eq!(b.status, BatchStatus::Paused);
        let b = batch_from_wire(&json!({"batch_id": "b2", "is_active": true, "total_jobs": 10, "completed_jobs": 4})).unwrap();
        assert_eq!(b.status, BatchStatus::Running);
        assert_eq!(b.stats.total_contacts, 10);
        assert!((b.stats.progress() - 0.4).abs() < 1e-9);
        let b = batch_from_wire(&json!({"id": "b3", "is_active": false, "status": "COMPLETED"})).unwrap();
        assert_eq!(b.status, BatchStatus::Completed);
    }

    #[test]
    fn account_balances_are_derived() {
        let a = account_from_wire(&json!({
            "account_id": "acc-1", "account_name": "Cobranzas SA",
            "plan_type": "credit_based", "credit_balance": 750.0, "credits_used": 250.0,
            "status": "SUSPENDED"
        }))
        .unwrap();
        assert_eq!(a.status, AccountStatus::Suspended);
        assert_eq!(a.balance.total, 1000.0);
        assert_eq!(a.balance.remaining, 750.0);

        let m = account_from_wire(&json!({
            "id": "acc-2", "plan_type": "minutes_based",
            "minutes_purchased": 100, "minutes_used": 130
        }))
        .unwrap();
        assert_eq!(m.balance.spent, 130.0);
        assert_eq!(m.balance.remaining, 0.0);
    }

    #[test]
    fn job_schemas_resolve_alternate_keys() {
        let v2 = job_from_wire(&json!({
            "_id": "j1",
            "contact": {"name": "Ana", "phones": ["+56911111111"]},
            "payload": {"monto_deuda": "1.250.000"},
            "status": "completed",
            "call_result": {"extracted_data": {"monto_acordado": 500000}, "cost": 0.35}
        }))
        .unwrap();
        assert_eq!(v2.contact.phone, "+56911111111");
        assert_eq!(v2.finance.debt, Some(1_250_000.0));
        assert_eq!(v2.finance.agreed_amount, Some(500_000.0));
        assert_eq!(v2.finance.shortfall(), Some(750_000.0));
        assert_eq!(v2.result.unwrap().cost, Some(0.35));

        let v1 = job_from_wire(&json!({
            "id": "j2", "contact_name": "Luis", "contact_phone": "+56922222222",
            "deuda": 2000, "status": "failed", "attempts": 2
        }))
        .unwrap();
        assert_eq!(v1.finance.debt, Some(2000.0));
        assert_eq!(v1.status, JobStatus::Failed);
        assert_eq!(v1.attempts, 2);
        assert!(v1.result.is_none());
    }

    #[test]
    fn parses_amount_formats() {
        assert_eq!(parse_amount("$1.250.000"), Some(1_250_000.0));
        assert_eq!(parse_amount("1250000.50"), Some(1_250_000.5));
        assert_eq!(parse_amount("1.250,5"), Some(1250.5));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn unwraps_lists_and_preview() {
        let items = unwrap_list(json!({"batches": [{"id": "x"}]}), "batches");
        assert_eq!(items.len(), 1);
        let preview = excel_preview_from_wire(json!({
            "success": true,
            "preview": {
                "columns": ["Nombre", "Telefono"],
                "rows": [["Ana", "+56911111111"], {"Nombre": "Luis", "Telefono": 56922222222u64}],
                "total_rows": 120
            }
        }));
        assert_eq!(preview.columns, vec!["Nombre", "Telefono"]);
        assert_eq!(preview.total_rows, 120);
        assert_eq!(preview.sample_rows.len(), 2);
        assert_eq!(preview.sample_rows[1].get("Telefono"), Some("56922222222"));
    }

    #[test]
    fn parses_naive_timestamps() {
        assert!(parse_timestamp("2024-03-01T10:00:00").is_some());
        assert!(parse_timestamp("2024-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
