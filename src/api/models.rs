use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Defines a status enum that tolerates values this console does not know.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal $(| $alias:literal)*),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Unknown(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $wire,)+
                    $name::Unknown(s) => s.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                let lower = s.trim().to_ascii_lowercase();
                match lower.as_str() {
                    $(l if l.eq_ignore_ascii_case($wire) $(|| l == $alias)* => $name::$variant,)+
                    _ => $name::Unknown(s),
                }
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(AccountStatus {
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Inactive => "INACTIVE",
});

wire_enum!(PlanType {
    Credits => "credit_based" | "credits" | "credit",
    Minutes => "minutes_based" | "minutes" | "minute",
});

wire_enum!(BatchStatus {
    Pending => "PENDING",
    Running => "RUNNING" | "active" | "in_progress",
    Paused => "PAUSED" | "inactive",
    Completed => "COMPLETED" | "done",
    Cancelled => "CANCELLED" | "canceled",
    Error => "ERROR" | "failed",
});

wire_enum!(JobStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled" | "canceled",
    Done => "done",
});

impl BatchStatus {
    pub fn label(&self) -> &str {
        match self {
            BatchStatus::Pending => "Pending",
            BatchStatus::Running => "Running",
            BatchStatus::Paused => "Paused",
            BatchStatus::Completed => "Completed",
            BatchStatus::Cancelled => "Cancelled",
            BatchStatus::Error => "Error",
            BatchStatus::Unknown(s) => s.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Cancelled | BatchStatus::Error
        )
    }
}

impl JobStatus {
    pub const FILTERABLE: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Done,
    ];

    pub fn label(&self) -> &str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "In progress",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Done => "Done",
            JobStatus::Unknown(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub plan: PlanType,
    pub total: f64,
    pub spent: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub status: AccountStatus,
    pub balance: Balance,
    pub features: BTreeMap<String, bool>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_contacts: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_cost: f64,
}

impl BatchStats {
    pub fn progress(&self) -> f64 {
        if self.total_contacts == 0 {
            0.0
        } else {
            (self.completed + self.failed) as f64 / self.total_contacts as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: BatchStatus,
    pub stats: BatchStats,
    pub call_settings: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Monetary figures of a job after alternate key names have been resolved.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobFinance {
    pub debt: Option<f64>,
    pub agreed_amount: Option<f64>,
}

impl JobFinance {
    /// Debt minus what the contact agreed to pay, when both are known.
    pub fn shortfall(&self) -> Option<f64> {
        match (self.debt, self.agreed_amount) {
            (Some(d), Some(a)) => Some((d - a).max(0.0)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CallResult {
    pub recording_url: Option<String>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub cost: Option<f64>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub batch_id: Option<String>,
    pub account_id: Option<String>,
    pub contact: Contact,
    pub status: JobStatus,
    pub attempts: u32,
    pub finance: JobFinance,
    pub result: Option<CallResult>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_accounts: u64,
    pub active_accounts: u64,
    pub total_batches: u64,
    pub active_batches: u64,
    pub total_jobs: u64,
    pub pending_jobs: u64,
    pub in_progress_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub success_rate: f64,
    pub total_cost: f64,
    pub calls_today: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Health {
    pub fn is_ok(&self) -> bool {
        matches!(self.status.to_ascii_lowercase().as_str(), "ok" | "healthy" | "up")
    }
}

// ---- requests ----

#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub account_name: String,
    pub plan_type: PlanType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_credits: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_minutes: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSettings {
    pub max_attempts: u32,
    pub retry_delay_hours: u32,
    pub allowed_hours_start: String,
    pub allowed_hours_end: String,
    pub days_of_week: Vec<u8>,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_hours: 24,
            allowed_hours_start: "09:00".into(),
            allowed_hours_end: "20:00".into(),
            days_of_week: vec![1, 2, 3, 4, 5],
            timezone: "America/Santiago".into(),
            voice_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBatch {
    pub account_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub call_settings: CallSettings,
}

/// Multipart fields for the spreadsheet endpoints.
#[derive(Debug, Clone)]
pub struct ExcelUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub account_id: String,
    pub batch_name: Option<String>,
    pub description: Option<String>,
    pub allow_duplicates: bool,
    pub call_settings: Option<CallSettings>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExcelPreview {
    pub columns: Vec<String>,
    pub sample_rows: Vec<crate::import::SampleRow>,
    pub total_rows: u64,
    pub detected_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ExcelCreated {
    pub batch_id: String,
    pub jobs_created: u64,
    pub duplicates_skipped: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JobFilter {
    pub batch_id: Option<String>,
    pub account_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

impl JobFilter {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(b) = &self.batch_id {
            out.push(("batch_id".to_string(), b.clone()));
        }
        if let Some(a) = &self.account_id {
            out.push(("account_id".to_string(), a.clone()));
        }
        if let Some(s) = &self.status {
            out.push(("status".to_string(), s.as_str().to_string()));
        }
        if let Some(l) = self.limit {
            out.push(("limit".to_string(), l.to_string()));
        }
        if let Some(s) = self.skip {
            out.push(("skip".to_string(), s.to_string()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_tolerate_case_and_unknowns() {
        assert_eq!(BatchStatus::from("running".to_string()), BatchStatus::Running);
        assert_eq!(JobStatus::from("IN_PROGRESS".to_string()), JobStatus::InProgress);
        assert_eq!(
            JobStatus::from("voicemail".to_string()),
            JobStatus::Unknown("voicemail".into())
        );
        assert_eq!(PlanType::from("minutes".to_string()), PlanType::Minutes);
        let json = serde_json::to_string(&AccountStatus::Suspended).unwrap();
        assert_eq!(json, "\"SUSPENDED\"");
    }

    #[test]
    fn shortfall_needs_both_figures() {
        let f = JobFinance { debt: Some(100_000.0), agreed_amount: Some(40_000.0) };
        assert_eq!(f.shortfall(), Some(60_000.0));
        let f = JobFinance { debt: Some(100.0), agreed_amount: None };
        assert_eq!(f.shortfall(), None);
    }

    #[test]
    fn job_filter_builds_query() {
        let filter = JobFilter {
            batch_id: Some("b1".into()),
            status: Some(JobStatus::Failed),
            limit: Some(50),
            ..Default::default()
        };
        assert_eq!(
            filter.to_query(),
            vec![
                ("batch_id".to_string(), "b1".to_string()),
                ("status".to_string(), "failed".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }
}
