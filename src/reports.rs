//! Financial roll-up over a list of jobs.

use std::collections::BTreeMap;

use crate::api::models::{Job, JobStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialSummary {
    pub jobs: usize,
    pub total_debt: f64,
    pub total_agreed: f64,
    pub total_shortfall: f64,
    pub total_cost: f64,
    /// Keyed by the wire status string so unknown statuses get their own row.
    pub by_status: BTreeMap<String, usize>,
    pub completed: usize,
    pub average_duration_secs: Option<f64>,
}

impl FinancialSummary {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut summary = Self {
            jobs: jobs.len(),
            ..Self::default()
        };
        let mut durations = Vec::new();

        for job in jobs {
            summary.total_debt += job.finance.debt.unwrap_or(0.0);
            summary.total_agreed += job.finance.agreed_amount.unwrap_or(0.0);
            summary.total_shortfall += job.finance.shortfall().unwrap_or(0.0);
            *summary.by_status.entry(job.status.as_str().to_string()).or_default() += 1;
            if matches!(job.status, JobStatus::Completed | JobStatus::Done) {
                summary.completed += 1;
            }
            if let Some(result) = &job.result {
                summary.total_cost += result.cost.unwrap_or(0.0);
                if let Some(d) = result.duration_seconds.filter(|d| d.is_finite() && *d >= 0.0) {
                    durations.push(d);
                }
            }
        }

        if !durations.is_empty() {
            summary.average_duration_secs = Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        summary
    }

    /// Completed jobs over all jobs, 0 when there are none.
    pub fn completion_rate(&self) -> f64 {
        if self.jobs == 0 {
            0.0
        } else {
            self.completed as f64 / self.jobs as f64
        }
    }

    /// Share of the debt covered by agreements.
    pub fn recovery_rate(&self) -> f64 {
        if self.total_debt <= 0.0 {
            0.0
        } else {
            (self.total_agreed / self.total_debt).min(1.0)
        }
    }

    pub fn count(&self, status: &JobStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}
