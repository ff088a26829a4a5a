use anyhow::{anyhow, Result};
use common::{Job, JobFilter};
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnId {
    Queue,
    JobId,
    Owner,
    JobSet,
    SubmissionTime,
    State,
    Priority,
}

impl ColumnId {
    pub const ALL: [ColumnId; 7] = [
        ColumnId::Queue,
        ColumnId::JobId,
        ColumnId::Owner,
        ColumnId::JobSet,
        ColumnId::SubmissionTime,
        ColumnId::State,
        ColumnId::Priority,
    ];

    pub fn default_set() -> BTreeSet<ColumnId> {
        ColumnId::ALL
            .iter()
            .copied()
            .filter(|c| *c != ColumnId::Priority)
            .collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ColumnId::Queue => "Queue",
            ColumnId::JobId => "Id",
            ColumnId::Owner => "Owner",
            ColumnId::JobSet => "Job Set",
            ColumnId::SubmissionTime => "Submission Time",
            ColumnId::State => "State",
            ColumnId::Priority => "Priority",
        }
    }

    /// Header text, showing the filter or ordering this column controls.
    pub fn header(&self, filter: &JobFilter) -> String {
        let active = match self {
            ColumnId::Queue => filter.queue.clone(),
            ColumnId::JobId => filter.job_id.clone(),
            ColumnId::Owner => filter.owner.clone(),
            ColumnId::JobSet => filter.job_set.clone(),
            ColumnId::SubmissionTime => {
                let arrow = if filter.newest_first { "newest" } else { "oldest" };
                return format!("{} ({})", self.label(), arrow);
            }
            ColumnId::State => filter
                .states
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(","),
            ColumnId::Priority => String::new(),
        };
        if active.is_empty() {
            self.label().to_string()
        } else {
            format!("{} [{}]", self.label(), active)
        }
    }

    pub fn value(&self, job: &Job) -> String {
        match self {
            ColumnId::Queue => job.queue.clone(),
            ColumnId::JobId => job.id.0.clone(),
            ColumnId::Owner => job.owner.clone(),
            ColumnId::JobSet => job.job_set.clone(),
            ColumnId::SubmissionTime => job.submitted.format("%Y-%m-%d %H:%M:%S").to_string(),
            ColumnId::State => job.state.to_string(),
            ColumnId::Priority => job.priority.to_string(),
        }
    }
}

impl FromStr for ColumnId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(ColumnId::Queue),
            "id" | "jobid" => Ok(ColumnId::JobId),
            "owner" => Ok(ColumnId::Owner),
            "jobset" | "set" => Ok(ColumnId::JobSet),
            "submitted" | "time" | "submissiontime" => Ok(ColumnId::SubmissionTime),
            "state" => Ok(ColumnId::State),
            "priority" => Ok(ColumnId::Priority),
            other => Err(anyhow!("Unknown column: {}", other)),
        }
    }
}
