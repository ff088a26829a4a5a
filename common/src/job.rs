use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Queued,
        JobState::Pending,
        JobState::Running,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    /// Storage code used by the daemon's `job.state` column.
    pub fn code(&self) -> i64 {
        match self {
            JobState::Queued => 1,
            JobState::Pending => 2,
            JobState::Running => 3,
            JobState::Succeeded => 4,
            JobState::Failed => 5,
            JobState::Cancelled => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        JobState::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// Jobs that have not reached a terminal state can still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Pending | JobState::Running)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_uppercase();
        JobState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| anyhow!("Invalid job state: {}", s))
    }
}

/// One attempt at running a job on a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub k8s_id: String,
    pub cluster: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub succeeded: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
}

impl Run {
    /// State a job is in when this is its latest run.
    pub fn job_state(&self) -> JobState {
        if self.finished.is_some() {
            if self.succeeded.unwrap_or(false) {
                JobState::Succeeded
            } else {
                JobState::Failed
            }
        } else if self.started.is_some() {
            JobState::Running
        } else if self.created.is_some() {
            JobState::Pending
        } else {
            JobState::Queued
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_set: String,
    pub owner: String,
    #[serde(default)]
    pub priority: f64,
    pub submitted: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: Option<DateTime<Utc>>,
    pub state: JobState,
    #[serde(default)]
    pub runs: Vec<Run>,
}

/// What a client sends to create a job; the daemon assigns id, time and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub queue: String,
    pub job_set: String,
    pub owner: String,
    pub priority: f64,
}
