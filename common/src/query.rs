use crate::job::JobState;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Filters and ordering applied by the daemon when listing jobs.
///
/// Queue must match exactly; the other text filters are case-sensitive
/// prefixes. An empty string means "no filter".
/// An empty `states` list matches every state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobFilter {
    #[serde(default)]
    pub queue: String,
    #[serde(default)]
    pub job_set: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub states: Vec<JobState>,
    #[serde(default = "default_newest_first")]
    pub newest_first: bool,
}

fn default_newest_first() -> bool { true }

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            queue: String::new(),
            job_set: String::new(),
            job_id: String::new(),
            owner: String::new(),
            states: Vec::new(),
            newest_first: default_newest_first(),
        }
    }
}

/// A single edit to the query a job list is showing.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryChange {
    Queue(String),
    JobSet(String),
    JobId(String),
    Owner(String),
    JobStates(Vec<JobState>),
    NewestFirst(bool),
    /// Same parameters, fresh data.
    Refresh,
}

impl JobFilter {
    pub fn apply(&mut self, change: QueryChange) {
        match change {
            QueryChange::Queue(q) => self.queue = q,
            QueryChange::JobSet(s) => self.job_set = s,
            QueryChange::JobId(id) => self.job_id = id,
            QueryChange::Owner(o) => self.owner = o,
            QueryChange::JobStates(states) => self.states = states,
            QueryChange::NewestFirst(newest) => self.newest_first = newest,
            QueryChange::Refresh => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobsRequest {
    pub filter: JobFilter,
    pub skip: usize,
    pub take: usize,
}

/// Parse a comma separated state list such as "queued,running".
pub fn parse_job_states(s: &str) -> Result<Vec<JobState>> {
    let mut states = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let state: JobState = part.parse()?;
        if !states.contains(&state) {
            states.push(state);
        }
    }
    Ok(states)
}

/// Parse "newest" / "oldest" into the `newest_first` flag.
pub fn parse_order(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "newest" | "desc" => Ok(true),
        "oldest" | "asc" => Ok(false),
        other => Err(anyhow!("Unknown order: {} (use newest or oldest)", other)),
    }
}
