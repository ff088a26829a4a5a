use serde::{Deserialize, Serialize};
use crate::job::{Job, JobId, JobSubmission};
use crate::query::GetJobsRequest;

/// Requests and responses travel as one JSON document per line.
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    GetJobs(GetJobsRequest),
    GetJob(JobId),
    SubmitJob(JobSubmission),
    CancelJobs(Vec<JobId>),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(String),
    Jobs(Vec<Job>),
    JobDetail(Option<Job>),
    Submitted(JobId),
    Cancelled(Vec<JobId>),
}
