pub mod ipc;
pub mod job;
pub mod query;

pub use ipc::{Request, Response};
pub use job::{Job, JobId, JobState, JobSubmission, Run};
pub use query::{parse_job_states, parse_order, GetJobsRequest, JobFilter, QueryChange};

// Production paths (follow FHS - Filesystem Hierarchy Standard)
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/lookout/lookout.sock";
pub const DEFAULT_DB_PATH: &str = "/var/lib/lookout/lookout.db";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lookout/config.yaml";

// Fallback paths for non-root users
pub const USER_SOCKET_PATH: &str = "/tmp/lookout.sock";
pub const USER_DB_PATH: &str = "lookout.db";
pub const USER_CONFIG_PATH: &str = "lookout.yaml";

/// Most rows the daemon returns for one `GetJobs` request unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;
