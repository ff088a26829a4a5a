use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use common::{parse_job_states, JobFilter, JobId, JobSubmission};
use std::path::{Path, PathBuf};

use lookout::client::{DaemonClient, RemoteJobs};
use lookout::table::JobTableView;
use lookout::{browse, output};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon socket (defaults to the system socket, else the user one)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// Queue name (exact)
    #[arg(long)]
    queue: Option<String>,
    /// Job set prefix
    #[arg(long)]
    job_set: Option<String>,
    /// Job id prefix
    #[arg(long)]
    job_id: Option<String>,
    /// Owner prefix
    #[arg(long)]
    owner: Option<String>,
    /// Comma separated states, e.g. "queued,running"
    #[arg(long)]
    states: Option<String>,
    /// Show oldest jobs first
    #[arg(long)]
    oldest_first: bool,
}

impl FilterArgs {
    fn into_filter(self) -> Result<JobFilter> {
        Ok(JobFilter {
            queue: self.queue.unwrap_or_default(),
            job_set: self.job_set.unwrap_or_default(),
            job_id: self.job_id.unwrap_or_default(),
            owner: self.owner.unwrap_or_default(),
            states: match self.states {
                Some(s) => parse_job_states(&s)?,
                None => Vec::new(),
            },
            newest_first: !self.oldest_first,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print one page of jobs
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 50)]
        take: usize,
    },
    /// Browse jobs interactively, loading pages as you scroll
    Browse {
        #[command(flatten)]
        filter: FilterArgs,
        /// Rows on screen
        #[arg(long, default_value_t = 20)]
        height: usize,
        /// Minimum rows per fetch (defaults to the height)
        #[arg(long)]
        batch: Option<usize>,
        /// Most rows per daemon request; match the daemon's max_page_size
        #[arg(long, default_value_t = common::DEFAULT_MAX_PAGE_SIZE)]
        page_size: usize,
    },
    /// Show a job and its scheduling history
    Get {
        id: String,
    },
    /// Cancel jobs
    Cancel {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Submit jobs
    Submit {
        #[arg(short, long)]
        queue: String,
        #[arg(short, long)]
        job_set: String,
        /// Defaults to the calling user
        #[arg(long, default_value = "")]
        owner: String,
        #[arg(long, default_value_t = 0.0)]
        priority: f64,
        /// Number of identical jobs to submit
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

fn default_socket_path() -> PathBuf {
    if Path::new(common::DEFAULT_SOCKET_PATH).exists() {
        PathBuf::from(common::DEFAULT_SOCKET_PATH)
    } else {
        PathBuf::from(common::USER_SOCKET_PATH)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let client = DaemonClient::new(cli.socket.unwrap_or_else(default_socket_path));

    match cli.command {
        Commands::List { filter, skip, take } => {
            let jobs = client.get_jobs(&filter.into_filter()?, skip, take).await?;
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!("{}", output::jobs_table(&jobs));
            }
        }
        Commands::Browse { filter, height, batch, page_size } => {
            let source = RemoteJobs::with_page_size(client, filter.into_filter()?, page_size);
            let view = JobTableView::new(source, height, batch.unwrap_or(height));
            browse::run(view).await?;
        }
        Commands::Get { id } => match client.get_job(JobId(id)).await? {
            Some(job) => print!("{}", output::job_detail(&job)),
            None => println!("Job not found."),
        },
        Commands::Cancel { ids } => {
            let requested = ids.len();
            let cancelled = client.cancel(ids.into_iter().map(JobId).collect()).await?;
            for id in &cancelled {
                println!("Cancelled {}", id);
            }
            if cancelled.len() < requested {
                println!("{} job(s) were not cancellable", requested - cancelled.len());
            }
        }
        Commands::Submit { queue, job_set, owner, priority, count } => {
            for _ in 0..count {
                let id = client
                    .submit(JobSubmission {
                        queue: queue.clone(),
                        job_set: job_set.clone(),
                        owner: owner.clone(),
                        priority,
                    })
                    .await?;
                println!("{}", id);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::JobState;

    #[test]
    fn test_filter_args_into_filter() {
        let args = FilterArgs {
            queue: Some("gpu".to_string()),
            states: Some("running,failed".to_string()),
            oldest_first: true,
            ..FilterArgs::default()
        };
        let filter = args.into_filter().unwrap();
        assert_eq!(filter.queue, "gpu");
        assert_eq!(filter.job_set, "");
        assert_eq!(filter.states, vec![JobState::Running, JobState::Failed]);
        assert!(!filter.newest_first);
    }

    #[test]
    fn test_cli_parses_browse() {
        let cli = Cli::try_parse_from([
            "lookout", "--socket", "/tmp/x.sock", "browse", "--queue", "gpu", "--height", "5",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        match cli.command {
            Commands::Browse { filter, height, batch, page_size } => {
                assert_eq!(filter.queue.as_deref(), Some("gpu"));
                assert_eq!(height, 5);
                assert_eq!(batch, None);
                assert_eq!(page_size, common::DEFAULT_MAX_PAGE_SIZE);
            }
            _ => panic!("expected browse"),
        }
    }
}
