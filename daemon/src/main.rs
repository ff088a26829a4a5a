mod config;
mod db;
mod migrations;

use clap::Parser;
use tokio::net::UnixListener;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use common::{Request, Response};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use config::{Config, LoggingConfig};
use db::JobStore;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a .yaml/.yml/.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    setup_logging(&config.logging)?;
    log::info!("Starting lookout-daemon...");

    let db_path = config.server.db_path.to_string_lossy().to_string();
    let mut store = JobStore::open(&db_path)
        .map_err(|e| anyhow::anyhow!("Failed to open database at {}: {}", db_path, e))?;

    for job in &config.jobs {
        if let Err(e) = store.insert_job(job) {
            log::error!("Failed to seed job {}: {}", job.id, e);
        }
    }
    if !config.jobs.is_empty() {
        log::info!("Seeded {} jobs from config", config.jobs.len());
    }

    let store = Arc::new(Mutex::new(store));
    let max_page_size = config.server.max_page_size;
    let socket_path = config.server.socket_path.clone();

    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("Listening on {}", socket_path.display());

    // Set socket permissions to allow all users to connect
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(&socket_path)?.permissions();
    perms.set_mode(0o666);
    std::fs::set_permissions(&socket_path, perms)?;

    loop {
        let (socket, _) = listener.accept().await?;
        let store = store.clone();

        tokio::spawn(async move {
            let peer_owner = match socket.peer_cred() {
                Ok(cred) => owner_name(cred.uid()),
                Err(e) => {
                    log::error!("Failed to get peer credentials: {}", e);
                    return;
                }
            };

            let (reader, mut writer) = socket.into_split();
            let mut lines = BufReader::new(reader).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return,
                    Err(e) => {
                        log::error!("failed to read from socket; err = {:?}", e);
                        return;
                    }
                };

                let mut req: Request = match serde_json::from_str(&line) {
                    Ok(req) => req,
                    Err(e) => {
                        log::error!("failed to deserialize request; err = {:?}", e);
                        return;
                    }
                };
                log::debug!("Received request: {:?}", req);

                // Submissions without an owner belong to the connecting user
                if let Request::SubmitJob(ref mut submission) = req {
                    if submission.owner.is_empty() {
                        submission.owner = peer_owner.clone();
                    }
                }

                let resp = {
                    let mut store = match store.lock() {
                        Ok(store) => store,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    handle_request(&mut store, req, max_page_size)
                };

                let mut resp_bytes = match serde_json::to_vec(&resp) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::error!("failed to serialize response; err = {:?}", e);
                        return;
                    }
                };
                resp_bytes.push(b'\n');

                if let Err(e) = writer.write_all(&resp_bytes).await {
                    log::error!("failed to write to socket; err = {:?}", e);
                    return;
                }
            }
        });
    }
}

fn handle_request(store: &mut JobStore, req: Request, max_page_size: usize) -> Response {
    match req {
        Request::GetJobs(query) => {
            // a truncated page would read as the end of the data
            if query.take > max_page_size {
                return Response::Error(format!(
                    "take {} exceeds the page size limit of {}",
                    query.take, max_page_size
                ));
            }
            match store.query_jobs(&query.filter, query.skip, query.take) {
                Ok(jobs) => {
                    log::debug!(
                        "Returning {} jobs for skip={} take={}",
                        jobs.len(),
                        query.skip,
                        query.take
                    );
                    Response::Jobs(jobs)
                }
                Err(e) => Response::Error(format!("DB Error: {}", e)),
            }
        }
        Request::GetJob(id) => match store.get_job(&id) {
            Ok(job) => Response::JobDetail(job),
            Err(e) => Response::Error(format!("DB Error: {}", e)),
        },
        Request::SubmitJob(submission) => {
            if submission.queue.is_empty() {
                return Response::Error("Queue must not be empty".to_string());
            }
            match store.submit(&submission, chrono::Utc::now()) {
                Ok(id) => Response::Submitted(id),
                Err(e) => Response::Error(format!("DB Error: {}", e)),
            }
        }
        Request::CancelJobs(ids) => match store.cancel_jobs(&ids, chrono::Utc::now()) {
            Ok(cancelled) => {
                log::info!("Cancelled {} of {} requested jobs", cancelled.len(), ids.len());
                Response::Cancelled(cancelled)
            }
            Err(e) => Response::Error(format!("DB Error: {}", e)),
        },
    }
}

fn owner_name(uid: u32) -> String {
    match nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn setup_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let log_file = std::env::var("LOOKOUT_LOG")
        .ok()
        .map(PathBuf::from)
        .or_else(|| logging.output.clone());

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(logging.level_filter())
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
