use anyhow::{anyhow, bail, Context, Result};
use common::{GetJobsRequest, Job, JobFilter, JobId, JobSubmission, QueryChange, Request, Response};
use std::cell::RefCell;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::table::JobSource;

/// One request per connection, one JSON document per line.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub async fn send(&self, req: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("Failed to connect to daemon at {}", self.socket_path.display()))?;
        let (reader, mut writer) = stream.into_split();

        let mut req_bytes = serde_json::to_vec(req)?;
        req_bytes.push(b'\n');
        writer.write_all(&req_bytes).await?;

        let mut line = String::new();
        let n = BufReader::new(reader).read_line(&mut line).await?;
        if n == 0 {
            bail!("Daemon closed the connection without answering");
        }
        let resp: Response = serde_json::from_str(&line).context("Malformed response from daemon")?;
        match resp {
            Response::Error(e) => Err(anyhow!("Daemon error: {}", e)),
            other => Ok(other),
        }
    }

    pub async fn get_jobs(&self, filter: &JobFilter, skip: usize, take: usize) -> Result<Vec<Job>> {
        let req = Request::GetJobs(GetJobsRequest { filter: filter.clone(), skip, take });
        match self.send(&req).await? {
            Response::Jobs(jobs) => Ok(jobs),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        match self.send(&Request::GetJob(id)).await? {
            Response::JobDetail(job) => Ok(job),
            other => Err(unexpected(other)),
        }
    }

    pub async fn submit(&self, submission: JobSubmission) -> Result<JobId> {
        match self.send(&Request::SubmitJob(submission)).await? {
            Response::Submitted(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel(&self, ids: Vec<JobId>) -> Result<Vec<JobId>> {
        match self.send(&Request::CancelJobs(ids)).await? {
            Response::Cancelled(ids) => Ok(ids),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(resp: Response) -> anyhow::Error {
    anyhow!("Unexpected response from daemon: {:?}", resp)
}

/// The daemon seen through the current filter.
///
/// Windows wider than `page_size` are fetched as several requests, so the
/// daemon's page limit never shortens a window.
pub struct RemoteJobs {
    client: DaemonClient,
    filter: RefCell<JobFilter>,
    page_size: usize,
}

impl RemoteJobs {
    pub fn new(client: DaemonClient, filter: JobFilter) -> Self {
        Self::with_page_size(client, filter, common::DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_page_size(client: DaemonClient, filter: JobFilter, page_size: usize) -> Self {
        Self {
            client,
            filter: RefCell::new(filter),
            page_size: page_size.max(1),
        }
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    pub fn filter(&self) -> JobFilter {
        self.filter.borrow().clone()
    }
}

impl JobSource for RemoteJobs {
    async fn fetch_rows(&self, start: usize, stop: usize) -> Result<Vec<Job>> {
        let filter = self.filter();
        let mut rows = Vec::with_capacity(stop.saturating_sub(start));
        let mut skip = start;
        while skip < stop {
            let take = (stop - skip).min(self.page_size);
            let page = self.client.get_jobs(&filter, skip, take).await?;
            let short = page.len() < take;
            skip += page.len();
            rows.extend(page);
            if short {
                break;
            }
        }
        Ok(rows)
    }

    async fn update_query(&self, change: QueryChange) -> Result<()> {
        self.filter.borrow_mut().apply(change);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn stub_job(index: usize) -> Job {
        Job {
            id: JobId(index.to_string()),
            queue: "default".to_string(),
            job_set: "set".to_string(),
            owner: "tester".to_string(),
            priority: 0.0,
            submitted: chrono::Utc::now(),
            cancelled: None,
            state: common::JobState::Queued,
            runs: Vec::new(),
        }
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lookout-test-{}-{}.sock", name, std::process::id()))
    }

    /// Answers each connection's single request with `respond`.
    fn serve(path: &PathBuf, respond: fn(Request) -> Response) -> tokio::task::JoinHandle<()> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                let (reader, mut writer) = socket.into_split();
                let mut line = String::new();
                BufReader::new(reader).read_line(&mut line).await.unwrap();
                let req: Request = serde_json::from_str(&line).unwrap();
                let mut bytes = serde_json::to_vec(&respond(req)).unwrap();
                bytes.push(b'\n');
                writer.write_all(&bytes).await.unwrap();
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_rows_sends_current_filter_and_window() {
        let path = socket_path("fetch");
        let server = serve(&path, |req| match req {
            Request::GetJobs(q) => {
                assert_eq!(q.filter.queue, "gpu");
                assert_eq!((q.skip, q.take), (20, 10));
                Response::Jobs(Vec::new())
            }
            other => Response::Error(format!("unexpected {:?}", other)),
        });

        let source = RemoteJobs::new(DaemonClient::new(&path), JobFilter::default());
        source.update_query(QueryChange::Queue("gpu".to_string())).await.unwrap();
        let rows = source.fetch_rows(20, 30).await.unwrap();
        assert!(rows.is_empty());

        server.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_wide_window_is_split_into_pages() {
        let path = socket_path("pages");
        // seven jobs, at most four per request
        let server = serve(&path, |req| match req {
            Request::GetJobs(q) if q.take > 4 => {
                Response::Error(format!("take {} exceeds the page size limit of 4", q.take))
            }
            Request::GetJobs(q) => {
                let end = (q.skip + q.take).min(7);
                Response::Jobs((q.skip..end).map(stub_job).collect())
            }
            other => Response::Error(format!("unexpected {:?}", other)),
        });

        let source = RemoteJobs::with_page_size(DaemonClient::new(&path), JobFilter::default(), 4);
        let rows = source.fetch_rows(0, 10).await.unwrap();
        let ids: Vec<String> = rows.iter().map(|job| job.id.0.clone()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5", "6"]);

        let rows = source.fetch_rows(2, 6).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].id.0, "2");

        server.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_daemon_error_becomes_err() {
        let path = socket_path("error");
        let server = serve(&path, |_| Response::Error("DB Error: locked".to_string()));

        let client = DaemonClient::new(&path);
        let err = client.cancel(vec![JobId::from("a")]).await.unwrap_err();
        assert!(err.to_string().contains("locked"));

        server.abort();
        let _ = std::fs::remove_file(&path);
    }
}
