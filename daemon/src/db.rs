use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row};
use chrono::{DateTime, Utc};
use common::{Job, JobFilter, JobId, JobState, JobSubmission, Run};
use crate::migrations::Migrator;

const JOB_COLUMNS: &str = "job_id, queue, owner, jobset, priority, submitted, cancelled, state";

pub struct JobStore {
    conn: Connection,
}

impl JobStore {
    pub fn open(path: &str) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let mut migrator = Migrator::new(conn);
        migrator.run_migrations()?;
        Ok(Self { conn: migrator.into_connection() })
    }

    /// Insert or replace a job together with its runs.
    pub fn insert_job(&mut self, job: &Job) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM job_run WHERE job_id = ?1", params![job.id.0])?;
        tx.execute(
            "INSERT OR REPLACE INTO job (job_id, queue, owner, jobset, priority, submitted, cancelled, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id.0,
                job.queue,
                job.owner,
                job.job_set,
                job.priority,
                job.submitted,
                job.cancelled,
                job.state.code(),
            ],
        )?;
        for run in &job.runs {
            insert_run_row(&tx, &job.id, run)?;
        }
        tx.commit()
    }

    pub fn submit(&mut self, submission: &JobSubmission, now: DateTime<Utc>) -> Result<JobId> {
        let job = Job {
            id: JobId(uuid::Uuid::new_v4().to_string()),
            queue: submission.queue.clone(),
            job_set: submission.job_set.clone(),
            owner: submission.owner.clone(),
            priority: submission.priority,
            submitted: now,
            cancelled: None,
            state: JobState::Queued,
            runs: Vec::new(),
        };
        self.insert_job(&job)?;
        log::info!("Submitted job {} to queue {} (owner: {})", job.id, job.queue, job.owner);
        Ok(job.id)
    }

    /// Record a run and move the job to the state that run implies.
    /// Cancelled jobs keep their state.
    pub fn insert_run(&mut self, job_id: &JobId, run: &Run) -> Result<()> {
        let tx = self.conn.transaction()?;
        insert_run_row(&tx, job_id, run)?;
        tx.execute(
            "UPDATE job SET state = ?1 WHERE job_id = ?2 AND cancelled IS NULL",
            params![run.job_state().code(), job_id.0],
        )?;
        tx.commit()
    }

    pub fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM job WHERE job_id = ?1", JOB_COLUMNS);
        let job = self.conn.query_row(&sql, params![id.0], job_from_row).optional()?;
        match job {
            Some(mut job) => {
                job.runs = self.runs_for(&job.id)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// One page of jobs matching `filter`, with runs attached.
    pub fn query_jobs(&self, filter: &JobFilter, skip: usize, take: usize) -> Result<Vec<Job>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if !filter.queue.is_empty() {
            clauses.push("queue = ?".to_string());
            args.push(Value::Text(filter.queue.clone()));
        }

        // GLOB is case sensitive, unlike SQLite's LIKE
        for (column, prefix) in [
            ("jobset", &filter.job_set),
            ("job_id", &filter.job_id),
            ("owner", &filter.owner),
        ] {
            if !prefix.is_empty() {
                clauses.push(format!("{} GLOB ?", column));
                args.push(Value::Text(glob_prefix(prefix)));
            }
        }

        if !filter.states.is_empty() {
            let placeholders = vec!["?"; filter.states.len()].join(", ");
            clauses.push(format!("state IN ({})", placeholders));
            args.extend(filter.states.iter().map(|s| Value::Integer(s.code())));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let direction = if filter.newest_first { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {} FROM job {} ORDER BY submitted {dir}, job_id {dir} LIMIT ? OFFSET ?",
            JOB_COLUMNS,
            where_clause,
            dir = direction,
        );
        args.push(Value::Integer(take as i64));
        args.push(Value::Integer(skip as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let job_iter = stmt.query_map(params_from_iter(args.iter()), job_from_row)?;

        let mut jobs = Vec::new();
        for job in job_iter {
            let mut job = job?;
            job.runs = self.runs_for(&job.id)?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Cancel every listed job that is still cancellable; returns the ones
    /// that changed.
    pub fn cancel_jobs(&mut self, ids: &[JobId], now: DateTime<Utc>) -> Result<Vec<JobId>> {
        let tx = self.conn.transaction()?;
        let mut cancelled = Vec::new();
        for id in ids {
            let changed = tx.execute(
                "UPDATE job SET state = ?1, cancelled = ?2 WHERE job_id = ?3 AND state IN (?4, ?5, ?6)",
                params![
                    JobState::Cancelled.code(),
                    now,
                    id.0,
                    JobState::Queued.code(),
                    JobState::Pending.code(),
                    JobState::Running.code(),
                ],
            )?;
            if changed > 0 {
                cancelled.push(id.clone());
            }
        }
        tx.commit()?;
        Ok(cancelled)
    }

    fn runs_for(&self, job_id: &JobId) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT run_id, cluster, node, created, started, finished, succeeded, error
             FROM job_run WHERE job_id = ?1 ORDER BY created, rowid",
        )?;
        let run_iter = stmt.query_map(params![job_id.0], |row| {
            Ok(Run {
                k8s_id: row.get(0)?,
                cluster: row.get(1)?,
                node: row.get(2)?,
                created: row.get(3)?,
                started: row.get(4)?,
                finished: row.get(5)?,
                succeeded: row.get(6)?,
                error: row.get(7)?,
            })
        })?;

        let mut runs = Vec::new();
        for run in run_iter {
            runs.push(run?);
        }
        Ok(runs)
    }
}

fn insert_run_row(conn: &Connection, job_id: &JobId, run: &Run) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO job_run (run_id, job_id, cluster, node, created, started, finished, succeeded, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.k8s_id,
            job_id.0,
            run.cluster,
            run.node,
            run.created,
            run.started,
            run.finished,
            run.succeeded,
            run.error,
        ],
    )?;
    Ok(())
}

fn job_from_row(row: &Row<'_>) -> Result<Job> {
    let state: i64 = row.get(7)?;
    Ok(Job {
        id: JobId(row.get(0)?),
        queue: row.get(1)?,
        owner: row.get(2)?,
        job_set: row.get(3)?,
        priority: row.get(4)?,
        submitted: row.get(5)?,
        cancelled: row.get(6)?,
        state: JobState::from_code(state).unwrap_or(JobState::Queued), // Fallback
        runs: Vec::new(),
    })
}

/// `GLOB` pattern matching everything that starts with `prefix` literally.
fn glob_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        match c {
            '*' | '?' | '[' => {
                pattern.push('[');
                pattern.push(c);
                pattern.push(']');
            }
            _ => pattern.push(c),
        }
    }
    pattern.push('*');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn job(id: &str, queue: &str, job_set: &str, owner: &str, minutes: i64, state: JobState) -> Job {
        Job {
            id: JobId::from(id),
            queue: queue.to_string(),
            job_set: job_set.to_string(),
            owner: owner.to_string(),
            priority: 0.0,
            submitted: base_time() + Duration::minutes(minutes),
            cancelled: None,
            state,
            runs: Vec::new(),
        }
    }

    fn seeded() -> JobStore {
        let mut store = JobStore::open_in_memory().unwrap();
        store.insert_job(&job("a1", "gpu", "train-1", "alice", 1, JobState::Queued)).unwrap();
        store.insert_job(&job("a2", "gpu", "train-2", "alice", 2, JobState::Running)).unwrap();
        store.insert_job(&job("b1", "cpu", "etl", "bob", 3, JobState::Failed)).unwrap();
        store.insert_job(&job("b2", "cpu", "etl", "bob", 4, JobState::Succeeded)).unwrap();
        store.insert_job(&job("c1", "gpu_small", "train-1", "carol", 5, JobState::Pending)).unwrap();
        store
    }

    fn ids(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.id.0.as_str()).collect()
    }

    #[test]
    fn test_newest_first_ordering_and_paging() {
        let store = seeded();
        let filter = JobFilter::default();

        let first = store.query_jobs(&filter, 0, 2).unwrap();
        assert_eq!(ids(&first), vec!["c1", "b2"]);

        let second = store.query_jobs(&filter, 2, 2).unwrap();
        assert_eq!(ids(&second), vec!["b1", "a2"]);

        let tail = store.query_jobs(&filter, 4, 10).unwrap();
        assert_eq!(ids(&tail), vec!["a1"]);

        assert!(store.query_jobs(&filter, 5, 10).unwrap().is_empty());
    }

    #[test]
    fn test_oldest_first() {
        let store = seeded();
        let filter = JobFilter { newest_first: false, ..JobFilter::default() };
        let jobs = store.query_jobs(&filter, 0, 3).unwrap();
        assert_eq!(ids(&jobs), vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_queue_is_exact_other_filters_are_prefixes() {
        let store = seeded();

        let filter = JobFilter { queue: "gpu".to_string(), newest_first: false, ..JobFilter::default() };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["a1", "a2"]);

        let filter = JobFilter { queue: "gpu_small".to_string(), ..JobFilter::default() };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["c1"]);

        let filter = JobFilter { queue: "gp".to_string(), ..JobFilter::default() };
        assert!(store.query_jobs(&filter, 0, 10).unwrap().is_empty());

        let filter = JobFilter {
            job_set: "train-1".to_string(),
            owner: "al".to_string(),
            ..JobFilter::default()
        };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["a1"]);

        let filter = JobFilter { job_id: "b".to_string(), newest_first: false, ..JobFilter::default() };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["b1", "b2"]);
    }

    #[test]
    fn test_prefix_filters_are_case_sensitive_and_literal() {
        let mut store = seeded();
        store.insert_job(&job("d*1", "cpu", "Train-9", "dave", 6, JobState::Queued)).unwrap();

        let filter = JobFilter { job_set: "train".to_string(), ..JobFilter::default() };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["c1", "a2", "a1"]);

        let filter = JobFilter { job_set: "Train".to_string(), ..JobFilter::default() };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["d*1"]);

        // `*` is literal, not a wildcard
        let filter = JobFilter { job_id: "d*".to_string(), ..JobFilter::default() };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["d*1"]);
        let filter = JobFilter { job_id: "*".to_string(), ..JobFilter::default() };
        assert!(store.query_jobs(&filter, 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_state_filter() {
        let store = seeded();
        let filter = JobFilter {
            states: vec![JobState::Queued, JobState::Failed],
            newest_first: false,
            ..JobFilter::default()
        };
        assert_eq!(ids(&store.query_jobs(&filter, 0, 10).unwrap()), vec!["a1", "b1"]);
    }

    #[test]
    fn test_runs_are_attached_and_update_state() {
        let mut store = seeded();
        let id = JobId::from("a1");
        let run = Run {
            k8s_id: "pod-a1-0".to_string(),
            cluster: "east".to_string(),
            node: Some("node-7".to_string()),
            succeeded: None,
            error: None,
            created: Some(base_time()),
            started: Some(base_time()),
            finished: None,
        };
        store.insert_run(&id, &run).unwrap();

        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.runs, vec![run]);

        let page = store.query_jobs(&JobFilter { job_id: "a1".to_string(), ..JobFilter::default() }, 0, 1).unwrap();
        assert_eq!(page[0].runs.len(), 1);
    }

    #[test]
    fn test_cancel_only_active_jobs() {
        let mut store = seeded();
        let requested = vec![JobId::from("a1"), JobId::from("b1"), JobId::from("missing")];
        let cancelled = store.cancel_jobs(&requested, base_time()).unwrap();
        assert_eq!(cancelled, vec![JobId::from("a1")]);

        let job = store.get_job(&JobId::from("a1")).unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.cancelled, Some(base_time()));
        assert_eq!(store.get_job(&JobId::from("b1")).unwrap().unwrap().state, JobState::Failed);
    }

    #[test]
    fn test_submit_assigns_id_and_queues() {
        let mut store = JobStore::open_in_memory().unwrap();
        let submission = JobSubmission {
            queue: "gpu".to_string(),
            job_set: "sweep".to_string(),
            owner: "dana".to_string(),
            priority: 2.0,
        };
        let id = store.submit(&submission, base_time()).unwrap();
        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.submitted, base_time());
        assert_eq!(job.owner, "dana");
    }

    #[test]
    fn test_glob_prefix_escapes_wildcards() {
        assert_eq!(glob_prefix("a*b?c[d"), "a[*]b[?]c[[]d*");
        assert_eq!(glob_prefix("50%_x"), "50%_x*");
    }
}
