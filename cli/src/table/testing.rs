use chrono::{Duration, TimeZone, Utc};
use common::{Job, JobFilter, JobId, JobState, QueryChange};
use std::cell::{Cell, RefCell};
use std::ops::Range;
use std::rc::Rc;
use tokio::sync::{Notify, Semaphore};

use super::provider::JobSource;

pub fn job(index: usize, queue: &str) -> Job {
    let id = if queue.is_empty() {
        format!("job-{}", index)
    } else {
        format!("{}-job-{}", queue, index)
    };
    Job {
        id: JobId(id),
        queue: if queue.is_empty() { "default".to_string() } else { queue.to_string() },
        job_set: "set".to_string(),
        owner: "tester".to_string(),
        priority: 0.0,
        submitted: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(index as i64),
        cancelled: None,
        state: JobState::Queued,
        runs: Vec::new(),
    }
}

pub fn jobs(range: Range<usize>) -> Vec<Job> {
    range.map(|i| job(i, "")).collect()
}

/// In-memory `JobSource` that records every call.
pub struct FakeSource {
    total: Cell<usize>,
    filter: RefCell<JobFilter>,
    calls: RefCell<Vec<(usize, usize)>>,
    updates: RefCell<Vec<QueryChange>>,
    fail_next: Cell<bool>,
    fail_next_update: Cell<bool>,
    pad: Cell<usize>,
    gate: Option<Rc<Semaphore>>,
    entered: Rc<Notify>,
}

impl FakeSource {
    pub fn with_rows(total: usize) -> Self {
        Self {
            total: Cell::new(total),
            filter: RefCell::new(JobFilter::default()),
            calls: RefCell::new(Vec::new()),
            updates: RefCell::new(Vec::new()),
            fail_next: Cell::new(false),
            fail_next_update: Cell::new(false),
            pad: Cell::new(0),
            gate: None,
            entered: Rc::new(Notify::new()),
        }
    }

    /// Park each fetch until it can take a permit from `gate`.
    pub fn gated(mut self, gate: Rc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified whenever a fetch starts.
    pub fn entered(&self) -> Rc<Notify> {
        self.entered.clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    pub fn fail_next_update(&self) {
        self.fail_next_update.set(true);
    }

    /// Return `extra` rows more than were asked for.
    pub fn pad_results(&self, extra: usize) {
        self.pad.set(extra);
    }

    pub fn set_total(&self, total: usize) {
        self.total.set(total);
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.borrow().clone()
    }

    pub fn updates(&self) -> Vec<QueryChange> {
        self.updates.borrow().clone()
    }

    pub fn filter(&self) -> JobFilter {
        self.filter.borrow().clone()
    }
}

impl JobSource for FakeSource {
    async fn fetch_rows(&self, start: usize, stop: usize) -> anyhow::Result<Vec<Job>> {
        self.calls.borrow_mut().push((start, stop));
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.fail_next.replace(false) {
            anyhow::bail!("backend unavailable");
        }

        let queue = self.filter.borrow().queue.clone();
        let end = stop.min(self.total.get()).max(start);
        let mut rows: Vec<Job> = (start..end).map(|i| job(i, &queue)).collect();
        for i in 0..self.pad.get() {
            rows.push(job(stop + i, &queue));
        }
        Ok(rows)
    }

    async fn update_query(&self, change: QueryChange) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        if self.fail_next_update.replace(false) {
            anyhow::bail!("filter rejected");
        }
        self.updates.borrow_mut().push(change.clone());
        self.filter.borrow_mut().apply(change);
        Ok(())
    }
}
