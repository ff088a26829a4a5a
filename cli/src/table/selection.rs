use common::{Job, JobId};
use std::cell::RefCell;
use std::collections::HashMap;

/// Selected jobs keyed by id, with the row as it looked when selected.
///
/// Independent of row positions, so it survives cache resets and re-queries.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    selected: RefCell<HashMap<JobId, Job>>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&self, job_id: &JobId, row: &Job, selected: bool) {
        let mut map = self.selected.borrow_mut();
        if selected {
            map.insert(job_id.clone(), row.clone());
        } else {
            map.remove(job_id);
        }
    }

    pub fn is_selected(&self, job_id: &JobId) -> bool {
        self.selected.borrow().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.selected.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.borrow().is_empty()
    }

    /// Snapshots of every selected job, ordered by id.
    pub fn selected_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.selected.borrow().values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Cancelling makes sense once any selected job is still active.
    pub fn can_cancel(&self) -> bool {
        self.selected.borrow().values().any(|job| job.state.is_cancellable())
    }

    pub fn clear(&self) {
        self.selected.borrow_mut().clear();
    }
}
