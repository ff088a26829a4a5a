use common::Job;
use std::collections::BTreeMap;

/// Half-open interval `[start, stop)` of row indices that have been fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedRange {
    pub start: usize,
    pub stop: usize,
}

impl LoadedRange {
    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.stop
    }
}

/// What the table has for one row position.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSlot {
    Loaded(Job),
    Pending,
}

/// Sparse rows by position plus the ranges already fetched for them.
///
/// Ranges are kept sorted, disjoint and coalesced. Every stored row lies in
/// some range.
#[derive(Debug, Default)]
pub struct RowCache {
    rows: BTreeMap<usize, Job>,
    ranges: Vec<LoadedRange>,
    end_of_data: Option<usize>,
    absent_from: Option<usize>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded means fetched and present, or past a point the backend
    /// reported empty.
    pub fn is_loaded(&self, index: usize) -> bool {
        let past = |bound: Option<usize>| bound.is_some_and(|b| index >= b);
        if past(self.end_of_data) || past(self.absent_from) {
            return true;
        }
        self.rows.contains_key(&index) && self.ranges.iter().any(|r| r.contains(index))
    }

    pub fn get(&self, index: usize) -> RowSlot {
        match self.rows.get(&index) {
            Some(job) => RowSlot::Loaded(job.clone()),
            None => RowSlot::Pending,
        }
    }

    pub fn merge(&mut self, start: usize, rows: Vec<Job>) {
        if rows.is_empty() {
            return;
        }
        let stop = start + rows.len();
        for (offset, job) in rows.into_iter().enumerate() {
            self.rows.insert(start + offset, job);
        }
        self.insert_range(LoadedRange { start, stop });
    }

    /// The backend has nothing at `index` or after it.
    pub fn mark_end(&mut self, index: usize) {
        self.end_of_data = Some(self.end_of_data.map_or(index, |end| end.min(index)));
    }

    /// The backend has nothing at `index` or after it, but rows before
    /// `index` may not have been seen yet, so the row count stays open.
    pub fn mark_absent_from(&mut self, index: usize) {
        self.absent_from = Some(self.absent_from.map_or(index, |b| b.min(index)));
    }

    pub fn end_of_data(&self) -> Option<usize> {
        self.end_of_data
    }

    pub fn invalidate(&mut self) {
        self.rows.clear();
        self.ranges.clear();
        self.end_of_data = None;
        self.absent_from = None;
    }

    /// One past the highest row present.
    pub fn loaded_count(&self) -> usize {
        self.rows.keys().next_back().map_or(0, |last| last + 1)
    }

    pub fn ranges(&self) -> &[LoadedRange] {
        &self.ranges
    }

    fn insert_range(&mut self, new: LoadedRange) {
        let mut merged = new;
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            // overlapping or touching
            if range.stop >= merged.start && range.start <= merged.stop {
                merged.start = merged.start.min(range.start);
                merged.stop = merged.stop.max(range.stop);
            } else {
                kept.push(range);
            }
        }
        let at = kept.partition_point(|r| r.start < merged.start);
        kept.insert(at, merged);
        self.ranges = kept;
    }
}
