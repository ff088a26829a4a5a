use common::{Job, QueryChange};
use std::cell::{Cell, RefCell};
use thiserror::Error;

use super::row_cache::{RowCache, RowSlot};

/// Backend the table pages jobs from.
///
/// `fetch_rows` returns the rows in `[start, stop)` in order, possibly fewer
/// at the end of the data. `update_query` resolves once the change applies to
/// every later `fetch_rows` call.
#[allow(async_fn_in_trait)]
pub trait JobSource {
    async fn fetch_rows(&self, start: usize, stop: usize) -> anyhow::Result<Vec<Job>>;

    async fn update_query(&self, change: QueryChange) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch rows {start}..{stop}: {cause:#}")]
    Fetch {
        start: usize,
        stop: usize,
        cause: anyhow::Error,
    },
    #[error("source returned {returned} rows for the {requested}-row window at {start}")]
    InconsistentRange {
        start: usize,
        requested: usize,
        returned: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Merged { start: usize, count: usize },
    /// The cache was reset while the fetch was in flight; nothing merged.
    Stale,
}

/// Fetches row windows on demand and keeps them in a [`RowCache`].
///
/// Every fetch is tagged with the generation current when it started, and
/// [`reset_cache`](Self::reset_cache) bumps the generation, so results that
/// land after a reset are dropped instead of merged.
pub struct PagedRowProvider<S> {
    source: S,
    cache: RefCell<RowCache>,
    generation: Cell<u64>,
}

impl<S: JobSource> PagedRowProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RefCell::new(RowCache::new()),
            generation: Cell::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_row_loaded(&self, index: usize) -> bool {
        self.cache.borrow().is_loaded(index)
    }

    pub fn row(&self, index: usize) -> RowSlot {
        self.cache.borrow().get(index)
    }

    pub fn can_load_more(&self) -> bool {
        self.cache.borrow().end_of_data().is_none()
    }

    /// Loaded rows, plus one trailing sentinel row while more may exist.
    pub fn row_count(&self) -> usize {
        let loaded = self.cache.borrow().loaded_count();
        if self.can_load_more() {
            loaded + 1
        } else {
            loaded
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Fetch rows `start..=stop_inclusive` and merge them.
    ///
    /// Callers are expected not to issue overlapping windows concurrently.
    pub async fn ensure_loaded(
        &self,
        start: usize,
        stop_inclusive: usize,
    ) -> Result<LoadOutcome, LoadError> {
        let stop = stop_inclusive + 1;
        let requested = stop - start;
        let generation = self.generation.get();

        let rows = match self.source.fetch_rows(start, stop).await {
            Ok(rows) => rows,
            Err(cause) => {
                if self.generation.get() != generation {
                    log::debug!(
                        "Ignoring failed fetch of {}..{} from generation {}: {:#}",
                        start,
                        stop,
                        generation,
                        cause
                    );
                    return Ok(LoadOutcome::Stale);
                }
                log::warn!("Fetching rows {}..{} failed: {:#}", start, stop, cause);
                return Err(LoadError::Fetch { start, stop, cause });
            }
        };

        if rows.len() > requested {
            log::error!(
                "Source returned {} rows for {}..{}; refusing to merge",
                rows.len(),
                start,
                stop
            );
            debug_assert!(
                rows.len() <= requested,
                "source returned {} rows for the {}-row window at {}",
                rows.len(),
                requested,
                start
            );
            return Err(LoadError::InconsistentRange {
                start,
                requested,
                returned: rows.len(),
            });
        }

        if self.generation.get() != generation {
            log::debug!(
                "Dropping rows {}..{} from generation {} (now {})",
                start,
                stop,
                generation,
                self.generation.get()
            );
            return Ok(LoadOutcome::Stale);
        }

        let count = rows.len();
        let mut cache = self.cache.borrow_mut();
        if count < requested {
            // A short page past unseen rows bounds the data without ending it.
            if start <= cache.loaded_count() {
                cache.mark_end(start + count);
            } else {
                cache.mark_absent_from(start + count);
            }
        }
        cache.merge(start, rows);
        log::debug!("Merged {} rows at {}", count, start);
        Ok(LoadOutcome::Merged { start, count })
    }

    pub fn reset_cache(&self) {
        self.cache.borrow_mut().invalidate();
        self.generation.set(self.generation.get() + 1);
    }
}
