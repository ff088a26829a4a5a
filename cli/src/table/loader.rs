use std::cell::{Cell, RefCell};
use std::ops::Range;

use super::provider::{JobSource, LoadError, LoadOutcome, PagedRowProvider};

/// Turns the visible window into range fetches.
///
/// Each contiguous run of unknown rows becomes one `ensure_loaded` call,
/// widened forward to `minimum_batch_size`. Runs are remembered while in
/// flight so an overlapping window never requests them a second time.
/// That memo outlives a cache reset unless
/// [`reset_load_more_rows_cache`](Self::reset_load_more_rows_cache) is called
/// as well.
pub struct WindowLoader {
    minimum_batch_size: usize,
    in_flight: RefCell<Vec<Range<usize>>>,
    generation: Cell<u64>,
    render_epoch: Cell<u64>,
}

impl WindowLoader {
    pub fn new(minimum_batch_size: usize) -> Self {
        Self {
            minimum_batch_size: minimum_batch_size.max(1),
            in_flight: RefCell::new(Vec::new()),
            generation: Cell::new(0),
            render_epoch: Cell::new(0),
        }
    }

    pub fn is_requested(&self, index: usize) -> bool {
        self.in_flight.borrow().iter().any(|r| r.contains(&index))
    }

    pub fn unloaded_blocks(
        &self,
        window: Range<usize>,
        is_loaded: impl Fn(usize) -> bool,
    ) -> Vec<Range<usize>> {
        let unknown = |index: usize| !is_loaded(index) && !self.is_requested(index);

        let mut blocks: Vec<Range<usize>> = Vec::new();
        let mut current: Option<Range<usize>> = None;
        for index in window {
            if unknown(index) {
                match current.as_mut() {
                    Some(block) => block.end = index + 1,
                    None => current = Some(index..index + 1),
                }
            } else if let Some(block) = current.take() {
                blocks.push(block);
            }
        }
        blocks.extend(current);

        for block in blocks.iter_mut() {
            let target = block.start + self.minimum_batch_size;
            while block.end < target && unknown(block.end) {
                block.end += 1;
            }
        }
        blocks
    }

    /// Load whatever `window` still lacks. Returns the failed blocks' errors;
    /// those blocks are requestable again on the next call.
    pub async fn on_rows_rendered<S: JobSource>(
        &self,
        provider: &PagedRowProvider<S>,
        window: Range<usize>,
    ) -> Vec<LoadError> {
        let blocks = self.unloaded_blocks(window, |i| provider.is_row_loaded(i));
        if blocks.is_empty() {
            return Vec::new();
        }

        let generation = self.generation.get();
        self.in_flight.borrow_mut().extend(blocks.iter().cloned());

        let mut errors = Vec::new();
        for block in blocks {
            if self.generation.get() != generation {
                // reset while we were loading; the new window drives its own fetches
                break;
            }
            log::debug!("Loading rows {}..{}", block.start, block.end);
            let result = provider.ensure_loaded(block.start, block.end - 1).await;
            if self.generation.get() == generation {
                self.release(&block);
            }
            match result {
                Ok(LoadOutcome::Merged { .. }) => self.force_update(),
                Ok(LoadOutcome::Stale) => {}
                Err(e) => errors.push(e),
            }
        }
        errors
    }

    /// Forget every in-flight request. Must accompany every cache reset.
    pub fn reset_load_more_rows_cache(&self) {
        self.in_flight.borrow_mut().clear();
        self.generation.set(self.generation.get() + 1);
        self.force_update();
    }

    /// Ask the shell to redraw mounted rows.
    pub fn force_update(&self) {
        self.render_epoch.set(self.render_epoch.get() + 1);
    }

    pub fn render_epoch(&self) -> u64 {
        self.render_epoch.get()
    }

    fn release(&self, block: &Range<usize>) {
        let mut in_flight = self.in_flight.borrow_mut();
        if let Some(pos) = in_flight.iter().position(|r| r == block) {
            in_flight.remove(pos);
        }
    }
}
