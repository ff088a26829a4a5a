use comfy_table::{Cell, Color, Table};
use common::{Job, JobFilter, QueryChange};
use std::cell::{Cell as StdCell, RefCell};
use std::collections::BTreeSet;
use std::ops::Range;

use super::columns::ColumnId;
use super::loader::WindowLoader;
use super::provider::{JobSource, LoadError, PagedRowProvider};
use super::row_cache::RowSlot;
use super::selection::SelectionTracker;

/// A scrollable, lazily loaded job table.
///
/// Owns the provider, the window loader and the selection. Every query
/// change goes through [`on_query_change`](Self::on_query_change), which
/// waits for the source to accept the change before resetting the cache.
pub struct JobTableView<S> {
    provider: PagedRowProvider<S>,
    loader: WindowLoader,
    selection: SelectionTracker,
    columns: RefCell<BTreeSet<ColumnId>>,
    scroll: StdCell<usize>,
    height: usize,
}

impl<S: JobSource> JobTableView<S> {
    pub fn new(source: S, height: usize, batch: usize) -> Self {
        Self {
            provider: PagedRowProvider::new(source),
            loader: WindowLoader::new(batch),
            selection: SelectionTracker::new(),
            columns: RefCell::new(ColumnId::default_set()),
            scroll: StdCell::new(0),
            height: height.max(1),
        }
    }

    pub fn source(&self) -> &S {
        self.provider.source()
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub fn row_count(&self) -> usize {
        self.provider.row_count()
    }

    pub fn can_load_more(&self) -> bool {
        self.provider.can_load_more()
    }

    pub fn is_row_loaded(&self, index: usize) -> bool {
        self.provider.is_row_loaded(index)
    }

    pub fn row_at(&self, index: usize) -> RowSlot {
        self.provider.row(index)
    }

    pub fn columns(&self) -> Vec<ColumnId> {
        self.columns.borrow().iter().copied().collect()
    }

    pub fn scroll(&self) -> usize {
        self.scroll.get()
    }

    pub fn render_epoch(&self) -> u64 {
        self.loader.render_epoch()
    }

    /// Rows on screen. Runs past the sentinel row until the end of the data
    /// is known, so the next page gets requested.
    pub fn visible_window(&self) -> Range<usize> {
        let start = self.scroll.get();
        let stop = start + self.height;
        if self.provider.can_load_more() {
            start..stop
        } else {
            let count = self.provider.row_count();
            start.min(count)..stop.min(count)
        }
    }

    pub async fn load_visible(&self) -> Vec<LoadError> {
        self.loader
            .on_rows_rendered(&self.provider, self.visible_window())
            .await
    }

    /// Scrolling stops at the last row, which is the sentinel while more
    /// rows may exist, so the table grows one page at a time.
    pub fn scroll_to(&self, offset: usize) {
        let last = self.provider.row_count().saturating_sub(1);
        self.scroll.set(offset.min(last));
    }

    pub fn scroll_by(&self, delta: isize) {
        let current = self.scroll.get();
        let target = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta as usize)
        };
        self.scroll_to(target);
    }

    pub fn page_down(&self) {
        self.scroll_by(self.height as isize);
    }

    pub fn page_up(&self) {
        self.scroll_by(-(self.height as isize));
    }

    pub fn set_selected(&self, job: &Job, selected: bool) {
        self.selection.toggle(&job.id, job, selected);
        // selection lives outside the row data; mounted rows must redraw
        self.loader.force_update();
    }

    /// Flip selection of the row at `index`. Placeholder rows are not
    /// selectable; returns the new state otherwise.
    pub fn toggle_row(&self, index: usize) -> Option<bool> {
        match self.provider.row(index) {
            RowSlot::Loaded(job) => {
                let selected = !self.selection.is_selected(&job.id);
                self.set_selected(&job, selected);
                Some(selected)
            }
            RowSlot::Pending => None,
        }
    }

    /// Apply a query change, then drop everything cached for the old query.
    pub async fn on_query_change(&self, change: QueryChange) -> anyhow::Result<()> {
        log::debug!("Query change: {:?}", change);
        self.provider.source().update_query(change).await?;
        self.reset_cache();
        Ok(())
    }

    pub fn set_column(&self, column: ColumnId, visible: bool) {
        let changed = {
            let mut columns = self.columns.borrow_mut();
            if visible {
                columns.insert(column)
            } else {
                columns.remove(&column)
            }
        };
        if changed {
            self.reset_cache();
        }
    }

    /// Clear the row cache and the loader's request memo together, and go
    /// back to the top: index 5 of a new query is a different job.
    pub fn reset_cache(&self) {
        self.provider.reset_cache();
        self.loader.reset_load_more_rows_cache();
        self.scroll.set(0);
    }

    pub fn force_update(&self) {
        self.loader.force_update();
    }

    pub fn render(&self, filter: &JobFilter) -> Table {
        let columns = self.columns();
        let mut table = Table::new();

        let mut header = vec![Cell::new("#"), Cell::new("")];
        header.extend(columns.iter().map(|c| Cell::new(c.header(filter))));
        table.set_header(header);

        let window = self.visible_window();
        let count = self.provider.row_count();
        for index in window.start..window.end.min(count) {
            let mut cells = vec![Cell::new(index)];
            match self.provider.row(index) {
                RowSlot::Loaded(job) => {
                    let checkbox = if self.selection.is_selected(&job.id) { "[x]" } else { "[ ]" };
                    cells.push(Cell::new(checkbox));
                    cells.extend(columns.iter().map(|c| Cell::new(c.value(&job))));
                }
                RowSlot::Pending => {
                    cells.push(Cell::new(""));
                    cells.push(Cell::new("Loading").fg(Color::DarkGrey));
                    cells.extend(columns.iter().skip(1).map(|_| Cell::new("")));
                }
            }
            table.add_row(cells);
        }
        table
    }
}
