//! Windowed, incrementally paged job table.
//!
//! [`JobTableView`] owns a [`PagedRowProvider`] (row cache plus fetch
//! generation), a [`WindowLoader`] that turns the visible window into range
//! fetches, and a [`SelectionTracker`] keyed by job id.

pub mod columns;
pub mod loader;
pub mod provider;
pub mod row_cache;
pub mod selection;
pub mod view;

#[cfg(test)]
mod testing;

pub use columns::ColumnId;
pub use loader::WindowLoader;
pub use provider::{JobSource, LoadError, LoadOutcome, PagedRowProvider};
pub use row_cache::{LoadedRange, RowCache, RowSlot};
pub use selection::SelectionTracker;
pub use view::JobTableView;
