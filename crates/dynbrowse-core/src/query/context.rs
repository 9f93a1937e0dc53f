//! Environment capabilities handed to built-ins at evaluation time.
//!
//! Nothing here is global: the caller builds an [`ExecContext`] per
//! evaluation and every capability is optional. Built-ins degrade to empty or
//! neutral results when the capability they need is absent.

use chrono::{DateTime, Utc};
use dynbrowse_model::Item;

/// The current result set as seen by `marked()`.
pub trait ResultContext {
    /// Number of rows.
    fn row_count(&self) -> usize;

    /// The row at `idx`, if any.
    fn row(&self, idx: usize) -> Option<&Item>;

    /// Whether the row at `idx` is marked.
    fn is_marked(&self, idx: usize) -> bool;
}

/// Access to the system clipboard.
pub trait Clipboard {
    /// The clipboard text, or `None` when it holds no text.
    fn read_text(&self) -> Option<String>;
}

/// Source of the current time.
pub trait TimeSource {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-evaluation capabilities.
#[derive(Default, Clone, Copy)]
pub struct ExecContext<'a> {
    /// The current result set, if one is loaded.
    pub result_set: Option<&'a dyn ResultContext>,
    /// The clipboard, if available.
    pub clipboard: Option<&'a dyn Clipboard>,
    /// The clock; the system clock is used when absent.
    pub time_source: Option<&'a dyn TimeSource>,
}

impl std::fmt::Debug for ExecContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("result_set", &self.result_set.map(|rs| rs.row_count()))
            .field("clipboard", &self.clipboard.is_some())
            .field("time_source", &self.time_source.is_some())
            .finish()
    }
}

impl<'a> ExecContext<'a> {
    /// A context with no capabilities.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sets the result set.
    #[must_use]
    pub fn with_result_set(mut self, result_set: &'a dyn ResultContext) -> Self {
        self.result_set = Some(result_set);
        self
    }

    /// Sets the clipboard.
    #[must_use]
    pub fn with_clipboard(mut self, clipboard: &'a dyn Clipboard) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn with_time_source(mut self, time_source: &'a dyn TimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// The current time from the configured source, or the system clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.time_source.map_or_else(Utc::now, |clock| clock.now())
    }
}
