//! Progress of the parse phase, the only phase whose length scales with
//! repository size.
//!
//! The CLI draws an `indicatif` bar over files; library callers pass
//! `NoopReporter` or their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} Parsing [{bar:30.cyan/blue}] {pos}/{len} files {msg}";

/// Receives per-file parse outcomes. Called from rayon workers.
pub trait ProgressReporter: Send + Sync {
    /// Parsing of `total` files begins.
    fn parse_started(&self, total: u64);

    /// One file is done; `ok` is false when the file was skipped.
    fn file_parsed(&self, path: &str, ok: bool);

    /// Every file is done; resolution follows.
    fn parse_finished(&self);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn parse_started(&self, _total: u64) {}
    fn file_parsed(&self, _path: &str, _ok: bool) {}
    fn parse_finished(&self) {}
}

/// Progress bar on stderr; the message counts skipped files.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    done: AtomicU64,
    skipped: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::hidden()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Counts without drawing.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self {
            bar,
            done: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Files finished in the current parse phase.
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn parse_started(&self, total: u64) {
        self.done.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.bar.set_length(total);
        self.bar.set_message("");
        self.bar.reset();
    }

    fn file_parsed(&self, path: &str, ok: bool) {
        self.done.fetch_add(1, Ordering::Relaxed);
        if !ok {
            let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            self.bar.set_message(format!("({skipped} skipped, last {path})"));
        }
        self.bar.inc(1);
    }

    fn parse_finished(&self) {
        self.bar.finish_and_clear();
    }
}
