//! Per-source timing hooks.
//!
//! Every chained source may carry a [`SourceProfiler`] that accumulates
//! the time spent producing pixels. A transform pauses its own profiler
//! around upstream pulls, so the recorded time is *self time*: the cost of
//! this transform alone, not its predecessors.
//!
//! Profiler state is single-threaded by design; a pipeline is not
//! reentrant and profilers must not be shared across threads.
//!
//! # Usage
//!
//! ```rust
//! use raster_core::profiler::SourceProfiler;
//!
//! let p = SourceProfiler::new("scale");
//! p.enter();
//! // ... own work ...
//! p.pause();
//! // ... upstream copy_pixels ...
//! p.resume();
//! // ... more own work ...
//! p.leave();
//! assert_eq!(p.pull_count(), 1);
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Accumulates self-time and pull counts for one pipeline source.
#[derive(Debug)]
pub struct SourceProfiler {
    name: String,
    elapsed: Cell<Duration>,
    started: Cell<Option<Instant>>,
    pulls: Cell<u64>,
}

impl SourceProfiler {
    /// Creates a profiler labelled with the source's display name.
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            elapsed: Cell::new(Duration::ZERO),
            started: Cell::new(None),
            pulls: Cell::new(0),
        })
    }

    /// Source label used in reports.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks the start of one `copy_pixels` call.
    #[inline]
    pub fn enter(&self) {
        self.pulls.set(self.pulls.get() + 1);
        self.started.set(Some(Instant::now()));
    }

    /// Marks the end of one `copy_pixels` call.
    #[inline]
    pub fn leave(&self) {
        self.flush();
    }

    /// Stops the clock before handing control to the upstream source.
    #[inline]
    pub fn pause(&self) {
        self.flush();
    }

    /// Restarts the clock after the upstream source returns.
    #[inline]
    pub fn resume(&self) {
        self.started.set(Some(Instant::now()));
    }

    /// Accumulated self time.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Number of `copy_pixels` calls recorded.
    #[inline]
    pub fn pull_count(&self) -> u64 {
        self.pulls.get()
    }

    fn flush(&self) {
        if let Some(start) = self.started.take() {
            self.elapsed.set(self.elapsed.get() + start.elapsed());
        }
    }
}

/// One line of a pipeline timing report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerEntry {
    /// Source label.
    pub name: String,
    /// Accumulated self time.
    pub elapsed: Duration,
    /// Number of pulls.
    pub pulls: u64,
}

impl From<&SourceProfiler> for ProfilerEntry {
    fn from(p: &SourceProfiler) -> Self {
        Self {
            name: p.name.clone(),
            elapsed: p.elapsed(),
            pulls: p.pull_count(),
        }
    }
}
