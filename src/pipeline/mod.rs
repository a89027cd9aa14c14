//! # Ingestion pipeline
//!
//! Lines come from a file (or any reader), go through a [`FilterChain`] of
//! parsers, and every accepted event is fanned out to the subscribers in a
//! [`SubscriberRegistry`].
//!
//! Two execution modes:
//! - [`LineByLineFilter`]: single thread, one line at a time.
//! - [`BackgroundFilter`]: a reader task feeds a bounded queue, and a single
//!   consumer drains it. A full queue stalls the reader.
//!
//! Both deliver events in line order and report a [`RunStats`].
//!
//! Run state: `Idle -> Reading -> Draining -> Done`, or `Failed` when the
//! source cannot be read or the queue is torn down early. [`RunProgress`]
//! exposes the phase and line counters while a run is in flight.

pub mod chain;
pub mod engine;
pub mod fanout;
pub mod ingestion;
pub mod line_by_line;

pub use chain::FilterChain;
pub use engine::PipelineEngine;
pub use fanout::{shared, SharedSubscriber, Subscriber, SubscriberRegistry};
pub use ingestion::BackgroundFilter;
pub use line_by_line::LineByLineFilter;

use {
    crate::config::ConfigError,
    serde::Serialize,
    std::{
        ops::AddAssign,
        path::PathBuf,
        sync::atomic::{AtomicU64, AtomicU8, Ordering},
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ingestion of {path} interrupted: {reason}")]
    Interrupted { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Line and event counts of one or more runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Every line read, whether or not a filter accepted it
    pub total_lines: u64,
    pub accepted_events: u64,
}

impl RunStats {
    /// Lines no filter accepted; zero for inconsistent hand-built counts
    pub fn rejected_lines(&self) -> u64 {
        self.total_lines.saturating_sub(self.accepted_events)
    }
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, other: Self) {
        self.total_lines += other.total_lines;
        self.accepted_events += other.accepted_events;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Reading = 1,
    Draining = 2,
    Done = 3,
    Failed = 4,
}

impl RunPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunPhase::Reading,
            2 => RunPhase::Draining,
            3 => RunPhase::Done,
            4 => RunPhase::Failed,
            _ => RunPhase::Idle,
        }
    }
}

/// Counters shared between the reader and the consumer of a run
#[derive(Debug, Default)]
pub struct RunProgress {
    phase: AtomicU8,
    lines_read: AtomicU64,
    lines_dequeued: AtomicU64,
    peak_queued: AtomicU64,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: RunPhase) {
        let previous = RunPhase::from_u8(self.phase.swap(phase as u8, Ordering::AcqRel));
        if previous != phase {
            log::debug!("🔄 Run phase {:?} -> {:?}", previous, phase);
        }
    }

    /// Lines taken from the source
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Acquire)
    }

    /// Lines handed to the filter chain
    pub fn lines_dequeued(&self) -> u64 {
        self.lines_dequeued.load(Ordering::Acquire)
    }

    /// Lines read but not yet processed
    pub fn in_flight(&self) -> u64 {
        self.lines_read().saturating_sub(self.lines_dequeued())
    }

    /// Highest queue length the consumer observed
    pub fn peak_queued(&self) -> u64 {
        self.peak_queued.load(Ordering::Acquire)
    }

    pub(crate) fn record_read(&self) {
        self.lines_read.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_dequeued(&self, queued_after: usize) {
        self.lines_dequeued.fetch_add(1, Ordering::AcqRel);
        self.peak_queued.fetch_max(queued_after as u64, Ordering::AcqRel);
    }

    /// Back to `Idle` with zeroed counters
    pub fn reset(&self) {
        self.lines_read.store(0, Ordering::Release);
        self.lines_dequeued.store(0, Ordering::Release);
        self.peak_queued.store(0, Ordering::Release);
        self.phase.store(RunPhase::Idle as u8, Ordering::Release);
    }
}

/// Decode one raw line: trailing `\n`/`\r\n` removed, invalid UTF-8 replaced
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
