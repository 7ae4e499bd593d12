//! Progress sink: the core depends only on this narrow interface, not on any
//! particular rendering. The shipped implementation is a plain line-oriented
//! reporter; a richer interactive display is left to an external
//! collaborator rather than built in here.
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait ProgressSink: Send + Sync {
    fn slot_started(&self, slot: &str);
    fn slot_finished(&self, slot: &str, success: bool);
}

/// Does nothing; useful for tests and for library callers that don't want
/// progress output.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn slot_started(&self, _slot: &str) {}
    fn slot_finished(&self, _slot: &str, _success: bool) {}
}

/// Prints one line per transition to stderr via `log`, plus a running
/// count of finished slots.
#[derive(Default)]
pub struct LineProgressSink {
    finished: AtomicUsize,
}

impl LineProgressSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LineProgressSink {
    fn slot_started(&self, slot: &str) {
        log::info!("slot {slot:?}: started");
    }

    fn slot_finished(&self, slot: &str, success: bool) {
        let count = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        if success {
            log::info!("slot {slot:?}: done ({count} finished so far)");
        } else {
            log::warn!("slot {slot:?}: failed ({count} finished so far)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_sink_counts_finished_slots() {
        let sink = LineProgressSink::new();
        sink.slot_started("a");
        sink.slot_finished("a", true);
        sink.slot_finished("b", false);
        assert_eq!(sink.finished.load(Ordering::Relaxed), 2);
    }
}
