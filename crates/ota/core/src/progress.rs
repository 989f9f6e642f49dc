//! Download progress reporting.
//!
//! Fetchers report whatever percentages they like; the tracker turns that
//! into a well-formed sequence: values in 0..=100, never decreasing, and a
//! terminal 100 delivered exactly once, only when the download is finished.

use parking_lot::Mutex;

struct TrackerState {
    last: Option<u8>,
    finished: bool,
}

pub struct ProgressTracker<F>
where
    F: Fn(u8) + Send + Sync,
{
    sink: F,
    state: Mutex<TrackerState>,
}

impl<F> ProgressTracker<F>
where
    F: Fn(u8) + Send + Sync,
{
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            state: Mutex::new(TrackerState {
                last: None,
                finished: false,
            }),
        }
    }

    /// Report intermediate progress. 100 is held back until [`finish`].
    ///
    /// [`finish`]: ProgressTracker::finish
    pub fn report(&self, percent: u8) {
        let percent = percent.min(99);
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        if state.last.map_or(true, |last| percent > last) {
            state.last = Some(percent);
            (self.sink)(percent);
        }
    }

    /// Emit the terminal 100. Later calls are no-ops.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        state.last = Some(100);
        (self.sink)(100);
    }

    pub fn last(&self) -> Option<u8> {
        self.state.lock().last
    }
}
