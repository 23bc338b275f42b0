use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
    pub succeeded: usize,
    pub skipped: usize,
    /// Set once the batch has reached its final state and its archive, if any, is available.
    pub finished: bool,
}

impl ProgressSnapshot {
    fn start(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            percentage: 0.0,
            succeeded: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Every student has been counted. The batch may still be writing its archive.
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Progress of one batch. Publishing overwrites the latest snapshot and never waits on
/// subscribers; a subscriber only ever sees the most recent value.
#[derive(Debug)]
pub struct ProgressTracker {
    sender: watch::Sender<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        let (sender, _) = watch::channel(ProgressSnapshot::start(total));
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.sender.borrow()
    }

    /// Counts one processed student.
    pub fn record(&self, succeeded: bool) {
        self.sender.send_modify(|snapshot| {
            snapshot.completed = (snapshot.completed + 1).min(snapshot.total);
            if succeeded {
                snapshot.succeeded += 1;
            } else {
                snapshot.skipped += 1;
            }
            snapshot.percentage = if snapshot.total == 0 {
                100.0
            } else {
                snapshot.completed as f64 / snapshot.total as f64 * 100.0
            };
        });
    }

    /// Publishes the terminal snapshot. Called after the batch outcome is registered.
    pub fn finish(&self) {
        self.sender.send_modify(|snapshot| snapshot.finished = true);
    }
}
