//! Frame pacing.
//!
//! Converts a target frame rate into real-time delays between presentations.
//! Pacing is rate-based against the wall clock; frames carry no timestamps.

use std::time::{Duration, Instant};

const FALLBACK_FPS: f64 = 30.0;

/// Enforces a minimum interval between successive frame presentations.
///
/// While the consumer keeps up, the deadline advances by whole intervals so
/// sleep overshoot does not accumulate into drift. A slow consumer falls
/// behind real time; there is no catch-up bursting and no frame dropping.
pub struct FramePacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: f64) -> Self {
        Self {
            interval: Self::interval_for(fps),
            next_due: None,
        }
    }

    fn interval_for(fps: f64) -> Duration {
        if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::from_secs_f64(1.0 / FALLBACK_FPS)
        }
    }

    pub fn set_fps(&mut self, fps: f64) {
        self.interval = Self::interval_for(fps);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next presentation slot, then mark it.
    ///
    /// The first call has no previous mark and is treated as already due.
    pub fn wait(&mut self) {
        let now = Instant::now();
        match self.next_due {
            None => {
                self.next_due = Some(now + self.interval);
            }
            Some(due) if due > now => {
                std::thread::sleep(due - now);
                self.next_due = Some(due + self.interval);
            }
            Some(_) => {
                // Behind schedule: present immediately and rebase.
                self.next_due = Some(now + self.interval);
            }
        }
    }

    /// Forget the previous mark, e.g. after a pause.
    pub fn reset(&mut self) {
        self.next_due = None;
    }
}
