//! Manual-reset event and wait timeouts.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Check the current state without blocking.
    Poll,
    /// Block until the condition holds.
    Infinite,
    Bounded(Duration),
}

/// Seconds: negative polls, zero waits indefinitely, positive bounds the wait.
impl From<f64> for WaitTimeout {
    fn from(seconds: f64) -> Self {
        if seconds.is_nan() || seconds < 0.0 {
            Self::Poll
        } else if seconds == 0.0 {
            Self::Infinite
        } else {
            Duration::try_from_secs_f64(seconds).map_or(Self::Infinite, Self::Bounded)
        }
    }
}

impl From<Duration> for WaitTimeout {
    fn from(timeout: Duration) -> Self {
        Self::Bounded(timeout)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Event {
    set: Mutex<bool>,
    changed: Condvar,
}

impl Event {
    pub(crate) fn set(&self) {
        *self.set.lock() = true;
        self.changed.notify_all();
    }

    pub(crate) fn reset(&self) {
        *self.set.lock() = false;
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Returns whether the event is set when the wait ends.
    pub(crate) fn wait(&self, timeout: WaitTimeout) -> bool {
        let mut set = self.set.lock();
        let deadline = match timeout {
            WaitTimeout::Poll => return *set,
            WaitTimeout::Infinite => None,
            WaitTimeout::Bounded(timeout) => Instant::now().checked_add(timeout),
        };
        while !*set {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut set, deadline).timed_out() {
                        return *set;
                    }
                }
                None => self.changed.wait(&mut set),
            }
        }
        true
    }
}
