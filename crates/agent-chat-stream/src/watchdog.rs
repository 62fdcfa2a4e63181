use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Watchdog lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogState {
    /// Waiting for activity.
    Armed,
    /// The window elapsed with no activity. Terminal.
    TimedOut,
}

/// Inactivity timer owned by a stream's read loop.
///
/// Every bit of activity rearms it with the full window. Dropping the
/// watchdog tears the timer down.
pub struct Watchdog {
    window: Duration,
    sleep: Pin<Box<Sleep>>,
    state: WatchdogState,
}

impl Watchdog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sleep: Box::pin(tokio::time::sleep(window)),
            state: WatchdogState::Armed,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Records activity. Ignored once timed out.
    pub fn reset(&mut self) {
        if self.state == WatchdogState::Armed {
            self.sleep.as_mut().reset(Instant::now() + self.window);
        }
    }

    /// Resolves when the window elapses without a reset.
    ///
    /// Cancel-safe; a timed-out watchdog resolves immediately.
    pub async fn expired(&mut self) {
        if self.state == WatchdogState::Armed {
            self.sleep.as_mut().await;
            self.state = WatchdogState::TimedOut;
        }
    }
}
