//! Live-event helpers that need a little in-memory state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::db::UserId;

/// Detects users reacting to their own messages, with a per-user cooldown
/// so the adapter posts at most one callout per window.
#[derive(Debug)]
pub struct SelfReactionMonitor {
    cooldown: Duration,
    last_triggered: Mutex<HashMap<UserId, Instant>>,
}

impl SelfReactionMonitor {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_triggered: Mutex::new(HashMap::new()),
        }
    }

    /// Observe a reaction event. Returns `true` when the reactor reacted to
    /// their own message and their cooldown window has elapsed.
    pub fn observe(&self, message_author: UserId, reactor: UserId) -> bool {
        if message_author != reactor {
            return false;
        }

        let now = Instant::now();
        let mut last = self.last_triggered.lock().expect("cooldown lock poisoned");

        if let Some(previous) = last.get(&reactor) {
            if now.duration_since(*previous) < self.cooldown {
                return false;
            }
        }

        last.insert(reactor, now);
        true
    }
}
