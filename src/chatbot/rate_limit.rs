//! Per-user cooldown tracked as an "unlocked-at" instant.
//!
//! No timers are spawned: each admission compares `now` with the stored
//! instant, so overlapping messages cannot clear each other's cooldown.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Expired entries are swept once the map grows past this.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    window: Duration,
    unlocked_at: HashMap<u64, Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            unlocked_at: HashMap::new(),
        }
    }

    /// Admit the user and start their cooldown, or report how long is left.
    ///
    /// A limited attempt does not extend the cooldown.
    pub fn check(&mut self, user_id: u64, now: Instant) -> Admission {
        if let Some(&until) = self.unlocked_at.get(&user_id)
            && now < until
        {
            return Admission::Limited { retry_after: until - now };
        }

        if self.unlocked_at.len() >= SWEEP_THRESHOLD {
            self.unlocked_at.retain(|_, until| *until > now);
        }
        self.unlocked_at.insert(user_id, now + self.window);
        Admission::Allowed
    }

    #[cfg(test)]
    pub fn is_limited(&self, user_id: u64, now: Instant) -> bool {
        self.unlocked_at.get(&user_id).is_some_and(|&until| now < until)
    }
}
