//! Write suppression around mutations that did not originate locally.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionState {
    /// Saves go through.
    Active,
    /// An external-origin mutation is being applied.
    Restoring,
    /// A full restore finished recently; saves are dropped until the instant.
    Cooldown(Instant),
}

/// Decides whether a `save()` may reach the persistence pipeline.
#[derive(Debug)]
pub struct WriteGate {
    state: SuppressionState,
    /// Cooldown interrupted by a nested restore, resumed when it ends.
    resume: Option<Instant>,
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteGate {
    pub fn new() -> Self {
        Self {
            state: SuppressionState::Active,
            resume: None,
        }
    }

    /// Current state, with an expired cooldown reported as `Active`.
    pub fn state(&self, now: Instant) -> SuppressionState {
        match self.state {
            SuppressionState::Cooldown(until) if now >= until => SuppressionState::Active,
            state => state,
        }
    }

    pub fn begin_restore(&mut self) {
        if let SuppressionState::Cooldown(until) = self.state {
            self.resume = Some(until);
        }
        self.state = SuppressionState::Restoring;
    }

    /// Leave `Restoring`. With a cooldown the gate stays closed for that
    /// long; without one it returns to whatever it was before.
    pub fn end_restore(&mut self, now: Instant, cooldown: Option<Duration>) {
        let resumed = self.resume.take().filter(|until| *until > now);
        let until = match (cooldown.map(|c| now + c), resumed) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.state = match until {
            Some(until) => SuppressionState::Cooldown(until),
            None => SuppressionState::Active,
        };
    }

    /// Whether a save issued at `now` may proceed.
    pub fn allows_save(&mut self, now: Instant) -> bool {
        match self.state {
            SuppressionState::Active => true,
            SuppressionState::Restoring => false,
            SuppressionState::Cooldown(until) if now >= until => {
                self.state = SuppressionState::Active;
                true
            }
            SuppressionState::Cooldown(_) => false,
        }
    }
}
