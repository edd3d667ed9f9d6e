use std::time::{Duration, Instant};

use crate::shared::settings::ConfigError;

/// Decides which capture cycles run detection.
///
/// A cycle opens the gate only when its position is a multiple of `skip`
/// and at least `min_interval` has passed since the last opening. Every
/// call advances the cycle counter, open or not.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    skip: usize,
    min_interval: Duration,
    cycles: usize,
    last_open: Option<Instant>,
}

impl ThrottleGate {
    pub fn new(skip: usize, min_interval: Duration) -> Result<Self, ConfigError> {
        if skip < 1 {
            return Err(ConfigError::Invalid("skip factor must be >= 1".to_string()));
        }
        Ok(Self {
            skip,
            min_interval,
            cycles: 0,
            last_open: None,
        })
    }

    /// Time-only gate.
    pub fn every(min_interval: Duration) -> Self {
        Self {
            skip: 1,
            min_interval,
            cycles: 0,
            last_open: None,
        }
    }

    pub fn try_open(&mut self, now: Instant) -> bool {
        let on_skip_boundary = self.cycles % self.skip == 0;
        self.cycles = self.cycles.wrapping_add(1);
        if !on_skip_boundary {
            return false;
        }
        if let Some(last) = self.last_open {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_open = Some(now);
        true
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }
}
