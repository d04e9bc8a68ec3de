//! Progress estimation
//!
//! A storage PUT to a signed URL does not report byte-level progress, so the
//! coordinator ticks a [`ProgressEstimator`] while the transfer is in flight.
//! A client with real progress events can supply its own estimator without
//! touching the task state machine.

use crate::config::ProgressConfig;

/// Produces the next progress value on each tick of the upload timer
pub trait ProgressEstimator: Send + Sync {
    /// Next progress value (0-100) given the current one.
    fn advance(&self, current: u8) -> u8;
}

/// Fixed-step ramp that stops short of completion.
///
/// Completion (100) is only reached when the document is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedRamp {
    step: u8,
    cap: u8,
}

impl SimulatedRamp {
    pub fn new(step: u8, cap: u8) -> Self {
        Self {
            step,
            cap: cap.min(100),
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::new(config.step, config.cap)
    }
}

impl Default for SimulatedRamp {
    fn default() -> Self {
        Self::new(10, 90)
    }
}

impl ProgressEstimator for SimulatedRamp {
    fn advance(&self, current: u8) -> u8 {
        current.saturating_add(self.step).min(self.cap).max(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_steps_by_ten_and_caps_at_ninety() {
        let ramp = SimulatedRamp::default();
        let mut progress = 0;
        let mut seen = Vec::new();
        for _ in 0..12 {
            progress = ramp.advance(progress);
            seen.push(progress);
        }
        assert_eq!(&seen[..9], &[10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert!(seen[9..].iter().all(|p| *p == 90));
    }

    #[test]
    fn test_ramp_never_goes_backwards() {
        let ramp = SimulatedRamp::new(10, 90);
        assert_eq!(ramp.advance(95), 95);
    }

    #[test]
    fn test_ramp_from_config() {
        let config = ProgressConfig {
            tick_millis: 50,
            step: 25,
            cap: 75,
        };
        let ramp = SimulatedRamp::from_config(&config);
        assert_eq!(ramp.advance(0), 25);
        assert_eq!(ramp.advance(60), 75);
    }
}
