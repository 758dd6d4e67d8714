//! Device configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Default chance, in percent, that a position query lies.
pub const DEFAULT_LIE_PROBABILITY: u8 = 10;

/// Default maximum position.
pub const DEFAULT_MAX_POSITION: i64 = 15_000;

/// Largest offset, in either direction, applied to a dishonest report.
pub const LIE_SPREAD: i64 = 75;

/// Fixed device parameters, validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    lie_probability: u8,
    max_position: i64,
}

impl DeviceConfig {
    /// Validate and build a configuration.
    ///
    /// # Errors
    ///
    /// - `lie_probability` outside `0..=100`
    /// - `max_position` below 1
    pub fn new(lie_probability: i64, max_position: i64) -> Result<Self, ConfigError> {
        let lie_probability = u8::try_from(lie_probability)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(ConfigError::LieProbabilityOutOfRange(lie_probability))?;

        if max_position < 1 {
            return Err(ConfigError::MaxPositionTooSmall(max_position));
        }

        Ok(Self { lie_probability, max_position })
    }

    /// Percent chance that a position query is perturbed.
    pub fn lie_probability(&self) -> u8 {
        self.lie_probability
    }

    /// Highest reachable position.
    pub fn max_position(&self) -> i64 {
        self.max_position
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { lie_probability: DEFAULT_LIE_PROBABILITY, max_position: DEFAULT_MAX_POSITION }
    }
}

/// Step timing of a simulated move.
///
/// The delay after each step starts at `initial_delay` and is multiplied by
/// `decay_factor` (truncated to whole milliseconds) until it reaches
/// `min_delay`, where it stays. Moves therefore start slow and settle at a
/// constant pace regardless of distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    /// Delay before decay is applied
    pub initial_delay: Duration,
    /// Per-step multiplier, in (0, 1]
    pub decay_factor: f64,
    /// Floor the delay never drops below
    pub min_delay: Duration,
}

impl MotionProfile {
    /// Check the profile can produce a sane delay sequence.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay.is_zero() {
            return Err(ConfigError::InvalidMotionProfile("minimum delay must be non-zero"));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(ConfigError::InvalidMotionProfile("decay factor must be in (0, 1]"));
        }
        Ok(())
    }

    /// Delay that follows `current`.
    ///
    /// Never increases and never goes below `min_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if current <= self.min_delay {
            return self.min_delay;
        }
        let decayed_ms = (current.as_millis() as f64 * self.decay_factor).trunc() as u64;
        Duration::from_millis(decayed_ms).clamp(self.min_delay, current)
    }
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            decay_factor: 0.90,
            min_delay: Duration::from_millis(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_bounds() {
        assert!(DeviceConfig::new(0, 1).is_ok());
        assert!(DeviceConfig::new(100, 1).is_ok());
        assert_eq!(DeviceConfig::new(101, 1), Err(ConfigError::LieProbabilityOutOfRange(101)));
        assert_eq!(DeviceConfig::new(-1, 1), Err(ConfigError::LieProbabilityOutOfRange(-1)));
        assert_eq!(DeviceConfig::new(10, 0), Err(ConfigError::MaxPositionTooSmall(0)));
    }

    #[test]
    fn default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.lie_probability(), 10);
        assert_eq!(config.max_position(), 15_000);
    }

    #[test]
    fn delay_sequence_decays_to_floor() {
        let profile = MotionProfile::default();
        let mut delay = profile.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..100 {
            delay = profile.next_delay(delay);
            seen.push(delay.as_millis());
        }

        assert_eq!(&seen[..4], &[900, 810, 729, 656]);
        assert!(seen.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(*seen.last().unwrap(), 5);
    }

    #[test]
    fn delay_never_below_floor() {
        let profile = MotionProfile::default();
        assert_eq!(profile.next_delay(Duration::from_millis(6)), Duration::from_millis(5));
        assert_eq!(profile.next_delay(Duration::from_millis(5)), Duration::from_millis(5));
        assert_eq!(profile.next_delay(Duration::from_millis(1)), Duration::from_millis(5));
    }

    #[test]
    fn invalid_profiles_rejected() {
        let zero_floor = MotionProfile { min_delay: Duration::ZERO, ..MotionProfile::default() };
        assert!(zero_floor.validate().is_err());

        let growing = MotionProfile { decay_factor: 1.5, ..MotionProfile::default() };
        assert!(growing.validate().is_err());

        assert!(MotionProfile::default().validate().is_ok());
    }
}
