use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Periodic stats reporting configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReporterConfig {
    /// Interval, in milliseconds, between two stats snapshots.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Fraction of submissions rejected within one interval above which a warning is emitted.
    ///
    /// Must be within `[0.0, 1.0]`.
    #[serde(default = "default_rejection_rate_warn_threshold")]
    pub rejection_rate_warn_threshold: f64,
}

impl ReporterConfig {
    /// Default reporting interval: 1 second.
    pub const DEFAULT_INTERVAL_MS: u64 = 1_000;

    /// Default rejection rate warning threshold: 50%.
    pub const DEFAULT_REJECTION_RATE_WARN_THRESHOLD: f64 = 0.5;

    /// Returns the reporting interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_ms == 0 {
            return Err(ValidationError::invalid(
                "reporter.interval_ms",
                "must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.rejection_rate_warn_threshold) {
            return Err(ValidationError::invalid(
                "reporter.rejection_rate_warn_threshold",
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            rejection_rate_warn_threshold: default_rejection_rate_warn_threshold(),
        }
    }
}

fn default_interval_ms() -> u64 {
    ReporterConfig::DEFAULT_INTERVAL_MS
}

fn default_rejection_rate_warn_threshold() -> f64 {
    ReporterConfig::DEFAULT_REJECTION_RATE_WARN_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ReporterConfig::default().validate().is_ok());
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = ReporterConfig {
            rejection_rate_warn_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = ReporterConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
