//! Tunables for the simulated collaborators and background processes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use proctor_core::model::{CheckKind, INCIDENT_TTL, ProctorSettings};

use crate::error::ConfigError;

/// Upper bound for incident delays and the incident TTL.
pub const MAX_INCIDENT_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Incident generator timing and odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub probability: f64,
    pub ttl_secs: u64,
    /// Fixed RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 20,
            max_delay_secs: 40,
            probability: 0.1,
            ttl_secs: INCIDENT_TTL.as_secs(),
            seed: None,
        }
    }
}

impl IncidentConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` for an empty or zero delay range, a probability
    /// outside `[0, 1]`, a zero TTL, or a delay or TTL longer than
    /// [`MAX_INCIDENT_INTERVAL_SECS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_secs > self.max_delay_secs {
            return Err(ConfigError::InvalidDelayRange {
                min: self.min_delay_secs,
                max: self.max_delay_secs,
            });
        }
        if self.max_delay_secs == 0 {
            return Err(ConfigError::ZeroDelay);
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ConfigError::InvalidProbability(self.probability));
        }
        if self.ttl_secs == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        for (field, secs) in [
            ("max_delay_secs", self.max_delay_secs),
            ("ttl_secs", self.ttl_secs),
        ] {
            if secs > MAX_INCIDENT_INTERVAL_SECS {
                return Err(ConfigError::TooLong {
                    field,
                    secs,
                    max: MAX_INCIDENT_INTERVAL_SECS,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Simulated device probe behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub camera_ms: u64,
    pub microphone_ms: u64,
    pub browser_ms: u64,
    pub environment_ms: u64,
    /// Checks that fail on their first attempt.
    pub fail: Vec<CheckKind>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            camera_ms: 1000,
            microphone_ms: 1200,
            browser_ms: 800,
            environment_ms: 1500,
            fail: Vec::new(),
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub fn latency(&self, kind: CheckKind) -> Duration {
        let ms = match kind {
            CheckKind::Camera => self.camera_ms,
            CheckKind::Microphone => self.microphone_ms,
            CheckKind::Browser => self.browser_ms,
            CheckKind::Environment => self.environment_ms,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub latency_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { latency_ms: 1000 }
    }
}

/// Everything the services layer reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub incidents: IncidentConfig,
    pub readiness: ReadinessConfig,
    pub auth: AuthConfig,
    pub settings: ProctorSettings,
}

impl ServicesConfig {
    /// # Errors
    ///
    /// Returns the first invalid section's `ConfigError`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.incidents.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ServicesConfig::default().validate().is_ok());
        assert_eq!(IncidentConfig::default().ttl(), Duration::from_secs(10));
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let config = IncidentConfig {
            min_delay_secs: 50,
            ..IncidentConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDelayRange { min: 50, max: 40 })
        );
    }

    #[test]
    fn probability_outside_unit_interval_is_rejected() {
        let config = IncidentConfig {
            probability: 1.5,
            ..IncidentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProbability(_))
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = IncidentConfig {
            ttl_secs: 0,
            ..IncidentConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTtl));
    }

    #[test]
    fn zero_delay_range_is_rejected() {
        let config = IncidentConfig {
            min_delay_secs: 0,
            max_delay_secs: 0,
            probability: 1.0,
            ..IncidentConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDelay));

        let from_zero = IncidentConfig {
            min_delay_secs: 0,
            ..IncidentConfig::default()
        };
        assert!(from_zero.validate().is_ok());
    }

    #[test]
    fn delays_and_ttl_beyond_a_day_are_rejected() {
        let ttl = IncidentConfig {
            ttl_secs: u64::MAX,
            ..IncidentConfig::default()
        };
        assert_eq!(
            ttl.validate(),
            Err(ConfigError::TooLong {
                field: "ttl_secs",
                secs: u64::MAX,
                max: MAX_INCIDENT_INTERVAL_SECS,
            })
        );

        let delay = IncidentConfig {
            max_delay_secs: MAX_INCIDENT_INTERVAL_SECS + 1,
            ..IncidentConfig::default()
        };
        assert!(matches!(
            delay.validate(),
            Err(ConfigError::TooLong {
                field: "max_delay_secs",
                ..
            })
        ));

        let at_limit = IncidentConfig {
            min_delay_secs: MAX_INCIDENT_INTERVAL_SECS,
            max_delay_secs: MAX_INCIDENT_INTERVAL_SECS,
            ttl_secs: MAX_INCIDENT_INTERVAL_SECS,
            ..IncidentConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn default_latencies_match_the_lobby() {
        let config = ReadinessConfig::default();
        assert_eq!(config.latency(CheckKind::Environment), Duration::from_millis(1500));
        assert_eq!(config.latency(CheckKind::Browser), Duration::from_millis(800));
    }
}
