use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use proctor_core::model::ProctorSettings;
use services::{AuthConfig, IncidentConfig, ReadinessConfig, ServicesConfig};

pub const DEFAULT_CONFIG_FILE: &str = "proctor.toml";
pub const ENV_PREFIX: &str = "PROCTOR_";

/// Everything the binary reads from `proctor.toml` and `PROCTOR_*` variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub log_level: String,
    pub incidents: IncidentConfig,
    pub readiness: ReadinessConfig,
    pub settings: ProctorSettings,
    pub auth: AuthConfig,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            incidents: IncidentConfig::default(),
            readiness: ReadinessConfig::default(),
            settings: ProctorSettings::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ProctorConfig {
    #[must_use]
    pub fn services(&self) -> ServicesConfig {
        ServicesConfig {
            incidents: self.incidents.clone(),
            readiness: self.readiness.clone(),
            auth: self.auth.clone(),
            settings: self.settings,
        }
    }
}

/// Defaults, then the TOML file, then `PROCTOR_` environment variables.
///
/// Nested keys use `__` in variable names, e.g. `PROCTOR_INCIDENTS__SEED=7`.
///
/// # Errors
///
/// Returns `figment::Error` if a source cannot be parsed into `ProctorConfig`.
pub fn load(path: Option<&Path>) -> Result<ProctorConfig, figment::Error> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(ProctorConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use proctor_core::model::CheckKind;

    #[test]
    fn defaults_apply_without_any_source() {
        Jail::expect_with(|_jail| {
            let config = load(None)?;
            assert_eq!(config, ProctorConfig::default());
            assert!(config.services().validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                    log_level = "debug"

                    [incidents]
                    min_delay_secs = 5
                    max_delay_secs = 6
                    probability = 0.5

                    [readiness]
                    fail = ["microphone"]

                    [settings]
                    recording = false
                "#,
            )?;
            jail.set_env("PROCTOR_INCIDENTS__SEED", "42");
            jail.set_env("PROCTOR_AUTH__LATENCY_MS", "0");

            let config = load(None)?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.incidents.min_delay_secs, 5);
            assert_eq!(config.incidents.probability, 0.5);
            assert_eq!(config.incidents.seed, Some(42));
            assert_eq!(config.incidents.ttl_secs, 10);
            assert_eq!(config.readiness.fail, vec![CheckKind::Microphone]);
            assert_eq!(config.readiness.camera_ms, 1000);
            assert!(!config.settings.recording);
            assert!(config.settings.facial_recognition);
            assert_eq!(config.auth.latency_ms, 0);
            Ok(())
        });
    }

    #[test]
    fn explicit_path_is_read() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[incidents]\nttl_secs = 0\n")?;
            let config = load(Some(Path::new("custom.toml")))?;
            assert!(config.services().validate().is_err());
            Ok(())
        });
    }
}
