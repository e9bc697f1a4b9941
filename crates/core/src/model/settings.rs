use serde::{Deserialize, Serialize};
use std::fmt;

/// One named proctoring toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProctorSetting {
    FacialRecognition,
    EnvironmentScan,
    BrowserLock,
    AiMonitoring,
    Recording,
}

impl ProctorSetting {
    pub const ALL: [ProctorSetting; 5] = [
        ProctorSetting::FacialRecognition,
        ProctorSetting::EnvironmentScan,
        ProctorSetting::BrowserLock,
        ProctorSetting::AiMonitoring,
        ProctorSetting::Recording,
    ];
}

impl fmt::Display for ProctorSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProctorSetting::FacialRecognition => "facial recognition",
            ProctorSetting::EnvironmentScan => "environment scan",
            ProctorSetting::BrowserLock => "browser lock",
            ProctorSetting::AiMonitoring => "AI monitoring",
            ProctorSetting::Recording => "recording",
        };
        f.write_str(label)
    }
}

/// Process-wide proctoring toggles. Everything is enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorSettings {
    pub facial_recognition: bool,
    pub environment_scan: bool,
    pub browser_lock: bool,
    pub ai_monitoring: bool,
    pub recording: bool,
}

impl Default for ProctorSettings {
    fn default() -> Self {
        Self {
            facial_recognition: true,
            environment_scan: true,
            browser_lock: true,
            ai_monitoring: true,
            recording: true,
        }
    }
}

impl ProctorSettings {
    #[must_use]
    pub fn is_enabled(&self, setting: ProctorSetting) -> bool {
        match setting {
            ProctorSetting::FacialRecognition => self.facial_recognition,
            ProctorSetting::EnvironmentScan => self.environment_scan,
            ProctorSetting::BrowserLock => self.browser_lock,
            ProctorSetting::AiMonitoring => self.ai_monitoring,
            ProctorSetting::Recording => self.recording,
        }
    }

    /// Flip one toggle and return its new value.
    pub fn toggle(&mut self, setting: ProctorSetting) -> bool {
        let slot = match setting {
            ProctorSetting::FacialRecognition => &mut self.facial_recognition,
            ProctorSetting::EnvironmentScan => &mut self.environment_scan,
            ProctorSetting::BrowserLock => &mut self.browser_lock,
            ProctorSetting::AiMonitoring => &mut self.ai_monitoring,
            ProctorSetting::Recording => &mut self.recording,
        };
        *slot = !*slot;
        *slot
    }
}
