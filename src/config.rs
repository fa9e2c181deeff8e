use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::{DEFAULT_API_BASE, DEFAULT_SEND_TIMEOUT};
use crate::credentials::DEFAULT_CREDENTIALS_PATH;
use crate::frame::{Preprocessor, DEFAULT_BLUR_KERNEL};
use crate::ingest::DEFAULT_SOURCE;
use crate::motion::{MotionDetector, DEFAULT_MOTION_THRESHOLD_PX, DEFAULT_SENSITIVITY_CUTOFF};
use crate::sentinel::{SentinelSettings, DEFAULT_FRAME_INTERVAL};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SentinelConfigFile {
    source: Option<String>,
    credentials_path: Option<PathBuf>,
    detection: Option<DetectionConfigFile>,
    #[serde(rename = "loop")]
    cadence: Option<LoopConfigFile>,
    alert: Option<AlertConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    sensitivity_cutoff: Option<u8>,
    motion_threshold_px: Option<u64>,
    blur_kernel: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoopConfigFile {
    frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    api_base: Option<String>,
    timeout_ms: Option<u64>,
    audible_bell: Option<bool>,
}

/// Runtime configuration for `sentineld`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelConfig {
    pub source: String,
    pub credentials_path: PathBuf,
    pub detection: DetectionSettings,
    pub frame_interval: Duration,
    pub alert: AlertSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSettings {
    pub sensitivity_cutoff: u8,
    /// Absolute pixel count; retune when the camera resolution changes.
    pub motion_threshold_px: u64,
    pub blur_kernel: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    pub api_base: String,
    pub timeout: Duration,
    pub audible_bell: bool,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self::from_file(SentinelConfigFile::default())
    }
}

impl SentinelConfig {
    /// File named by `SENTINEL_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let path = std::env::var("SENTINEL_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let cadence = file.cadence.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            credentials_path: file
                .credentials_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH)),
            detection: DetectionSettings {
                sensitivity_cutoff: detection
                    .sensitivity_cutoff
                    .unwrap_or(DEFAULT_SENSITIVITY_CUTOFF),
                motion_threshold_px: detection
                    .motion_threshold_px
                    .unwrap_or(DEFAULT_MOTION_THRESHOLD_PX),
                blur_kernel: detection.blur_kernel.unwrap_or(DEFAULT_BLUR_KERNEL),
            },
            frame_interval: cadence
                .frame_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_FRAME_INTERVAL),
            alert: AlertSettings {
                api_base: alert
                    .api_base
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                timeout: alert
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_SEND_TIMEOUT),
                audible_bell: alert.audible_bell.unwrap_or(true),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_string("SENTINEL_SOURCE") {
            self.source = source;
        }
        if let Some(path) = env_string("SENTINEL_CREDENTIALS") {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(base) = env_string("SENTINEL_API_BASE") {
            self.alert.api_base = base;
        }
        if let Some(cutoff) = env_parse::<u8>("SENTINEL_SENSITIVITY_CUTOFF", "an integer 0-255")? {
            self.detection.sensitivity_cutoff = cutoff;
        }
        if let Some(threshold) =
            env_parse::<u64>("SENTINEL_MOTION_THRESHOLD_PX", "a pixel count")?
        {
            self.detection.motion_threshold_px = threshold;
        }
        if let Some(kernel) = env_parse::<u32>("SENTINEL_BLUR_KERNEL", "an odd integer")? {
            self.detection.blur_kernel = kernel;
        }
        if let Some(ms) =
            env_parse::<u64>("SENTINEL_FRAME_INTERVAL_MS", "an integer number of milliseconds")?
        {
            self.frame_interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(anyhow!("credentials_path must not be empty"));
        }
        Preprocessor::new(self.detection.blur_kernel)?;
        if self.frame_interval.is_zero() {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if self.alert.timeout.is_zero() {
            return Err(anyhow!("alert timeout must be greater than zero"));
        }
        let base = url::Url::parse(&self.alert.api_base)
            .map_err(|e| anyhow!("invalid alert api_base '{}': {}", self.alert.api_base, e))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("alert api_base '{}' cannot be a base url", base));
        }
        Ok(())
    }

    pub fn detector(&self) -> MotionDetector {
        MotionDetector::new(
            self.detection.sensitivity_cutoff,
            self.detection.motion_threshold_px,
        )
    }

    pub fn sentinel_settings(&self) -> Result<SentinelSettings> {
        Ok(SentinelSettings {
            frame_interval: self.frame_interval,
            preprocessor: Preprocessor::new(self.detection.blur_kernel)?,
            detector: self.detector(),
            audible_bell: self.alert.audible_bell,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {} (got '{}')", key, expected, raw)),
        None => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let cfg = SentinelConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.source, "/dev/video0");
        assert_eq!(cfg.credentials_path, PathBuf::from("telegram.properties"));
        assert_eq!(cfg.detection.sensitivity_cutoff, 25);
        assert_eq!(cfg.detection.motion_threshold_px, 5_000);
        assert_eq!(cfg.detection.blur_kernel, 21);
        assert_eq!(cfg.frame_interval, Duration::from_millis(50));
        assert_eq!(cfg.alert.api_base, "https://api.telegram.org");
        assert!(cfg.alert.audible_bell);
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = SentinelConfig::default();
        cfg.detection.blur_kernel = 4;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.frame_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.alert.api_base = "telegram".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_and_json_files_share_a_schema() -> Result<()> {
        let json: SentinelConfigFile =
            serde_json::from_str(r#"{"detection": {"motion_threshold_px": 20000}}"#)?;
        let toml: SentinelConfigFile = toml::from_str("[detection]\nmotion_threshold_px = 20000\n")?;
        assert_eq!(
            SentinelConfig::from_file(json).detection,
            SentinelConfig::from_file(toml).detection
        );
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<SentinelConfigFile>(r#"{"treshold": 1}"#).is_err());
    }
}
