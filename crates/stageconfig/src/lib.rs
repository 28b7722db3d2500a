use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CURRENT_VERSION: u32 = 1;
pub const MAX_VIEWPORT_EDGE: u32 = 16_384;
pub const MAX_NOISE_SIZE: u32 = 4_096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StageConfig {
    pub version: u32,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub channels: Channels,
    #[serde(default)]
    pub gpu: Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Viewport {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Timing {
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(
        default = "default_fps_window",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fps_window: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Channels {
    #[serde(default)]
    pub texture_dir: Option<PathBuf>,
    #[serde(default = "default_noise_size")]
    pub noise_size: u32,
    #[serde(default)]
    pub noise_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Gpu {
    #[serde(default)]
    pub power: PowerMode,
    #[serde(default)]
    pub memory: MemoryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    #[default]
    Balanced,
    Performance,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            viewport: Viewport::default(),
            timing: Timing::default(),
            channels: Channels::default(),
            gpu: Gpu::default(),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            fps_window: default_fps_window(),
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            texture_dir: None,
            noise_size: default_noise_size(),
            noise_seed: None,
        }
    }
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    450
}

fn default_speed() -> f32 {
    1.0
}

fn default_fps_window() -> Duration {
    Duration::from_secs(1)
}

fn default_noise_size() -> u32 {
    256
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl StageConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: StageConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CURRENT_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CURRENT_VERSION}",
                self.version
            )));
        }

        let Viewport { width, height } = self.viewport;
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be non-empty, got {width}x{height}"
            )));
        }
        if width > MAX_VIEWPORT_EDGE || height > MAX_VIEWPORT_EDGE {
            return Err(ConfigError::Invalid(format!(
                "viewport {width}x{height} exceeds {MAX_VIEWPORT_EDGE} pixels per edge"
            )));
        }

        if !self.timing.speed.is_finite() || self.timing.speed < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "timing.speed must be a finite value >= 0, got {}",
                self.timing.speed
            )));
        }

        if self.timing.fps_window.is_zero() {
            return Err(ConfigError::Invalid(
                "timing.fps_window must be greater than zero".into(),
            ));
        }

        if self.channels.noise_size == 0 || self.channels.noise_size > MAX_NOISE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "channels.noise_size must be within 1..={MAX_NOISE_SIZE}, got {}",
                self.channels.noise_size
            )));
        }

        if let Some(dir) = &self.channels.texture_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "channels.texture_dir may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[viewport]
width = 1280
height = 720

[timing]
speed = 0.5
fps_window = "500ms"

[channels]
texture_dir = "/usr/share/shaderdeck/textures"
noise_size = 128
noise_seed = 7

[gpu]
power = "low"
memory = "performance"
"#;

    #[test]
    fn parses_sample_config() {
        let config = StageConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.viewport, Viewport { width: 1280, height: 720 });
        assert_eq!(config.timing.speed, 0.5);
        assert_eq!(config.timing.fps_window, Duration::from_millis(500));
        assert_eq!(config.channels.noise_size, 128);
        assert_eq!(config.channels.noise_seed, Some(7));
        assert_eq!(config.gpu.power, PowerMode::Low);
        assert_eq!(config.gpu.memory, MemoryMode::Performance);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = StageConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config, StageConfig::default());
        assert_eq!(config.timing.fps_window, Duration::from_secs(1));
    }

    #[test]
    fn numeric_durations_are_seconds() {
        let config = StageConfig::from_toml_str("version = 1\n[timing]\nfps_window = 2\n").unwrap();
        assert_eq!(config.timing.fps_window, Duration::from_secs(2));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = StageConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_viewport_and_negative_speed() {
        let err = StageConfig::from_toml_str("version = 1\n[viewport]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = StageConfig::from_toml_str("version = 1\n[timing]\nspeed = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err =
            StageConfig::from_toml_str("version = 1\n[timing]\nfps_window = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn serializes_back_to_equivalent_toml() {
        let config = StageConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(StageConfig::from_toml_str(&text).unwrap(), config);
    }
}
