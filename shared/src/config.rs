use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{DetectorOptions, RecordingInterval};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub capture: CaptureConfig,
    pub video: VideoConfig,
    pub detector: DetectorConfig,
    pub ui: UiConfig,
    pub ipc: IpcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interval: RecordingInterval,
    pub jpeg_quality: u8,
    /// Grace period before refreshing sample counts after a session stops.
    pub refresh_delay_ms: u64,
    pub category: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Directory of still images replayed as the video feed.
    pub frames_dir: PathBuf,
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub options: DetectorOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub notice_seconds: u64,
    /// Where the annotated preview is written, if anywhere.
    pub preview_path: Option<PathBuf>,
    /// Write the preview every this many frames.
    pub preview_every: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: RecordingInterval::OneSecond,
            jpeg_quality: 90,
            refresh_delay_ms: 2000,
            category: "vocales".to_string(),
            label: "A".to_string(),
            width: 800,
            height: 600,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            fps: 30,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("python3"),
            args: vec!["hand_detect.py".to_string()],
            options: DetectorOptions::default(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            notice_seconds: 5,
            preview_path: None,
            preview_every: 15,
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/hand-capture.sock"),
            timeout_seconds: 30,
        }
    }
}

impl Config {
    /// `<config dir>/hand-capture/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hand-capture").join("config.toml"))
    }

    /// Loads the config from the default location, or returns the defaults if there is no file.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        info!("Loading config from {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            base_url = "http://10.0.0.5:9000"

            [capture]
            interval = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.capture.interval, RecordingInterval::TwoSeconds);
        assert_eq!(config.capture.jpeg_quality, 90);
        assert_eq!(config.ui.notice_seconds, 5);
    }

    #[test]
    fn unsupported_interval_is_rejected() {
        let parsed: Result<Config, _> = toml::from_str("[capture]\ninterval = 1500\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.capture.label = "E".to_string();

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.capture.label, "E");
    }
}
