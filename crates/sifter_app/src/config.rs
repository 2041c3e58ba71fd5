use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use sifter_engine::{BackendSettings, SifterSettings};

pub const CONFIG_FILE: &str = "sifter.ron";
pub const BACKEND_URL_ENV: &str = "SIFTER_BACKEND_URL";

/// Settings read from `sifter.ron`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub poll_interval_ms: u64,
    pub storage_key: String,
    pub channel: String,
    pub base_url: String,
    pub state_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let sifter = SifterSettings::default();
        Self {
            poll_interval_ms: sifter.poll_interval.as_millis() as u64,
            storage_key: sifter.storage_key,
            channel: sifter.channel,
            base_url: BackendSettings::default().base_url,
            state_dir: PathBuf::from("./sifter_state"),
        }
    }
}

impl AppConfig {
    /// Replaces the backend URL when the override is set and non-empty.
    pub fn with_backend_override(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
            engine_info!("Backend URL overridden by {}", BACKEND_URL_ENV);
            self.base_url = url.trim().to_string();
        }
        self
    }

    pub fn sifter_settings(&self) -> SifterSettings {
        SifterSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            storage_key: self.storage_key.clone(),
            channel: self.channel.clone(),
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.base_url.clone(),
        }
    }
}

/// Reads the config file; a missing or invalid file yields the defaults.
pub fn load_config(path: &Path) -> AppConfig {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return AppConfig::default();
        }
        Err(err) => {
            engine_warn!("Failed to read config from {:?}: {}", path, err);
            return AppConfig::default();
        }
    };

    match ron::from_str(&content) {
        Ok(config) => {
            engine_info!("Loaded config from {:?}", path);
            config
        }
        Err(err) => {
            engine_warn!("Failed to parse config from {:?}: {}", path, err);
            AppConfig::default()
        }
    }
}
