use anyhow::{Context, Result};
use fleetos_shared::config::DownloadSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const API_URL_ENV: &str = "FLEETOS_API_URL";
pub const API_TOKEN_ENV: &str = "FLEETOS_API_TOKEN";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub api_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    pub log_level: String,
    #[serde(default)]
    pub trust_invalid_server_cert: bool,
    #[serde(default)]
    pub download: DownloadSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.fleetos.io".to_string(),
            api_token: None,
            log_level: "warn".to_string(),
            trust_invalid_server_cert: false,
            download: DownloadSettings::default(),
        }
    }
}

impl Config {
    /// Loads the user config, writing the defaults on first use, then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_file_path()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            debug!("Loading config from: {:?}", config_path);
            let contents =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        let config_dir = config_path
            .parent()
            .context("Failed to get config directory")?;

        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to: {:?}", config_path);
        Ok(())
    }

    pub fn clear() -> Result<()> {
        let config_path = Self::config_file_path()?;
        if config_path.exists() {
            std::fs::remove_file(&config_path).context("Failed to remove config file")?;
            info!("Removed config file: {:?}", config_path);
        }
        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("fleetos").join("config.json"))
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = var(API_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.api_token = Some(token);
        }
    }
}
