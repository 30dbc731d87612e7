use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Settings for the whole scraper, loaded from a JSON file. A missing or
/// malformed file is fatal at startup: without it there is nothing to scrape.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub websites: BTreeMap<String, WebsiteConfig>,
    #[serde(default)]
    pub scraping: ScrapingSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsiteConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingSettings {
    pub request_timeout_secs: u64,
    pub delay_between_requests_secs: u64,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        ScrapingSettings {
            request_timeout_secs: 30,
            delay_between_requests_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            directory: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("configuration file {}: {}", path.display(), e))?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| format!("error parsing configuration: {}", e))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("OUTPUT_DIR") {
            self.output.directory = PathBuf::from(dir);
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.scraping.request_timeout_secs = secs;
            }
        }
    }

    pub fn website(&self, key: &str) -> Result<&WebsiteConfig, Box<dyn Error>> {
        self.websites
            .get(key)
            .ok_or_else(|| format!("website '{}' not found in configuration", key).into())
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.websites.get(key).map_or(false, |w| w.enabled)
    }

    pub fn enabled_websites(&self) -> impl Iterator<Item = (&String, &WebsiteConfig)> {
        self.websites.iter().filter(|(_, w)| w.enabled)
    }
}
