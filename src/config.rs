use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::BoxwallError;

const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_TICK_HZ: u32 = 60;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub user_name: String,
    pub api_url: Option<String>,
    pub tick_hz: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_name: String::new(),
            api_url: None,
            tick_hz: DEFAULT_TICK_HZ,
        }
    }
}

impl AppConfig {
    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("boxwall").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::load_from(&config_path).ok()
        } else {
            None
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, BoxwallError> {
        let file =
            std::fs::File::open(path).map_err(|e| BoxwallError::ConfigIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| BoxwallError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), BoxwallError> {
        let config_path = dirs::config_dir()
            .ok_or(BoxwallError::NoConfigDir)?
            .join("boxwall")
            .join(CONFIG_FILE_NAME);
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), BoxwallError> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| BoxwallError::ConfigIOError { source: e })?;
        }

        let file =
            std::fs::File::create(path).map_err(|e| BoxwallError::ConfigIOError { source: e })?;
        serde_json::to_writer(file, self)
            .map_err(|e| BoxwallError::ConfigSerializeError { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = AppConfig {
            user_name: "Kam Ward".to_string(),
            api_url: Some("http://localhost:8000".to_string()),
            tick_hz: 30,
        };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.user_name, "Kam Ward");
        assert_eq!(loaded.api_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(loaded.tick_hz, 30);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load_from(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_default_tick_rate() {
        assert_eq!(AppConfig::default().tick_hz, 60);
    }
}
