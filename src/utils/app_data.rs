use crate::tables::LineContextMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "spantab";
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the app data directory
pub const HOME_ENV: &str = "SPANTAB_HOME";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// zstd level used when optimizing columns
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Expand every segment as soon as a table is loaded
    #[serde(default)]
    pub eager_expand: bool,

    /// Expand segments on the rayon pool when expanding eagerly
    #[serde(default = "default_parallel_expand")]
    pub parallel_expand: bool,

    /// How line context travels with reference tables
    #[serde(default)]
    pub line_context_mode: LineContextMode,
}

fn default_compression_level() -> i32 {
    3
}

fn default_parallel_expand() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            eager_expand: false,
            parallel_expand: default_parallel_expand(),
            line_context_mode: LineContextMode::default(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load config from an explicit file, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let app_dir = match std::env::var_os(HOME_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base = if cfg!(target_os = "macos") {
                dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
            } else if cfg!(target_os = "windows") {
                dirs::data_local_dir()
            } else {
                // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
                dirs::data_dir()
            };

            base.context("Could not determine app data directory")?
                .join(APP_NAME)
        }
    };

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}
