use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, error::Error};
use tracing::{info, warn};

/// System-wide fallback location for `es_savestates.cfg`.
pub const SYSTEM_CONFIG_DIR: &str = "/usr/share/kazeta-plus";

/// Name of the emulator save-state profile file.
pub const PROFILE_CONFIG_FILE: &str = "es_savestates.cfg";

/// Returns the path to the user's data directory for Kazeta+.
/// This is a public helper function for other modules to use.
pub fn get_user_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|path| path.join(".local/share/kazeta-plus"))
}

/// Gets the full path to the savestates.toml configuration file.
fn get_config_path() -> Result<PathBuf, Box<dyn Error>> {
    let mut config_path = get_user_data_dir().ok_or("Could not find user's data directory.")?;
    fs::create_dir_all(&config_path)?; // Create the directory if it doesn't exist
    config_path.push("savestates.toml");
    Ok(config_path)
}

fn default_profile_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = get_user_data_dir() {
        paths.push(dir.join(PROFILE_CONFIG_FILE));
    }
    paths.push(Path::new(SYSTEM_CONFIG_DIR).join(PROFILE_CONFIG_FILE));
    paths
}

/// Global save-state settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Give each play session a fresh slot instead of overwriting the last one
    pub incremental_save_states: bool,
    /// Keep saving into the slot the game was started from
    pub incremental_save_states_use_current_slot: bool,
    /// Root of the per-library save directories
    pub saves_path: PathBuf,
    /// Where to look for `es_savestates.cfg`, first match wins
    pub profile_config_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            incremental_save_states: true,
            incremental_save_states_use_current_slot: false,
            saves_path: get_user_data_dir().unwrap_or_default().join("saves"),
            profile_config_paths: default_profile_config_paths(),
        }
    }
}

impl Config {
    /// Loads the configuration from savestates.toml, or returns a default if it fails.
    pub fn load() -> Self {
        match get_config_path() {
            Ok(config_path) => Self::load_from(&config_path),
            Err(_) => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => warn!("Ignoring malformed {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Saves the current configuration to savestates.toml.
    pub fn save(&self) {
        if let Ok(config_path) = get_config_path() {
            self.save_to(&config_path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Ok(toml_string) = toml::to_string_pretty(self) {
            if let Err(e) = fs::write(path, toml_string) {
                warn!("Failed to write {}: {}", path.display(), e);
            }
        }
    }

    pub fn delete() -> std::io::Result<()> {
        if let Ok(config_path) = get_config_path() {
            if config_path.exists() {
                info!("Deleting config file at: {}", config_path.display());
                std::fs::remove_file(config_path)?;
            }
        }
        Ok(())
    }
}
