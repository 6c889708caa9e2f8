//! Emulator save-state profiles, loaded from `es_savestates.cfg`.
//!
//! A profile tells us how one emulator names its save files and which save
//! features it has. The config looks like this:
//!
//! ```xml
//! <savestates>
//!   <emulator name="libretro" pattern="^(.*)\.state([0-9]*|.auto)$" features="autosave slots incremental">
//!     <rom hash="f2b..." name="Super Mario World (USA)" />
//!   </emulator>
//! </savestates>
//! ```

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ConfigError;
use crate::types::Slot;

pub const DEFAULT_EMULATOR: &str = "libretro";
pub const DEFAULT_PATTERN: &str = r"^(.*)\.state([0-9]*|.auto)$";

#[derive(Debug, Clone)]
pub struct EmulatorProfile {
    pub name: String,
    /// Pattern as written in the config
    pub pattern_source: String,
    pattern: Regex,
    pub autosave: bool,
    pub slots: bool,
    pub incremental: bool,
    /// Content hash -> ROM stem the emulator actually saved under
    pub hash_aliases: HashMap<String, String>,
}

impl EmulatorProfile {
    pub fn new(name: &str, pattern: &str) -> Result<Self, regex::Error> {
        // Anchor the whole expression so only complete file names match
        let anchored = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            name: name.to_string(),
            pattern_source: pattern.to_string(),
            pattern: anchored,
            autosave: false,
            slots: false,
            incremental: false,
            hash_aliases: HashMap::new(),
        })
    }

    /// The profile used when no config file defines any emulator.
    pub fn libretro_default() -> Self {
        let mut profile = Self::new(DEFAULT_EMULATOR, DEFAULT_PATTERN)
            .expect("built-in save pattern is valid");
        profile.autosave = true;
        profile.slots = true;
        profile.incremental = true;
        profile
    }

    /// Sets capability flags from a free text feature list. Substring
    /// matching, so "autosaves" or "noslots" also count.
    pub fn with_features(mut self, features: &str) -> Self {
        self.autosave = features.contains("autosave");
        self.slots = features.contains("slots");
        self.incremental = features.contains("incremental");
        self
    }

    pub fn with_alias(mut self, hash: &str, rom: &str) -> Self {
        self.hash_aliases.insert(hash.to_string(), rom.to_string());
        self
    }

    /// Matches a save file name, returning the ROM stem and slot it encodes.
    pub fn match_file(&self, file_name: &str) -> Option<(String, Slot)> {
        if self.pattern.captures_len() < 2 {
            return None;
        }

        let captures = self.pattern.captures(file_name)?;
        let rom = captures.get(1)?.as_str().to_string();
        let suffix = captures.get(2).map(|m| m.as_str()).unwrap_or("");

        match Slot::from_suffix(suffix) {
            Some(slot) => Some((rom, slot)),
            None => {
                warn!("{}: skipping {}, unusable slot suffix '{}'", self.name, file_name, suffix);
                None
            }
        }
    }
}

/// Parses an `es_savestates.cfg` document.
pub fn parse_profiles(xml: &str) -> Result<Vec<EmulatorProfile>, ConfigError> {
    let doc = roxmltree::Document::parse(xml)?;

    let root = doc.root_element();
    if !root.has_tag_name("savestates") {
        return Err(ConfigError::MissingRoot);
    }

    let mut profiles = Vec::new();
    for node in root.children().filter(|n| n.has_tag_name("emulator")) {
        let (Some(name), Some(pattern)) = (node.attribute("name"), node.attribute("pattern")) else {
            continue;
        };

        let mut profile = match EmulatorProfile::new(name, pattern) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Skipping emulator '{}': invalid pattern: {}", name, e);
                continue;
            }
        };

        if let Some(features) = node.attribute("features") {
            profile = profile.with_features(features);
        }

        for rom in node.children().filter(|n| n.has_tag_name("rom")) {
            if let (Some(hash), Some(rom_name)) = (rom.attribute("hash"), rom.attribute("name")) {
                profile = profile.with_alias(hash, rom_name);
            }
        }

        profiles.push(profile);
    }

    Ok(profiles)
}

/// Emulator names that share libretro's save naming.
fn canonical_emulator_name(emulator: &str) -> &str {
    if emulator == "angle" || emulator.starts_with("lr-") {
        DEFAULT_EMULATOR
    } else {
        emulator
    }
}

fn with_fallback(profiles: Vec<EmulatorProfile>) -> Vec<Arc<EmulatorProfile>> {
    if profiles.is_empty() {
        return vec![Arc::new(EmulatorProfile::libretro_default())];
    }
    profiles.into_iter().map(Arc::new).collect()
}

/// Loaded-once set of emulator profiles, shared by every save index.
#[derive(Debug)]
pub struct ProfileRegistry {
    search_paths: Vec<PathBuf>,
    profiles: OnceCell<Vec<Arc<EmulatorProfile>>>,
}

impl ProfileRegistry {
    /// A registry that reads the first existing file of `search_paths` on first use.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            profiles: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.profile_config_paths.clone())
    }

    pub fn from_profiles(profiles: Vec<EmulatorProfile>) -> Self {
        Self {
            search_paths: Vec::new(),
            profiles: OnceCell::with_value(with_fallback(profiles)),
        }
    }

    pub fn from_xml(xml: &str) -> Self {
        let profiles = parse_profiles(xml).unwrap_or_else(|e| {
            error!("{}", e);
            Vec::new()
        });
        Self::from_profiles(profiles)
    }

    /// All profiles, loading them first if needed.
    pub fn profiles(&self) -> &[Arc<EmulatorProfile>] {
        self.profiles.get_or_init(|| with_fallback(self.load()))
    }

    /// Profiles registered for an emulator, in config order.
    pub fn profiles_for(&self, emulator: &str) -> Vec<Arc<EmulatorProfile>> {
        let name = canonical_emulator_name(emulator);
        self.profiles()
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect()
    }

    fn load(&self) -> Vec<EmulatorProfile> {
        let Some(path) = self.search_paths.iter().find(|p| p.exists()) else {
            info!("No {} found, using built-in save state profile", crate::config::PROFILE_CONFIG_FILE);
            return Vec::new();
        };

        match load_file(path) {
            Ok(profiles) => {
                info!("Loaded {} save state profiles from {}", profiles.len(), path.display());
                profiles
            }
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        }
    }
}

fn load_file(path: &Path) -> Result<Vec<EmulatorProfile>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_profiles(&content)
}
