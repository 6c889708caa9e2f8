use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::utils::file_stem;

// ===================================
// ENUMS
// ===================================

/// Which save slot a launch should use or a file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Slot {
    /// No slot requested, the emulator picks its own defaults
    #[default]
    Unset,
    /// The `.auto` file the emulator keeps overwriting during play
    Autosave,
    /// Start fresh and keep the emulator from loading its autosave
    ForceNewGame,
    Numbered(u32),
}

impl Slot {
    /// Legacy integer form: `-99` unset, `-1` autosave, `-2` new game.
    pub fn index(&self) -> i64 {
        match self {
            Self::Unset => -99,
            Self::Autosave => -1,
            Self::ForceNewGame => -2,
            Self::Numbered(n) => i64::from(*n),
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::Unset
    }

    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Numbered(n) => Some(*n),
            _ => None,
        }
    }

    /// Decodes the suffix captured after `.state` in a save file name.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" => Some(Self::Numbered(0)),
            ".auto" => Some(Self::Autosave),
            digits if digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits.parse().ok().map(Self::Numbered)
            }
            _ => None,
        }
    }

    /// Suffix appended to `<rom>.state` for this slot.
    pub fn suffix(&self) -> String {
        match self {
            Self::Numbered(0) => String::new(),
            Self::Numbered(n) => n.to_string(),
            _ => ".auto".to_string(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "none"),
            Self::Autosave => write!(f, "auto"),
            Self::ForceNewGame => write!(f, "new"),
            Self::Numbered(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "-1" => Ok(Self::Autosave),
            "new" | "-2" => Ok(Self::ForceNewGame),
            "none" | "-99" => Ok(Self::Unset),
            other => other
                .parse::<u32>()
                .map(Self::Numbered)
                .map_err(|_| format!("invalid slot '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Console,
    Arcade,
    Computer,
    /// Picture/media browsing "system", never has save states
    ImageViewer,
}

// ===================================
// STRUCTS
// ===================================

/// A game as the launcher knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub path: PathBuf,
    /// Name of the library (system) the game belongs to
    pub library: String,
    pub platform: Platform,
    /// Emulator the game is launched with
    pub emulator: String,
    /// Content hash from the achievements metadata, if scraped
    pub hash: Option<String>,
}

impl Game {
    pub fn new(path: impl Into<PathBuf>, library: &str, emulator: &str) -> Self {
        Self {
            path: path.into(),
            library: library.to_string(),
            platform: Platform::default(),
            emulator: emulator.to_string(),
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: &str) -> Self {
        self.hash = Some(hash.to_string());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

/// A game library (one system), with the emulators it can launch.
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    pub name: String,
    pub emulators: Vec<String>,
    pub saves_root: PathBuf,
}

impl Library {
    pub fn new(name: &str, emulators: &[&str], saves_root: &Path) -> Self {
        Self {
            name: name.to_string(),
            emulators: emulators.iter().map(|e| e.to_string()).collect(),
            saves_root: saves_root.to_path_buf(),
        }
    }

    /// Directory holding this library's save files.
    pub fn saves_path(&self) -> PathBuf {
        if self.saves_root.as_os_str().is_empty() {
            return PathBuf::new();
        }
        self.saves_root.join(&self.name)
    }
}
