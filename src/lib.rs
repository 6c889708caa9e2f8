//! Save state management for Kazeta+ emulator launches.
//!
//! Finds the save state files emulators leave in a library's save directory,
//! picks the slot each launch should use and keeps slot numbering compact.

pub mod config;
pub mod error;
pub mod index;
pub mod profile;
pub mod save;
pub mod session;
pub mod types;
pub mod utils;

pub use config::Config;
pub use error::{ConfigError, SaveError};
pub use index::SaveStateIndex;
pub use profile::{EmulatorProfile, ProfileRegistry};
pub use save::SaveEntry;
pub use session::{SaveSession, SessionState};
pub use types::{Game, Library, Platform, Slot};
