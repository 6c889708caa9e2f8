use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SaveError;
use crate::profile::EmulatorProfile;
use crate::types::Slot;
use crate::utils::{file_name, with_suffix};

pub const SCREENSHOT_SUFFIX: &str = ".png";
pub const BACKUP_SUFFIX: &str = ".bak";

/// One save state file, or a request for a slot that has no file yet.
#[derive(Debug, Clone)]
pub struct SaveEntry {
    pub rom: String,
    pub profile: Option<Arc<EmulatorProfile>>,
    pub path: Option<PathBuf>,
    pub slot: Slot,
    pub modified: Option<DateTime<Local>>,
}

impl SaveEntry {
    /// A synthetic entry describing the slot a launch should use.
    pub fn request(slot: Slot) -> Self {
        Self {
            rom: String::new(),
            profile: None,
            path: None,
            slot,
            modified: None,
        }
    }

    pub fn with_profile(mut self, profile: Arc<EmulatorProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Builds an entry for a file found on disk.
    pub fn from_file(rom: &str, slot: Slot, path: &Path, profile: Arc<EmulatorProfile>) -> Self {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from);

        Self {
            rom: rom.to_string(),
            profile: Some(profile),
            path: Some(path.to_path_buf()),
            slot,
            modified,
        }
    }

    pub fn is_slot_valid(&self) -> bool {
        self.slot.is_valid()
    }

    pub fn supports_autosave(&self) -> bool {
        self.profile.as_ref().is_some_and(|p| p.autosave)
    }

    /// Incremental numbering is allowed unless a profile says otherwise.
    pub fn allows_incremental(&self) -> bool {
        self.profile.as_ref().map_or(true, |p| p.incremental)
    }

    pub fn is_same_profile(&self, profile: &Arc<EmulatorProfile>) -> bool {
        self.profile.as_ref().is_some_and(|p| Arc::ptr_eq(p, profile))
    }

    /// Path of the save file, only if it is really on disk.
    pub fn existing_path(&self) -> Option<&Path> {
        self.path.as_deref().filter(|p| p.exists())
    }

    /// `<file>.png`, if the emulator wrote a screenshot for this save.
    pub fn screenshot(&self) -> Option<PathBuf> {
        let path = self.path.as_deref()?;
        let screenshot = with_suffix(path, SCREENSHOT_SUFFIX);
        screenshot.exists().then_some(screenshot)
    }

    /// File name for `slot` of this entry's ROM, without a directory.
    pub fn state_file_name(&self, slot: Slot) -> String {
        format!("{}.state{}", self.rom, slot.suffix())
    }

    /// Full path for `slot`, next to this entry's file (or in `fallback_dir`
    /// for entries without one).
    pub fn state_filename_in(&self, slot: Slot, fallback_dir: &Path) -> PathBuf {
        let dir = self
            .path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(fallback_dir);
        dir.join(self.state_file_name(slot))
    }

    pub fn state_filename(&self, slot: Slot) -> PathBuf {
        self.state_filename_in(slot, Path::new(""))
    }

    /// Deletes the save file and its screenshot. Unset entries are left alone.
    pub fn remove(&self) -> Result<(), SaveError> {
        if !self.is_slot_valid() {
            return Ok(());
        }

        let screenshot = self.screenshot();
        if let Some(path) = &self.path {
            remove_existing(path)?;
        }
        if let Some(screenshot) = screenshot {
            remove_existing(&screenshot)?;
        }
        Ok(())
    }

    /// Copies (or moves) this save and its screenshot into another numbered slot.
    pub fn copy_to_slot(&self, slot: Slot, move_file: bool) -> Result<(), SaveError> {
        if slot.number().is_none() {
            return Err(SaveError::InvalidSlot(slot));
        }

        let source = match self.existing_path() {
            Some(path) => path,
            None => {
                return Err(SaveError::MissingSource(self.path.clone().unwrap_or_default()));
            }
        };

        let dest = self.state_filename(slot);
        let screenshot = self.screenshot();

        transfer(source, &dest, move_file)?;
        if let Some(screenshot) = screenshot {
            transfer(&screenshot, &with_suffix(&dest, SCREENSHOT_SUFFIX), move_file)?;
        }
        Ok(())
    }

    /// Short label for listings, e.g. `slot 3` or `autosave`.
    pub fn label(&self) -> String {
        match self.slot {
            Slot::Autosave => "autosave".to_string(),
            Slot::Numbered(n) => format!("slot {}", n),
            other => other.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path.as_deref().map(file_name).unwrap_or_default()
    }
}

fn remove_existing(path: &Path) -> Result<(), SaveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SaveError::Io { path: path.to_path_buf(), source }),
    }
}

fn transfer(from: &Path, to: &Path, move_file: bool) -> Result<(), SaveError> {
    let result = if move_file {
        fs::rename(from, to)
    } else {
        fs::copy(from, to).map(|_| ())
    };
    result.map_err(|source| SaveError::Io { path: from.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry_at(dir: &Path, name: &str, slot: Slot) -> SaveEntry {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        SaveEntry::from_file("mario", slot, &path, Arc::new(EmulatorProfile::libretro_default()))
    }

    #[test]
    fn test_state_filenames() {
        let temp = tempdir().unwrap();
        let entry = entry_at(temp.path(), "mario.state3", Slot::Numbered(3));

        assert_eq!(entry.state_filename(Slot::Numbered(0)), temp.path().join("mario.state"));
        assert_eq!(entry.state_filename(Slot::Numbered(12)), temp.path().join("mario.state12"));
        assert_eq!(entry.state_filename(Slot::Autosave), temp.path().join("mario.state.auto"));
        assert!(entry.modified.is_some());
    }

    #[test]
    fn test_screenshot_only_when_present() {
        let temp = tempdir().unwrap();
        let entry = entry_at(temp.path(), "mario.state", Slot::Numbered(0));
        assert_eq!(entry.screenshot(), None);

        fs::write(temp.path().join("mario.state.png"), b"png").unwrap();
        assert_eq!(entry.screenshot(), Some(temp.path().join("mario.state.png")));
    }

    #[test]
    fn test_copy_to_invalid_slot_does_nothing() {
        let temp = tempdir().unwrap();
        let entry = entry_at(temp.path(), "mario.state2", Slot::Numbered(2));

        assert!(matches!(entry.copy_to_slot(Slot::Autosave, false), Err(SaveError::InvalidSlot(_))));
        assert!(entry.copy_to_slot(Slot::ForceNewGame, true).is_err());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_and_move_with_screenshot() {
        let temp = tempdir().unwrap();
        let entry = entry_at(temp.path(), "mario.state2", Slot::Numbered(2));
        fs::write(temp.path().join("mario.state2.png"), b"png").unwrap();

        entry.copy_to_slot(Slot::Numbered(5), false).unwrap();
        assert!(temp.path().join("mario.state2").exists());
        assert!(temp.path().join("mario.state5").exists());
        assert!(temp.path().join("mario.state5.png").exists());

        entry.copy_to_slot(Slot::Numbered(0), true).unwrap();
        assert!(!temp.path().join("mario.state2").exists());
        assert!(!temp.path().join("mario.state2.png").exists());
        assert_eq!(fs::read(temp.path().join("mario.state")).unwrap(), b"mario.state2");
        assert!(temp.path().join("mario.state.png").exists());
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let temp = tempdir().unwrap();
        let entry = entry_at(temp.path(), "mario.state1", Slot::Numbered(1));
        fs::remove_file(temp.path().join("mario.state1")).unwrap();

        assert!(matches!(entry.copy_to_slot(Slot::Numbered(4), false), Err(SaveError::MissingSource(_))));
        assert!(!temp.path().join("mario.state4").exists());
    }

    #[test]
    fn test_remove() {
        let temp = tempdir().unwrap();
        let entry = entry_at(temp.path(), "mario.state1", Slot::Numbered(1));
        fs::write(temp.path().join("mario.state1.png"), b"png").unwrap();

        entry.remove().unwrap();
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);

        // Requests without a slot never touch the disk
        SaveEntry::request(Slot::Unset).remove().unwrap();
    }
}
