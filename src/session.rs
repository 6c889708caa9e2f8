//! Save state bookkeeping around one play session.
//!
//! Before the emulator starts, [`SaveSession::build_launch_command`] picks the
//! slot the emulator should use and, when resuming a numbered save, swaps it
//! into the `.auto` file so the emulator loads it on boot. After the emulator
//! exits, [`SaveSession::on_session_end`] puts the original `.auto` back and
//! tidies up the slot numbering.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::index::SaveStateIndex;
use crate::save::{SaveEntry, BACKUP_SUFFIX, SCREENSHOT_SUFFIX};
use crate::types::{Game, Slot};
use crate::utils::{self, checksum, with_suffix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotLaunched,
    CommandBuilt,
    Reconciled,
}

#[derive(Debug)]
pub struct SaveSession {
    entry: SaveEntry,
    state: SessionState,
    auto_file: Option<PathBuf>,
    auto_image: Option<PathBuf>,
    new_slot_file: Option<PathBuf>,
    new_slot_checksum: Option<String>,
}

impl SaveSession {
    pub fn new(entry: SaveEntry) -> Self {
        Self {
            entry,
            state: SessionState::NotLaunched,
            auto_file: None,
            auto_image: None,
            new_slot_file: None,
            new_slot_checksum: None,
        }
    }

    pub fn entry(&self) -> &SaveEntry {
        &self.entry
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the arguments to append to the emulator command line. Empty
    /// means the emulator's own defaults apply.
    pub fn build_launch_command(&mut self, game: &Game, index: &SaveStateIndex, config: &Config) -> String {
        self.state = SessionState::CommandBuilt;

        if self.entry.profile.is_none() {
            self.entry.profile = index.registry().profiles_for(&game.emulator).into_iter().next();
        }
        if self.entry.rom.is_empty() {
            self.entry.rom = game.stem();
        }

        let incremental = self.entry.allows_incremental() && config.incremental_save_states;
        let autosave = self.entry.supports_autosave();

        // New sessions go to a fresh slot so an earlier save is never overwritten
        let Some(next_slot) = index.next_free_slot(game, &self.entry) else {
            debug!("Save states are disabled for {}", game.path.display());
            return String::new();
        };

        let slot = match self.entry.slot {
            Slot::Unset => {
                if incremental && !config.incremental_save_states_use_current_slot && next_slot > 0 {
                    return format!("-state_slot {}", next_slot);
                }
                return String::new();
            }
            slot => slot,
        };

        if !autosave {
            let state_slot = match slot.number() {
                Some(n) if !incremental => n,
                _ => next_slot,
            };
            let mut cmd = format!("-state_slot {}", state_slot);
            if let Some(source) = self.entry.existing_path() {
                cmd.push_str(&format!(" -state_filename \"{}\"", utils::file_name(source)));
            }
            return cmd;
        }

        let requested = match slot {
            Slot::Autosave => return format!("-autosave 1 -state_slot {}", next_slot),
            // Keep the emulator from loading its autosave even if it's on in its settings
            Slot::ForceNewGame => return format!("-autosave 0 -state_slot {}", next_slot),
            Slot::Numbered(n) => n,
            Slot::Unset => return String::new(),
        };

        let mut cmd = format!("-state_slot {}", if incremental { next_slot } else { requested });
        if self.entry.existing_path().is_some() {
            cmd.push_str(" -autosave 1");
        }

        self.stage_autosave(index, incremental, requested, next_slot);
        cmd
    }

    /// Moves the current `.auto` save aside and puts the requested save in
    /// its place, so the emulator resumes from it.
    fn stage_autosave(&mut self, index: &SaveStateIndex, incremental: bool, requested: u32, next_slot: u32) {
        let dir = index.saves_path();
        let auto_file = self.entry.state_filename_in(Slot::Autosave, &dir);
        let auto_image = with_suffix(&auto_file, SCREENSHOT_SUFFIX);

        for file in [&auto_file, &auto_image] {
            if file.exists() {
                let backup = with_suffix(file, BACKUP_SUFFIX);
                utils::remove_file(&backup);
                utils::rename_file(file, &backup);
            }
        }

        self.auto_file = Some(auto_file.clone());
        self.auto_image = Some(auto_image.clone());

        let Some(source) = self.entry.existing_path() else {
            return;
        };

        utils::copy_file(source, &auto_file);
        if let Some(screenshot) = self.entry.screenshot() {
            utils::copy_file(&screenshot, &auto_image);
        }

        if incremental && requested.checked_add(1) != Some(next_slot) {
            // Also offer the save in the new slot, so reloading it from the
            // emulator menu works. Deleted again if nothing gets saved there.
            let new_slot_file = self.entry.state_filename_in(Slot::Numbered(next_slot), &dir);
            utils::remove_file(&new_slot_file);
            if utils::copy_file(source, &new_slot_file) {
                match checksum(source) {
                    Ok(sum) => self.new_slot_checksum = Some(sum),
                    Err(e) => warn!("Failed to checksum {}: {}", source.display(), e),
                }
            }
            self.new_slot_file = Some(new_slot_file);
        }
    }

    /// Call once the emulator has exited.
    pub fn on_session_end(&mut self, game: &Game, index: &mut SaveStateIndex, config: &Config) {
        if !self.entry.is_slot_valid() || self.state != SessionState::CommandBuilt {
            return;
        }
        self.state = SessionState::Reconciled;

        if !self.entry.supports_autosave() {
            return;
        }

        if let (Some(file), Some(expected)) = (&self.new_slot_file, &self.new_slot_checksum) {
            if file.exists() && checksum(file).ok().as_ref() == Some(expected) {
                info!("Nothing was saved in {}, removing it", file.display());
                utils::remove_file(file);
            }
        }

        for file in [&self.auto_file, &self.auto_image].into_iter().flatten() {
            utils::remove_file(file);
            let backup = with_suffix(file, BACKUP_SUFFIX);
            if backup.exists() {
                utils::rename_file(&backup, file);
            }
        }

        if self.entry.allows_incremental() && config.incremental_save_states {
            index.renumber_slots(game, &self.entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileRegistry;
    use crate::types::Library;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const CONFIG: &str = r#"<savestates>
  <emulator name="libretro" pattern="^(.*)\.state([0-9]*|.auto)$" features="autosave slots incremental" />
  <emulator name="dolphin" pattern="^(.*)\.s([0-9]+)$" features="slots" />
  <emulator name="mednafen" pattern="^(.*)\.mc([0-9]+)$" features="slots incremental" />
</savestates>"#;

    struct Fixture {
        _temp: TempDir,
        dir: PathBuf,
        index: SaveStateIndex,
        config: Config,
        game: Game,
    }

    fn fixture(emulator: &str, files: &[&str], incremental: bool) -> Fixture {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("snes");
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), file.as_bytes()).unwrap();
        }

        let config = Config {
            incremental_save_states: incremental,
            incremental_save_states_use_current_slot: false,
            saves_path: temp.path().to_path_buf(),
            profile_config_paths: Vec::new(),
        };
        let library = Library::new("snes", &[emulator], &config.saves_path);
        let index = SaveStateIndex::new(library, Arc::new(ProfileRegistry::from_xml(CONFIG)));
        let game = Game::new("/roms/snes/mario.sfc", "snes", emulator);

        Fixture { _temp: temp, dir, index, config, game }
    }

    fn entry(f: &Fixture, slot: Slot) -> SaveEntry {
        f.index
            .get_save_states(&f.game, None)
            .into_iter()
            .find(|e| e.slot == slot)
            .unwrap()
    }

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn test_explicit_slot_with_autosave_backup() {
        let mut f = fixture("libretro", &["mario.state3", "mario.state.auto", "mario.state.auto.png"], false);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(3)));

        let cmd = session.build_launch_command(&f.game, &f.index, &f.config);
        assert_eq!(cmd, "-state_slot 3 -autosave 1");
        assert_eq!(read(&f.dir, "mario.state.auto.bak"), "mario.state.auto");
        assert_eq!(read(&f.dir, "mario.state.auto.png.bak"), "mario.state.auto.png");
        assert_eq!(read(&f.dir, "mario.state.auto"), "mario.state3");

        // The emulator autosaves over the staged file while running
        fs::write(f.dir.join("mario.state.auto"), "progress").unwrap();

        session.on_session_end(&f.game, &mut f.index, &f.config);
        assert_eq!(session.state(), SessionState::Reconciled);
        assert_eq!(read(&f.dir, "mario.state.auto"), "mario.state.auto");
        assert_eq!(read(&f.dir, "mario.state.auto.png"), "mario.state.auto.png");
        assert!(!f.dir.join("mario.state.auto.bak").exists());
        assert!(!f.dir.join("mario.state.auto.png.bak").exists());
    }

    #[test]
    fn test_unset_slot_protects_existing_saves() {
        let f = fixture("libretro", &["mario.state", "mario.state1"], true);
        let mut session = SaveSession::new(SaveEntry::request(Slot::Unset));
        assert_eq!(session.build_launch_command(&f.game, &f.index, &f.config), "-state_slot 2");

        let mut config = f.config.clone();
        config.incremental_save_states_use_current_slot = true;
        let mut session = SaveSession::new(SaveEntry::request(Slot::Unset));
        assert_eq!(session.build_launch_command(&f.game, &f.index, &config), "");

        let empty = fixture("libretro", &[], true);
        let mut session = SaveSession::new(SaveEntry::request(Slot::Unset));
        assert_eq!(session.build_launch_command(&empty.game, &empty.index, &empty.config), "");
    }

    #[test]
    fn test_autosave_and_new_game_requests() {
        let f = fixture("libretro", &["mario.state", "mario.state.auto"], true);

        let mut resume = SaveSession::new(f.index.default_autosave().unwrap().clone());
        assert_eq!(resume.build_launch_command(&f.game, &f.index, &f.config), "-autosave 1 -state_slot 1");

        let mut fresh = SaveSession::new(f.index.default_new_game().clone());
        assert_eq!(fresh.build_launch_command(&f.game, &f.index, &f.config), "-autosave 0 -state_slot 1");
        assert!(fresh.entry().profile.is_some());
    }

    #[test]
    fn test_emulator_without_autosave() {
        let f = fixture("dolphin", &["mario.s1", "mario.s4"], true);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(1)));

        // dolphin has no incremental feature, so the requested slot is kept
        let cmd = session.build_launch_command(&f.game, &f.index, &f.config);
        assert_eq!(cmd, "-state_slot 1 -state_filename \"mario.s1\"");
        assert_eq!(fs::read_dir(&f.dir).unwrap().count(), 2);

        // With incremental numbering the session moves on to the next free slot
        let f = fixture("mednafen", &["mario.mc1", "mario.mc4"], true);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(1)));
        let cmd = session.build_launch_command(&f.game, &f.index, &f.config);
        assert_eq!(cmd, "-state_slot 5 -state_filename \"mario.mc1\"");
        assert_eq!(fs::read_dir(&f.dir).unwrap().count(), 2);
    }

    #[test]
    fn test_highest_possible_slot_does_not_overflow() {
        let f = fixture("libretro", &["mario.state4294967295"], true);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(u32::MAX)));

        // Slots above the search ceiling don't count as taken
        let cmd = session.build_launch_command(&f.game, &f.index, &f.config);
        assert_eq!(cmd, "-state_slot 0 -autosave 1");
        assert_eq!(read(&f.dir, "mario.state"), "mario.state4294967295");
        assert_eq!(read(&f.dir, "mario.state.auto"), "mario.state4294967295");
    }

    #[test]
    fn test_unchanged_new_slot_copy_is_removed() {
        let mut f = fixture("libretro", &["mario.state", "mario.state1", "mario.state2"], true);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(0)));

        let cmd = session.build_launch_command(&f.game, &f.index, &f.config);
        assert_eq!(cmd, "-state_slot 3 -autosave 1");
        assert_eq!(read(&f.dir, "mario.state3"), "mario.state");

        session.on_session_end(&f.game, &mut f.index, &f.config);
        assert!(!f.dir.join("mario.state3").exists());
        assert!(!f.dir.join("mario.state.auto").exists());
        let slots: Vec<i64> = f.index.get_save_states(&f.game, None).iter().map(|e| e.slot.index()).collect();
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn test_new_slot_kept_and_renumbered_when_saved_into() {
        let mut f = fixture("libretro", &["mario.state", "mario.state2", "mario.state5"], true);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(2)));

        assert_eq!(session.build_launch_command(&f.game, &f.index, &f.config), "-state_slot 6 -autosave 1");
        fs::write(f.dir.join("mario.state6"), "new progress").unwrap();

        session.on_session_end(&f.game, &mut f.index, &f.config);
        assert_eq!(read(&f.dir, "mario.state"), "mario.state");
        assert_eq!(read(&f.dir, "mario.state1"), "mario.state2");
        assert_eq!(read(&f.dir, "mario.state2"), "mario.state5");
        assert_eq!(read(&f.dir, "mario.state3"), "new progress");
        assert!(!f.dir.join("mario.state6").exists());
    }

    #[test]
    fn test_no_copy_when_next_slot_follows_source() {
        let f = fixture("libretro", &["mario.state", "mario.state1"], true);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(1)));

        assert_eq!(session.build_launch_command(&f.game, &f.index, &f.config), "-state_slot 2 -autosave 1");
        assert!(!f.dir.join("mario.state2").exists());
    }

    #[test]
    fn test_disabled_game_gets_no_arguments() {
        let f = fixture("libretro", &["mario.state"], true);
        let viewer = f.game.clone().with_platform(crate::types::Platform::ImageViewer);
        let mut session = SaveSession::new(entry(&f, Slot::Numbered(0)));
        assert_eq!(session.build_launch_command(&viewer, &f.index, &f.config), "");
    }

    #[test]
    fn test_session_end_without_slot_is_noop() {
        let mut f = fixture("libretro", &["mario.state", "mario.state3"], true);
        let mut session = SaveSession::new(SaveEntry::request(Slot::Unset));
        session.build_launch_command(&f.game, &f.index, &f.config);
        session.on_session_end(&f.game, &mut f.index, &f.config);

        assert_eq!(session.state(), SessionState::CommandBuilt);
        assert!(f.dir.join("mario.state3").exists());
    }
}
