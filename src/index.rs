//! Per-library index of save state files on disk.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::profile::{EmulatorProfile, ProfileRegistry};
use crate::save::SaveEntry;
use crate::types::{Game, Library, Platform, Slot};

/// Highest slot number considered when looking for a free slot.
pub const MAX_SLOT: u32 = 99999;

/// Stable handle to an entry: ROM stem plus position in that stem's list.
type Handle = (String, usize);

pub struct SaveStateIndex {
    library: Library,
    registry: Arc<ProfileRegistry>,
    profiles: Vec<Arc<EmulatorProfile>>,
    states: HashMap<String, Vec<SaveEntry>>,
    default_autosave: Option<SaveEntry>,
    default_new_game: SaveEntry,
    supports_slots: bool,
}

impl SaveStateIndex {
    /// Collects the profiles of every emulator the library uses and scans its
    /// save directory.
    pub fn new(library: Library, registry: Arc<ProfileRegistry>) -> Self {
        let mut profiles: Vec<Arc<EmulatorProfile>> = Vec::new();
        let mut default_autosave = None;
        let mut supports_slots = false;

        for emulator in &library.emulators {
            for profile in registry.profiles_for(emulator) {
                // lr-* cores all fold into the same profile
                if profiles.iter().any(|p| Arc::ptr_eq(p, &profile)) {
                    continue;
                }
                if profile.autosave {
                    default_autosave = Some(SaveEntry::request(Slot::Autosave).with_profile(profile.clone()));
                }
                supports_slots |= profile.slots;
                profiles.push(profile);
            }
        }

        let mut index = Self {
            library,
            registry,
            profiles,
            states: HashMap::new(),
            default_autosave,
            default_new_game: SaveEntry::request(Slot::ForceNewGame),
            supports_slots,
        };
        index.refresh();
        index
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn registry(&self) -> &Arc<ProfileRegistry> {
        &self.registry
    }

    pub fn profiles(&self) -> &[Arc<EmulatorProfile>] {
        &self.profiles
    }

    pub fn saves_path(&self) -> PathBuf {
        self.library.saves_path()
    }

    /// "Resume from autosave" request, if any emulator of the library autosaves.
    pub fn default_autosave(&self) -> Option<&SaveEntry> {
        self.default_autosave.as_ref()
    }

    /// "Start a new game" request.
    pub fn default_new_game(&self) -> &SaveEntry {
        &self.default_new_game
    }

    pub fn supports_autosave(&self) -> bool {
        self.default_autosave.is_some()
    }

    pub fn supports_slots(&self) -> bool {
        self.supports_slots
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Rescans the save directory from scratch.
    pub fn refresh(&mut self) {
        self.clear();

        let path = self.saves_path();
        if path.as_os_str().is_empty() || !path.is_dir() {
            return;
        }

        let files = match list_files(&path) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list save directory {}: {}", path.display(), e);
                return;
            }
        };

        // Every profile sees every file: an ambiguous name is indexed once per profile
        for profile in &self.profiles {
            for (name, file) in &files {
                let Some((rom, slot)) = profile.match_file(name) else {
                    continue;
                };

                if slot == Slot::Autosave && !profile.autosave {
                    continue;
                }

                let entry = SaveEntry::from_file(&rom, slot, file, profile.clone());
                self.states.entry(rom).or_default().push(entry);
            }
        }

        debug!(
            "Indexed {} save states for {} roms in {}",
            self.states.values().map(Vec::len).sum::<usize>(),
            self.states.len(),
            path.display()
        );
    }

    /// Whether save states can be used for this game at all.
    pub fn is_enabled(&self, game: &Game) -> bool {
        game.platform != Platform::ImageViewer
            && !self.profiles.is_empty()
            && !self.saves_path().as_os_str().is_empty()
    }

    fn owns(&self, game: &Game) -> bool {
        game.library == self.library.name
    }

    /// ROM stems the game's content hash is aliased to.
    fn alias_stems(&self, game: &Game, profile: Option<&Arc<EmulatorProfile>>) -> Vec<&str> {
        let Some(hash) = game.hash.as_deref().filter(|h| !h.is_empty()) else {
            return Vec::new();
        };

        self.profiles
            .iter()
            .filter(|p| profile.map_or(true, |wanted| Arc::ptr_eq(*p, wanted)))
            .filter_map(|p| p.hash_aliases.get(hash).map(String::as_str))
            .collect()
    }

    pub fn has_save_states(&self, game: &Game) -> bool {
        if self.states.is_empty() || !self.owns(game) {
            return false;
        }

        if self.states.contains_key(&game.stem()) {
            return true;
        }

        self.alias_stems(game, None)
            .into_iter()
            .any(|stem| self.states.contains_key(stem))
    }

    fn handles(&self, game: &Game, profile: Option<&Arc<EmulatorProfile>>) -> Vec<Handle> {
        let mut handles: Vec<Handle> = Vec::new();
        if !self.is_enabled(game) || !self.owns(game) {
            return handles;
        }

        let stem = game.stem();
        let mut stems = vec![stem.as_str()];
        stems.extend(self.alias_stems(game, profile));

        for stem in stems {
            let Some(entries) = self.states.get(stem) else {
                continue;
            };
            for (i, entry) in entries.iter().enumerate() {
                if profile.is_some_and(|p| !entry.is_same_profile(p)) {
                    continue;
                }
                let handle = (stem.to_string(), i);
                if !handles.contains(&handle) {
                    handles.push(handle);
                }
            }
        }

        handles
    }

    fn get(&self, (stem, i): &Handle) -> &SaveEntry {
        &self.states[stem][*i]
    }

    /// Save states of a game, optionally only those of one emulator profile.
    pub fn get_save_states(&self, game: &Game, profile: Option<&Arc<EmulatorProfile>>) -> Vec<SaveEntry> {
        self.handles(game, profile)
            .iter()
            .map(|h| self.get(h).clone())
            .collect()
    }

    /// Slot a new session should write to: one above the highest slot in use,
    /// or 0 if none is. `None` when save states are disabled for the game.
    pub fn next_free_slot(&self, game: &Game, request: &SaveEntry) -> Option<u32> {
        if !self.is_enabled(game) {
            return None;
        }

        let highest = self
            .handles(game, request.profile.as_ref())
            .iter()
            .filter_map(|h| self.get(h).slot.number())
            .filter(|n| *n <= MAX_SLOT)
            .max();

        Some(highest.map_or(0, |n| n + 1))
    }

    /// Closes gaps between numbered slots so they run 0, 1, 2... again.
    /// Autosave entries keep their file.
    pub fn renumber_slots(&mut self, game: &Game, request: &SaveEntry) {
        if !self.is_enabled(game) {
            return;
        }

        self.refresh();

        let mut handles = self.handles(game, request.profile.as_ref());
        handles.sort_by_key(|h| self.get(h).slot.index());

        let mut next = 0;
        for (stem, i) in handles {
            let Some(entry) = self.states.get_mut(&stem).and_then(|e| e.get_mut(i)) else {
                continue;
            };
            if entry.slot.number().is_none() {
                continue;
            }

            let target = Slot::Numbered(next);
            if entry.slot != target {
                match entry.copy_to_slot(target, true) {
                    Ok(()) => {
                        debug!("Moved {} to {}", entry.file_name(), entry.state_file_name(target));
                        entry.path = Some(entry.state_filename(target));
                        entry.slot = target;
                    }
                    Err(e) => warn!("Failed to renumber {}: {}", entry.file_name(), e),
                }
            }
            next += 1;
        }
    }
}

/// Visible, non-directory files of a directory, sorted by name.
fn list_files(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        files.push((name, entry.path()));
    }
    files.sort();
    Ok(files)
}
