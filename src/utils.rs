use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Removes the file extension from a filename string slice.
pub fn trim_extension(filename: &str) -> &str {
    if let Some(dot_index) = filename.rfind('.') {
        &filename[..dot_index]
    } else {
        filename
    }
}

/// File name of a path, lossily converted.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// ROM stem: the file name without its last extension.
pub fn file_stem(path: &Path) -> String {
    trim_extension(&file_name(path)).to_string()
}

/// Appends a suffix to the full file name (`a.state` -> `a.state.png`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

// Best-effort file primitives. Save bookkeeping must never stop a game from
// launching, so failures are logged and reported as `false`.

pub fn copy_file(from: &Path, to: &Path) -> bool {
    match fs::copy(from, to) {
        Ok(_) => true,
        Err(e) => {
            warn!("Failed to copy {} to {}: {}", from.display(), to.display(), e);
            false
        }
    }
}

pub fn rename_file(from: &Path, to: &Path) -> bool {
    match fs::rename(from, to) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to rename {} to {}: {}", from.display(), to.display(), e);
            false
        }
    }
}

/// Removes a file. A file that is already gone counts as removed.
pub fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn checksum(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
