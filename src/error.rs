use std::path::PathBuf;
use thiserror::Error;

use crate::types::Slot;

/// Errors from save file operations requested by the user.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Cannot copy a save into slot '{0}'")]
    InvalidSlot(Slot),

    #[error("Save file {0} does not exist")]
    MissingSource(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while reading `es_savestates.cfg`. Never fatal: the registry
/// falls back to its built-in profile.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse savestates config: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Savestates config is missing the <savestates> tag")]
    MissingRoot,
}
