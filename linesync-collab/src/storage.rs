//! Loading and saving a document as plain text lines.
//!
//! Lines are split the way a line reader does: each keeps its trailing
//! `\n`, and only the last may lack one. Saving writes the plain
//! concatenation, so a load followed by a save reproduces the file exactly.

use std::path::Path;

use crate::document::TERMINATOR;
use crate::protocol::{DELIMITER, END_OF_MESSAGE};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("{path}:{line} contains a protocol separator (U+001D or U+001E)")]
    ReservedChar { path: String, line: usize },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        let path = path.display().to_string();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Split text into lines that keep their terminators.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive(TERMINATOR).map(str::to_string).collect()
}

/// Read a file into lines.
///
/// Files containing [`DELIMITER`] or [`END_OF_MESSAGE`] are rejected; those
/// chars would split the document on the wire.
pub fn load_lines(path: impl AsRef<Path>) -> Result<Vec<String>, StorageError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    let lines = split_lines(&text);
    if let Some(idx) = lines
        .iter()
        .position(|l| l.contains([DELIMITER, END_OF_MESSAGE]))
    {
        return Err(StorageError::ReservedChar {
            path: path.display().to_string(),
            line: idx + 1,
        });
    }
    log::info!("Loaded {} lines from {}", lines.len(), path.display());
    Ok(lines)
}

/// Write lines to a file, replacing its contents.
pub fn save_lines(path: impl AsRef<Path>, lines: &[String]) -> Result<(), StorageError> {
    let path = path.as_ref();
    std::fs::write(path, lines.concat()).map_err(|e| StorageError::io(path, e))?;
    log::info!("Saved {} lines to {}", lines.len(), path.display());
    Ok(())
}
