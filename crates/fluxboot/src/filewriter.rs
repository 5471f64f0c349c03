//! Directory-scoped file writer for working-tree content.
//!
//! Files are written through a temp-then-rename sequence so a partially
//! written manifest is never visible under its final name; stale temp
//! files from an aborted run are cleared when a writer is initialized.

use std::path::{Path, PathBuf};

use thiserror::Error;

const TEMP_PREFIX: &str = ".fluxboot-tmp-";

#[derive(Error, Debug)]
pub enum FileWriterError {
    #[error("creating directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes files beneath a fixed root directory.
#[derive(Debug, Clone)]
pub struct FileWriter {
    dir: PathBuf,
}

impl FileWriter {
    /// Creates a writer rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a writer rooted at `subdir` beneath this writer's root.
    pub fn with_dir(&self, subdir: impl AsRef<Path>) -> Result<FileWriter, FileWriterError> {
        let dir = self.dir.join(subdir.as_ref());
        std::fs::create_dir_all(&dir).map_err(|source| FileWriterError::CreateDirectory {
            path: dir.clone(),
            source,
        })?;
        Ok(FileWriter { dir })
    }

    /// Removes temp files left behind by an interrupted run.
    pub fn clean_up_temp(&self) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(TEMP_PREFIX) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    /// Writes `content` to `name` under the root, atomically replacing any
    /// existing file.
    pub fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf, FileWriterError> {
        let final_path = self.dir.join(name);
        let temp_path = self.dir.join(format!("{TEMP_PREFIX}{name}"));

        std::fs::write(&temp_path, content).map_err(|source| FileWriterError::WriteFile {
            path: temp_path.clone(),
            source,
        })?;
        std::fs::rename(&temp_path, &final_path).map_err(|source| FileWriterError::WriteFile {
            path: final_path.clone(),
            source,
        })?;
        Ok(final_path)
    }
}
