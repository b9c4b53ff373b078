use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

const INDEX_FILE: &str = "library.ron";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Display name, usually the uploaded file's original name.
    pub name: String,
    /// Name of the stored file inside the library directory.
    pub file_name: String,
    /// Seconds, as decoded at import time.
    pub duration: f64,
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("library index is unreadable: {0}")]
    IndexRead(#[from] ron::error::SpannedError),
    #[error("library index could not be written: {0}")]
    IndexWrite(#[from] ron::Error),
}

/// Local MIDI file store: raw `.mid` files in one directory plus a RON index
/// carrying their metadata, newest first.
pub struct MidiLibrary {
    root: PathBuf,
    entries: Vec<LibraryEntry>,
}

impl MidiLibrary {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let index_path = root.join(INDEX_FILE);
        let entries = if index_path.exists() {
            ron::from_str(&fs::read_to_string(&index_path)?)?
        } else {
            Vec::new()
        };

        Ok(Self { root, entries })
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn import(
        &mut self,
        name: &str,
        bytes: &[u8],
        duration: f64,
    ) -> Result<LibraryEntry, LibraryError> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let file_name = format!("{stamp}_{}", sanitize(name));
        fs::write(self.root.join(&file_name), bytes)?;

        let entry = LibraryEntry {
            name: name.to_string(),
            file_name,
            duration,
        };
        self.entries.insert(0, entry.clone());
        self.save_index()?;
        info!(name, "midi file imported");
        Ok(entry)
    }

    pub fn read(&self, entry: &LibraryEntry) -> Result<Vec<u8>, LibraryError> {
        Ok(fs::read(self.root.join(&entry.file_name))?)
    }

    pub fn remove(&mut self, index: usize) -> Result<(), LibraryError> {
        if index >= self.entries.len() {
            return Ok(());
        }
        let entry = self.entries.remove(index);
        self.save_index()?;

        if let Err(err) = fs::remove_file(self.root.join(&entry.file_name)) {
            warn!(%err, file = %entry.file_name, "stored file could not be deleted");
        }
        info!(name = %entry.name, "midi file removed");
        Ok(())
    }

    fn save_index(&self) -> Result<(), LibraryError> {
        let ron_string =
            ron::ser::to_string_pretty(&self.entries, ron::ser::PrettyConfig::default())?;
        fs::write(self.root.join(INDEX_FILE), ron_string)?;
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
