use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::COMPLETION_FILE_VERSION;
use crate::registry::PuzzleRegistry;
use crate::types::PuzzleKey;

/// Set of puzzles that have been solved. Persisting it is the owner's job.
pub trait CompletionStore {
    fn contains(&self, key: PuzzleKey) -> bool;

    /// Returns `false` when `key` was already recorded.
    fn add(&mut self, key: PuzzleKey) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryCompletionStore {
    completed: BTreeSet<PuzzleKey>,
}

impl CompletionStore for MemoryCompletionStore {
    fn contains(&self, key: PuzzleKey) -> bool {
        self.completed.contains(&key)
    }

    fn add(&mut self, key: PuzzleKey) -> bool {
        self.completed.insert(key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredCompletion {
    name: String,
    #[serde(rename = "completedAt", alias = "completed_at")]
    completed_at: String,
}

#[derive(Clone, Debug, Serialize)]
struct CompletionFile<'a> {
    version: u8,
    completed: &'a BTreeMap<String, StoredCompletion>,
}

#[derive(Clone, Debug, Deserialize)]
struct CompletionFileRaw {
    version: u8,
    completed: BTreeMap<String, serde_json::Value>,
}

/// JSON-file backed store. Entries for puzzles the registry does not know
/// are kept so they survive a save.
pub struct FileCompletionStore {
    file_path: PathBuf,
    registry: PuzzleRegistry,
    completed: BTreeMap<String, StoredCompletion>,
}

impl FileCompletionStore {
    pub fn open(file_path: PathBuf, registry: &PuzzleRegistry) -> Self {
        let completed = load_completed(&file_path);
        Self {
            file_path,
            registry: registry.clone(),
            completed,
        }
    }

    pub fn completed_names(&self) -> Vec<String> {
        self.completed
            .values()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn completed_at(&self, key: PuzzleKey) -> Option<&str> {
        let name = self.registry.name_of(key)?;
        self.completed
            .get(&completion_key(name))
            .map(|entry| entry.completed_at.as_str())
    }

    fn save(&self) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                log::warn!(
                    "[completion-store] failed to create parent dir {}: {error}",
                    parent.display()
                );
                return;
            }
        }

        let payload = CompletionFile {
            version: COMPLETION_FILE_VERSION,
            completed: &self.completed,
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(&self.file_path, text) {
                    log::warn!(
                        "[completion-store] failed to write {}: {error}",
                        self.file_path.display()
                    );
                }
            }
            Err(error) => {
                log::warn!(
                    "[completion-store] failed to serialize payload for {}: {error}",
                    self.file_path.display()
                );
            }
        }
    }
}

impl CompletionStore for FileCompletionStore {
    fn contains(&self, key: PuzzleKey) -> bool {
        self.registry
            .name_of(key)
            .is_some_and(|name| self.completed.contains_key(&completion_key(name)))
    }

    fn add(&mut self, key: PuzzleKey) -> bool {
        let Some(name) = self.registry.name_of(key) else {
            log::warn!("[completion-store] ignoring unregistered puzzle key {key:?}");
            return false;
        };
        let entry_key = completion_key(name);
        if entry_key.is_empty() || self.completed.contains_key(&entry_key) {
            return false;
        }
        self.completed.insert(
            entry_key,
            StoredCompletion {
                name: name.to_string(),
                completed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        );
        self.save();
        true
    }
}

fn load_completed(path: &Path) -> BTreeMap<String, StoredCompletion> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[completion-store] failed to read {}: {error}", path.display());
            }
            return BTreeMap::new();
        }
    };
    let parsed = match serde_json::from_str::<CompletionFileRaw>(&text) {
        Ok(value) if value.version == COMPLETION_FILE_VERSION => value,
        Ok(value) => {
            log::warn!(
                "[completion-store] unsupported version {} at {}",
                value.version,
                path.display()
            );
            return BTreeMap::new();
        }
        Err(error) => {
            log::warn!(
                "[completion-store] failed to parse {}: {error}",
                path.display()
            );
            return BTreeMap::new();
        }
    };

    let mut completed = BTreeMap::new();
    for (raw_key, raw_value) in parsed.completed {
        let entry: StoredCompletion = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                log::warn!(
                    "[completion-store] skipping entry '{raw_key}' in {}: {error}",
                    path.display()
                );
                continue;
            }
        };
        let name = entry.name.trim().to_string();
        let key = completion_key(&name);
        if key.is_empty() {
            continue;
        }
        completed.entry(key).or_insert(StoredCompletion {
            name,
            completed_at: entry.completed_at,
        });
    }
    completed
}

fn completion_key(name: &str) -> String {
    name.trim().to_lowercase()
}
