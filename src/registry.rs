use std::collections::BTreeMap;

use crate::types::PuzzleKey;

/// Lookup table between authored puzzle names and typed keys.
///
/// Names are matched after trimming and lowercasing; the first spelling
/// registered is the one reported back by `name_of`.
#[derive(Clone, Debug, Default)]
pub struct PuzzleRegistry {
    by_name: BTreeMap<String, PuzzleKey>,
    names: Vec<String>,
}

impl PuzzleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str) -> PuzzleKey {
        let normalized = normalize_name(name);
        if let Some(key) = self.by_name.get(&normalized) {
            return *key;
        }
        let key = PuzzleKey(self.names.len() as u32);
        self.names.push(name.trim().to_string());
        self.by_name.insert(normalized, key);
        key
    }

    pub fn key_of(&self, name: &str) -> Option<PuzzleKey> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    pub fn name_of(&self, key: PuzzleKey) -> Option<&str> {
        self.names.get(key.index()).map(|name| name.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = PuzzleKey> + '_ {
        (0..self.names.len()).map(|index| PuzzleKey(index as u32))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
