use crate::error::ChatError;
use log::{ info, warn };
use std::collections::HashMap;
use std::fs;
use std::path::{ Path, PathBuf };

pub const SESSION_ID_KEY: &str = "chatbot_session_id";

/// Small string key-value store scoped to one user session.
pub trait SessionStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileStore {
    /// Loads `path` if present. A missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(content) =>
                match serde_json::from_str::<HashMap<String, String>>(&content) {
                    Ok(values) => values,
                    Err(err) => {
                        warn!("Failed to parse session file {}: {err}", path.display());
                        HashMap::new()
                    }
                }
            Err(err) => {
                info!("Session file {} not found ({err}); starting a new session", path.display());
                HashMap::new()
            }
        };
        Self { path, values }
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError> {
        self.values.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::default();
        assert_eq!(store.get(SESSION_ID_KEY), None);
        store.set(SESSION_ID_KEY, "abc").unwrap();
        assert_eq!(store.get(SESSION_ID_KEY).as_deref(), Some("abc"));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let mut store = FileStore::open(&path);
        store.set(SESSION_ID_KEY, "s-1").unwrap();

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get(SESSION_ID_KEY).as_deref(), Some("s-1"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(FileStore::open(&path).get(SESSION_ID_KEY), None);
    }
}
