//! Visitor identity persistence
//!
//! The identity store is a dumb key-value slot holding the server-assigned
//! visitor identifier across page loads. No expiry, no format validation.
//! Store failures reduce telemetry fidelity and are absorbed: reads degrade
//! to absence, writes log and move on.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable slot for the server-assigned visitor identifier
pub trait IdentityStore: Send + Sync {
    /// Previously persisted identifier, or absence
    fn get(&self) -> Option<String>;

    /// Persist the identifier for future page loads
    fn set(&self, identifier: &str);
}

/// File-backed identity slot, the profile-scoped storage analog.
///
/// The whole file is the value; a missing or empty file is absence.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentityStore for FileIdentityStore {
    fn get(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let identifier = contents.trim();
                if identifier.is_empty() {
                    None
                } else {
                    Some(identifier.to_string())
                }
            }
            Err(error) => {
                tracing::debug!(path = %self.path.display(), %error, "no persisted identity");
                None
            }
        }
    }

    fn set(&self, identifier: &str) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(error) = fs::create_dir_all(parent) {
                tracing::warn!(path = %self.path.display(), %error, "cannot create identity dir");
                return;
            }
        }
        if let Err(error) = fs::write(&self.path, identifier) {
            tracing::warn!(path = %self.path.display(), %error, "failed to persist identity");
        }
    }
}

/// In-memory identity slot for tests and ephemeral hosts
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, identifier: &str) {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(identifier.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryIdentityStore::new();
        assert_eq!(store.get(), None);

        store.set("visitor-42");
        assert_eq!(store.get().as_deref(), Some("visitor-42"));

        store.set("visitor-43");
        assert_eq!(store.get().as_deref(), Some("visitor-43"));
    }

    #[test]
    fn test_file_store_survives_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");

        let store = FileIdentityStore::new(&path);
        assert_eq!(store.get(), None);
        store.set("visitor-7");

        // A fresh instance over the same path sees the identifier
        let reopened = FileIdentityStore::new(&path);
        assert_eq!(reopened.get().as_deref(), Some("visitor-7"));
    }

    #[test]
    fn test_file_store_treats_blank_file_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");
        fs::write(&path, "  \n").unwrap();

        let store = FileIdentityStore::new(&path);
        assert_eq!(store.get(), None);
    }
}
