//! Observable state container with a pluggable persistence adapter.

use serde::{Serialize, de::DeserializeOwned};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Where a [`Store`] keeps its value between runs.
pub trait Persistence<T>: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    ///
    /// # Errors
    /// Returns an error if the stored value cannot be read or decoded.
    fn load(&self) -> Result<Option<T>, StoreError>;

    /// # Errors
    /// Returns an error if the value cannot be encoded or written.
    fn save(&self, value: &T) -> Result<(), StoreError>;
}

/// Keeps the last saved value in memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence<T> {
    slot: Mutex<Option<T>>,
}

impl<T> MemoryPersistence<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T: Clone + Send> Persistence<T> for MemoryPersistence<T> {
    fn load(&self) -> Result<Option<T>, StoreError> {
        let slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slot.clone())
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(value.clone());
        Ok(())
    }
}

/// One JSON document per store on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize + DeserializeOwned> Persistence<T> for JsonFilePersistence {
    fn load(&self) -> Result<Option<T>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves half a document behind.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// State container exposing `get`, `set` and `subscribe`.
///
/// Clones share the same value and subscribers.
pub struct Store<T> {
    sender: Arc<watch::Sender<T>>,
    persistence: Option<Arc<dyn Persistence<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            persistence: self.persistence.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("value", &*self.sender.borrow())
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    /// In-memory store starting at `initial`.
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
            persistence: None,
        }
    }

    /// Store hydrated from `persistence`, falling back to `initial` when nothing
    /// was saved or the saved value cannot be read.
    pub fn with_persistence(initial: T, persistence: impl Persistence<T> + 'static) -> Self {
        let value = match persistence.load() {
            Ok(Some(saved)) => saved,
            Ok(None) => initial,
            Err(err) => {
                warn!("Ignoring unreadable stored state: {err}");
                initial
            }
        };
        let (sender, _) = watch::channel(value);
        Self {
            sender: Arc::new(sender),
            persistence: Some(Arc::new(persistence)),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Replace the value, persist it, and notify subscribers.
    ///
    /// A persistence failure is logged; the in-memory value still changes.
    pub fn set(&self, value: T) {
        if let Some(persistence) = &self.persistence
            && let Err(err) = persistence.save(&value)
        {
            warn!("Failed to persist state: {err}");
        }
        self.sender.send_replace(value);
    }

    /// Read-modify-write through [`Store::set`].
    pub fn update(&self, mutate: impl FnOnce(&mut T)) {
        let mut value = self.get();
        mutate(&mut value);
        self.set(value);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FailingPersistence;

    impl Persistence<u32> for FailingPersistence {
        fn load(&self) -> Result<Option<u32>, StoreError> {
            Err(StoreError::Poisoned)
        }

        fn save(&self, _value: &u32) -> Result<(), StoreError> {
            Err(StoreError::Io(io::Error::other("disk full")))
        }
    }

    #[test]
    fn get_returns_latest_set() {
        let store = Store::new(1_u32);
        assert_eq!(store.get(), 1);
        store.set(2);
        assert_eq!(store.get(), 2);
        store.update(|v| *v += 5);
        assert_eq!(store.get(), 7);
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new(String::from("a"));
        let other = store.clone();
        other.set("b".to_string());
        assert_eq!(store.get(), "b");
    }

    #[tokio::test]
    async fn subscribers_observe_set() {
        let store = Store::new(0_u32);
        let mut rx = store.subscribe();
        let writer = store.clone();
        tokio::spawn(async move { writer.set(42) });

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), 42);
    }

    #[test]
    fn failed_persistence_keeps_memory_value() {
        let store = Store::with_persistence(3_u32, FailingPersistence);
        assert_eq!(store.get(), 3);
        store.set(4);
        assert_eq!(store.get(), 4);
    }

    #[test]
    fn memory_persistence_round_trip() {
        let persistence = MemoryPersistence::new();
        assert_eq!(Persistence::<u32>::load(&persistence).unwrap(), None);
        persistence.save(&9_u32).unwrap();
        assert_eq!(persistence.load().unwrap(), Some(9));
    }

    #[test]
    fn json_file_store_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cart.json");

        let store = Store::with_persistence(Vec::<String>::new(), JsonFilePersistence::new(&path));
        store.set(vec!["fries".to_string()]);
        assert!(path.exists());

        let reloaded = Store::with_persistence(Vec::<String>::new(), JsonFilePersistence::new(&path));
        assert_eq!(reloaded.get(), ["fries".to_string()]);
    }

    #[test]
    fn corrupt_file_falls_back_to_initial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        let store = Store::with_persistence(5_u32, JsonFilePersistence::new(&path));
        assert_eq!(store.get(), 5);
    }
}
