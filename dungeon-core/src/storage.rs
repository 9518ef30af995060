//! File-system helpers shared by the session store and the asset cache.

use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per key, created on first use and dropped with its last
/// holder.
///
/// Holders of different keys never wait on each other.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub(crate) async fn lock(&self, key: &str) -> KeyGuard<'_> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one key of a [`KeyedLocks`].
#[derive(Debug)]
pub(crate) struct KeyGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release first so the guard's own Arc is gone. A count of one then
        // means only the map refers to the mutex: nobody holds or waits on it.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Write `contents` to `path` so readers see either the old file or the new
/// one, never a partial write.
///
/// The temp file is synced to disk before the rename.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    if let Err(e) = write_synced(&temp, contents).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

async fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_same_key_waits_other_key_does_not() {
        let locks = KeyedLocks::new();
        let _held = locks.lock("sess_a").await;

        let other = timeout(Duration::from_millis(100), locks.lock("sess_b")).await;
        assert!(other.is_ok(), "different key should not block");

        let same = timeout(Duration::from_millis(100), locks.lock("sess_a")).await;
        assert!(same.is_err(), "same key should block while held");
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = KeyedLocks::new();
        drop(locks.lock("key").await);
        let again = timeout(Duration::from_millis(100), locks.lock("key")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_entries_removed_once_unlocked() {
        let locks = KeyedLocks::new();
        for i in 0..1000 {
            drop(locks.lock(&format!("sess_{i}")).await);
        }
        assert_eq!(locks.len(), 0);

        let held = locks.lock("sess_a").await;
        let other = locks.lock("sess_b").await;
        assert_eq!(locks.len(), 2);
        drop(other);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_until_served() {
        let locks = Arc::new(KeyedLocks::new());
        let held = locks.lock("sess_a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("sess_a").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter's clone keeps the mutex alive after the holder leaves.
        drop(held);
        assert_eq!(locks.len(), 1);

        waiter.await.expect("waiter");
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("data.json");

        write_atomic(&path, b"first").await.expect("first write");
        write_atomic(&path, b"second").await.expect("second write");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_write_atomic_into_missing_dir_fails_cleanly() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("missing").join("data.json");
        assert!(write_atomic(&path, b"x").await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_write_atomic_writes_large_contents_whole() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("index.json");
        let contents: Vec<u8> = (0..(1 << 20)).map(|i| (i % 251) as u8).collect();

        write_atomic(&path, &contents).await.expect("write");
        assert_eq!(std::fs::read(&path).unwrap(), contents);
    }

    #[tokio::test]
    async fn test_write_atomic_rename_failure_removes_temp() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        // A non-empty directory at the target makes the rename fail after
        // the temp file was written and synced.
        let path = dir.path().join("data.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(write_atomic(&path, b"contents").await.is_err());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("data.json")]);
    }
}
