//! Session persistence.
//!
//! One pretty-printed JSON file per session, named after its id. Access to a
//! given session id is serialized through a per-id lock; different sessions
//! never contend.

use crate::storage::{write_atomic, KeyedLocks};
use crate::world::{Session, SessionId, WorldError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Corrupt data for session {id}: {reason}")]
    CorruptData { id: SessionId, reason: String },

    #[error("Invalid session id: {0:?}")]
    InvalidId(String),

    #[error("Refusing to save invalid session: {0}")]
    InvalidSession(#[from] WorldError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for sessions.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    locks: KeyedLocks,
}

impl SessionStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: KeyedLocks::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a session. Ids are limited to `[A-Za-z0-9_-]` so they
    /// cannot name anything outside the store directory.
    pub fn session_path(&self, id: &SessionId) -> Result<PathBuf, PersistError> {
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Write the whole session, replacing any previous save.
    pub async fn save(&self, session: &Session) -> Result<(), PersistError> {
        let path = self.session_path(&session.session_id)?;
        session.validate()?;
        let content = serde_json::to_string_pretty(session)?;

        let _guard = self.locks.lock(session.session_id.as_str()).await;
        write_atomic(&path, content.as_bytes()).await?;

        tracing::info!(session_id = %session.session_id, rooms = session.rooms.len(), "Saved session");
        Ok(())
    }

    /// Read a session back.
    ///
    /// Fails with `NotFound` when nothing is stored under the id and with
    /// `CorruptData` when the file does not describe a valid session.
    pub async fn load(&self, id: &SessionId) -> Result<Session, PersistError> {
        let path = self.session_path(id)?;

        let content = {
            let _guard = self.locks.lock(id.as_str()).await;
            match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(PersistError::NotFound(id.clone()))
                }
                Err(e) => return Err(e.into()),
            }
        };

        let corrupt = |reason: String| PersistError::CorruptData {
            id: id.clone(),
            reason,
        };

        let session: Session = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        if &session.session_id != id {
            return Err(corrupt(format!(
                "file holds session {}",
                session.session_id
            )));
        }
        session.validate().map_err(|e| corrupt(e.to_string()))?;

        tracing::debug!(session_id = %id, "Loaded session");
        Ok(session)
    }

    /// Whether anything is stored under the id.
    pub async fn exists(&self, id: &SessionId) -> bool {
        match self.session_path(id) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Ids of all stored sessions, sorted.
    pub async fn list(&self) -> Result<Vec<SessionId>, PersistError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !stem.starts_with('.') {
                        ids.push(SessionId::from(stem));
                    }
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;
    use crate::world::RoomId;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn temp_store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = SessionStore::open(dir.path().join("sessions"))
            .await
            .expect("open store");
        (dir, store)
    }

    #[tokio::test]
    async fn test_round_trip_is_deep_equal() {
        let (_dir, store) = temp_store().await;
        let mut session = sample_session("sess_round_trip");
        {
            let corridor = session.room_mut(&RoomId::from("room_02")).unwrap();
            corridor.entities[0].hp_current = 3;
            corridor.visited = true;
        }

        store.save(&session).await.expect("save");
        let loaded = store.load(&session.session_id).await.expect("load");

        assert_eq!(loaded, session);
        let chamber = loaded.room(&RoomId::from("room_03")).unwrap();
        let loot: Vec<_> = chamber.loot.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(loot, vec!["Gemstone", "Potion of Healing"]);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let (_dir, store) = temp_store().await;
        let err = store.load(&SessionId::from("sess_ghost")).await.unwrap_err();
        assert!(matches!(err, PersistError::NotFound(id) if id.as_str() == "sess_ghost"));
    }

    #[tokio::test]
    async fn test_unparseable_file_is_corrupt() {
        let (_dir, store) = temp_store().await;
        let id = SessionId::from("sess_garbled");
        std::fs::write(store.session_path(&id).unwrap(), "{ not json").unwrap();

        assert!(matches!(
            store.load(&id).await,
            Err(PersistError::CorruptData { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_fields_are_corrupt() {
        let (_dir, store) = temp_store().await;
        let id = SessionId::from("sess_partial");
        std::fs::write(
            store.session_path(&id).unwrap(),
            r#"{"session_id": "sess_partial", "rooms": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            store.load(&id).await,
            Err(PersistError::CorruptData { .. })
        ));
    }

    #[tokio::test]
    async fn test_dangling_exit_on_disk_is_corrupt() {
        let (_dir, store) = temp_store().await;
        let session = sample_session("sess_dangling");
        let mut value = serde_json::to_value(&session).unwrap();
        value["rooms"]["room_01"]["exits"]["west"] = serde_json::json!("room_404");
        std::fs::write(
            store.session_path(&session.session_id).unwrap(),
            value.to_string(),
        )
        .unwrap();

        let err = store.load(&session.session_id).await.unwrap_err();
        assert!(matches!(err, PersistError::CorruptData { ref reason, .. } if reason.contains("room_404")));
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_session() {
        let (_dir, store) = temp_store().await;
        let mut session = sample_session("sess_invalid");
        session.active_room = RoomId::from("room_404");

        assert!(matches!(
            store.save(&session).await,
            Err(PersistError::InvalidSession(_))
        ));
        assert!(!store.exists(&session.session_id).await);
    }

    #[tokio::test]
    async fn test_path_traversal_ids_are_rejected() {
        let (_dir, store) = temp_store().await;
        for bad in ["../escape", "a/b", "", "sess.json"] {
            assert!(matches!(
                store.load(&SessionId::from(bad)).await,
                Err(PersistError::InvalidId(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_concurrent_saves_leave_a_valid_file() {
        let (_dir, store) = temp_store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut session = sample_session("sess_busy");
                    session.dungeon_level = i;
                    store.save(&session).await
                })
            })
            .collect();

        for handle in futures::future::join_all(handles).await {
            handle.expect("task").expect("save");
        }

        let loaded = store.load(&SessionId::from("sess_busy")).await.expect("load");
        assert!(loaded.dungeon_level < 16);
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let (_dir, store) = temp_store().await;
        for id in ["sess_b", "sess_a"] {
            store.save(&sample_session(id)).await.expect("save");
        }

        let ids = store.list().await.expect("list");
        assert_eq!(ids, vec![SessionId::from("sess_a"), SessionId::from("sess_b")]);
    }

    #[tokio::test]
    async fn test_loads_file_without_active_room() {
        let (_dir, store) = temp_store().await;
        let id = SessionId::from("sess_legacy");
        let legacy = serde_json::json!({
            "session_id": "sess_legacy",
            "location_name": "Starter Dungeon",
            "dungeon_level": 1,
            "rooms": {
                "room_01": {
                    "id": "room_01",
                    "title": "Damp Crypt",
                    "type": "chamber",
                    "description_initial": "A cold, damp crypt.",
                    "description_cleared": "A cold, damp crypt, now silent.",
                    "exits": {},
                    "entities": [{
                        "name": "goblin_01",
                        "hp_current": 10,
                        "hp_max": 10,
                        "ac": 12,
                        "attacks": [{"name": "Scimitar", "dmg": "1d6+2"}]
                    }]
                }
            }
        });
        std::fs::write(store.session_path(&id).unwrap(), legacy.to_string()).unwrap();

        let session = store.load(&id).await.expect("legacy session loads");
        assert_eq!(session.active_room, RoomId::from("room_01"));
        let goblin = &session.current_room().unwrap().entities[0];
        assert_eq!(goblin.armor_class, 12);
        assert_eq!(goblin.attacks[0].damage, "1d6+2");

        // Saving writes the current field names back out.
        store.save(&session).await.expect("save");
        let rewritten = std::fs::read_to_string(store.session_path(&id).unwrap()).unwrap();
        assert!(rewritten.contains("\"active_room\""));
        assert!(rewritten.contains("\"armor_class\""));
    }

    #[tokio::test]
    async fn test_legacy_file_without_entrance_room_is_corrupt() {
        let (_dir, store) = temp_store().await;
        let id = SessionId::from("sess_no_entrance");
        let mut session = sample_session("sess_no_entrance");
        session.rooms.remove(&RoomId::from("room_01"));
        let mut value = serde_json::to_value(&session).unwrap();
        value.as_object_mut().unwrap().remove("active_room");
        std::fs::write(store.session_path(&id).unwrap(), value.to_string()).unwrap();

        let err = store.load(&id).await.unwrap_err();
        assert!(
            matches!(err, PersistError::CorruptData { ref reason, .. } if reason.contains("active room")),
            "unexpected error {err:?}"
        );
    }
}
