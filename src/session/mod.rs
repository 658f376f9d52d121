//! The session: one open palace and everything that keeps it durable.
//!
//! A [`Session`] owns the [`Repository`], its [`History`], the storage handle
//! and the [`BackupManager`]. Every successful mutation is committed to
//! history, published to the periodic backup task, and written back as all
//! four documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use crate::backup::{BACKUP_DIR, BackupError, BackupManager, format_stamp};
use crate::history::{DEFAULT_MAX_DEPTH, History};
use crate::model::normalize::RawCollections;
use crate::model::{Collections, EntityFields, EntityKind, Record};
use crate::repository::{LoadStats, Repository, ValidationErrors};
use crate::search::{Matches, Query};
use crate::storage::{StorageBackend, StorageError};

/// Directory reserved for record images.
pub const IMAGES_DIR: &str = "images";

/// Settings for opening a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Undo steps kept.
    pub max_history: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_DEPTH,
        }
    }
}

/// What opening the palace found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Kinds whose document was missing or unreadable and loaded empty.
    pub recovered: Vec<EntityKind>,
    /// Where unreadable documents were moved before being reset to `[]`.
    pub set_aside: Vec<PathBuf>,
    pub stats: LoadStats,
}

/// A document that could not be written.
#[derive(Debug)]
pub struct SaveFailure {
    pub kind: EntityKind,
    pub error: StorageError,
}

/// Result of writing the palace back to storage.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub failures: Vec<SaveFailure>,
}

impl SaveReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A mutation's value together with how persisting it went.
///
/// The in-memory change stands even when `save` reports failures.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub save: SaveReport,
}

pub struct Session {
    repo: Repository,
    history: History,
    storage: Arc<dyn StorageBackend>,
    backups: BackupManager,
    snapshots: watch::Sender<Arc<Collections>>,
    load_report: LoadReport,
}

impl Session {
    /// Open the palace stored in `storage`.
    ///
    /// Missing or corrupt documents load as empty collections and are
    /// rewritten as `[]`. A corrupt document is first moved to
    /// `<file>.corrupt-<stamp>`; if that fails it is left untouched. Nothing
    /// here fails; problems are logged and listed in [`Session::load_report`].
    #[must_use]
    pub fn open(storage: Arc<dyn StorageBackend>, options: &SessionOptions) -> Self {
        for dir in ["", IMAGES_DIR, BACKUP_DIR] {
            if let Err(e) = storage.ensure_dir(Path::new(dir)) {
                tracing::warn!(dir, error = %e, "could not create data directory");
            }
        }

        let mut raw = RawCollections::default();
        let mut recovered = Vec::new();
        let mut set_aside = Vec::new();
        for kind in EntityKind::ALL {
            let unusable = match read_document(storage.as_ref(), kind) {
                Document::Parsed(value) => {
                    raw.set(kind, value);
                    continue;
                }
                Document::Missing => false,
                Document::Unusable => true,
            };

            raw.set(kind, Value::Array(Vec::new()));
            recovered.push(kind);
            if unusable {
                match set_document_aside(storage.as_ref(), kind) {
                    Some(path) => set_aside.push(path),
                    None => continue,
                }
            }
            reset_document(storage.as_ref(), kind);
        }

        let mut repo = Repository::new();
        let stats = repo.load(&raw);
        let history = History::new(&repo, options.max_history);
        let (snapshots, _) = watch::channel(Arc::clone(history.present()));

        tracing::info!(
            root = %storage.root().display(),
            actors = repo.actors().len(),
            sets = repo.sets().len(),
            props = repo.props().len(),
            characters = repo.characters().len(),
            "palace loaded"
        );

        Self {
            repo,
            history,
            backups: BackupManager::new(Arc::clone(&storage)),
            storage,
            snapshots,
            load_report: LoadReport {
                recovered,
                set_aside,
                stats,
            },
        }
    }

    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Create or update a record, then commit and persist.
    ///
    /// # Errors
    ///
    /// Returns the validation failures; nothing is committed or written then.
    pub fn save(
        &mut self,
        fields: EntityFields,
        id: Option<&str>,
    ) -> Result<Outcome<Record>, ValidationErrors> {
        let record = self.repo.create_or_update(fields, id)?;
        let save = self.commit();
        Ok(Outcome {
            value: record,
            save,
        })
    }

    /// Delete a record, then commit and persist. Deleting an unknown id
    /// commits nothing.
    pub fn delete(&mut self, kind: EntityKind, id: &str) -> Outcome<bool> {
        if !self.repo.delete(kind, id) {
            return Outcome {
                value: false,
                save: SaveReport::default(),
            };
        }
        Outcome {
            value: true,
            save: self.commit(),
        }
    }

    #[must_use]
    pub fn query(&self, query: &Query) -> Matches<'_> {
        self.repo.query(query)
    }

    /// Record the live state in history, hand it to the backup task and
    /// write every document.
    pub fn commit(&mut self) -> SaveReport {
        self.history.commit(&self.repo);
        self.publish();
        self.save_all()
    }

    /// Step back one commit. Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<SaveReport> {
        if !self.history.undo(&mut self.repo) {
            return None;
        }
        tracing::info!(remaining = self.history.past_len(), "undo");
        self.publish();
        Some(self.save_all())
    }

    /// Step forward one undone commit. Returns `None` when there is nothing
    /// to redo.
    pub fn redo(&mut self) -> Option<SaveReport> {
        if !self.history.redo(&mut self.repo) {
            return None;
        }
        tracing::info!(remaining = self.history.future_len(), "redo");
        self.publish();
        Some(self.save_all())
    }

    /// Write all four documents. A failed document does not stop the others.
    pub fn save_all(&self) -> SaveReport {
        let mut report = SaveReport::default();
        for kind in EntityKind::ALL {
            if let Err(error) = self.write_document(kind) {
                tracing::error!(%kind, error = %error, "failed to save collection");
                report.failures.push(SaveFailure { kind, error });
            }
        }
        report
    }

    /// Write a backup of the live state now.
    ///
    /// # Errors
    ///
    /// Returns the storage error that stopped the backup.
    pub fn backup_now(&self) -> Result<PathBuf, StorageError> {
        let dir = self.backups.backup_now(self.repo.collections())?;
        tracing::info!(dir = %dir.display(), "backup created");
        Ok(dir)
    }

    /// Back up the last committed state every `interval_minutes`.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::start_periodic`].
    pub fn start_periodic_backups(&mut self, interval_minutes: u64) -> Result<(), BackupError> {
        self.backups
            .start_periodic(interval_minutes, self.snapshots.subscribe())
    }

    /// Returns whether a schedule was running.
    pub fn stop_periodic_backups(&mut self) -> bool {
        self.backups.stop_periodic()
    }

    #[must_use]
    pub fn periodic_backups_running(&self) -> bool {
        self.backups.is_periodic()
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(Arc::clone(self.history.present()));
    }

    fn write_document(&self, kind: EntityKind) -> Result<(), StorageError> {
        let json = self
            .repo
            .serialize(kind)
            .map_err(|e| StorageError::SerializeError(e.to_string()))?;
        self.storage.write_text(Path::new(kind.file_name()), &json)
    }
}

/// What was found at a document's path.
#[derive(Debug)]
enum Document {
    Parsed(Value),
    Missing,
    /// Stored but unreadable or not JSON.
    Unusable,
}

fn read_document(storage: &dyn StorageBackend, kind: EntityKind) -> Document {
    let path = Path::new(kind.file_name());
    let text = match storage.read_text(path) {
        Ok(Some(text)) => text,
        Ok(None) => {
            tracing::info!(%kind, "no stored document, starting empty");
            return Document::Missing;
        }
        Err(e) => {
            tracing::warn!(%kind, error = %e, "could not read stored document");
            return Document::Unusable;
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => Document::Parsed(value),
        Err(e) => {
            tracing::warn!(
                %kind,
                error = %e,
                "stored document is not valid JSON, resetting"
            );
            Document::Unusable
        }
    }
}

/// Move an unusable document out of the way. Returns its new path.
fn set_document_aside(storage: &dyn StorageBackend, kind: EntityKind) -> Option<PathBuf> {
    let target = PathBuf::from(format!(
        "{}.corrupt-{}",
        kind.file_name(),
        format_stamp(Utc::now())
    ));
    match storage.rename(Path::new(kind.file_name()), &target) {
        Ok(()) => {
            tracing::warn!(%kind, kept = %target.display(), "moved unusable document aside");
            Some(target)
        }
        Err(e) => {
            tracing::error!(
                %kind,
                error = %e,
                "could not move unusable document aside, leaving it"
            );
            None
        }
    }
}

fn reset_document(storage: &dyn StorageBackend, kind: EntityKind) {
    if let Err(e) = storage.write_text(Path::new(kind.file_name()), "[]") {
        tracing::error!(%kind, error = %e, "could not recreate document");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::model::{ActorFields, CharacterFields, SetFields};
    use crate::search::CharacterQuery;
    use crate::storage::memory::MemoryStorageBackend;

    fn open(storage: &Arc<MemoryStorageBackend>) -> Session {
        Session::open(storage.clone(), &SessionOptions::default())
    }

    fn actor(name: &str) -> EntityFields {
        EntityFields::Actor(ActorFields {
            name: name.to_string(),
            ..ActorFields::default()
        })
    }

    fn stored(storage: &MemoryStorageBackend, file: &str) -> Value {
        let text = storage.read_text(Path::new(file)).unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    mod open_tests {
        use super::*;

        #[test]
        fn empty_storage_creates_layout() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let session = open(&storage);

            assert_eq!(session.load_report().recovered, EntityKind::ALL.to_vec());
            for kind in EntityKind::ALL {
                assert_eq!(stored(&storage, kind.file_name()), json!([]));
            }
            assert!(storage.exists(Path::new(IMAGES_DIR)));
            assert!(storage.exists(Path::new(BACKUP_DIR)));
        }

        #[test]
        fn corrupt_document_is_reset() {
            let storage = Arc::new(MemoryStorageBackend::new());
            storage
                .write_text(Path::new("actors.json"), r#"[{"id":"1","name":"Mei"}]"#)
                .unwrap();
            storage
                .write_text(Path::new("props.json"), "{ not json")
                .unwrap();

            let session = open(&storage);

            assert_eq!(session.repository().actors().len(), 1);
            assert!(session.repository().props().is_empty());
            assert!(session.load_report().recovered.contains(&EntityKind::Prop));
            assert!(!session.load_report().recovered.contains(&EntityKind::Actor));
            assert_eq!(stored(&storage, "props.json"), json!([]));

            let kept = &session.load_report().set_aside;
            assert_eq!(kept.len(), 1);
            assert!(kept[0].to_string_lossy().starts_with("props.json.corrupt-"));
            assert_eq!(
                storage.read_text(&kept[0]).unwrap().as_deref(),
                Some("{ not json")
            );
        }

        #[test]
        fn missing_document_is_not_set_aside() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let session = open(&storage);

            assert!(session.load_report().set_aside.is_empty());
            assert_eq!(storage.paths().len(), 4);
        }

        #[test]
        fn corrupt_document_is_left_alone_when_it_cannot_move() {
            let storage = Arc::new(MemoryStorageBackend::new());
            storage.write_text(Path::new("sets.json"), "[").unwrap();
            storage.set_fail_writes(true);

            let session = open(&storage);

            assert!(session.repository().sets().is_empty());
            assert!(session.load_report().set_aside.is_empty());
            assert_eq!(
                storage.read_text(Path::new("sets.json")).unwrap().as_deref(),
                Some("[")
            );
        }

        #[test]
        fn load_report_counts_repairs() {
            let storage = Arc::new(MemoryStorageBackend::new());
            storage
                .write_text(Path::new("sets.json"), r#"[{"name":"Kitchen"}, 7]"#)
                .unwrap();

            let session = open(&storage);

            assert_eq!(session.load_report().stats.skipped, 1);
            assert_eq!(session.load_report().stats.assigned_ids, 1);
            assert_eq!(session.repository().set("1").unwrap().name, "Kitchen");
        }
    }

    mod mutation_tests {
        use super::*;

        #[test]
        fn save_persists_every_document() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);

            let outcome = session.save(actor("Mei"), None).unwrap();

            assert!(outcome.save.is_ok());
            assert_eq!(outcome.value.id(), "1");
            assert_eq!(stored(&storage, "actors.json")[0]["name"], "Mei");
            assert!(session.history().can_undo());
        }

        #[test]
        fn invalid_save_commits_nothing() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);
            session.save(actor("Mei"), None).unwrap();

            let err = session.save(actor(" MEI "), None).unwrap_err();

            assert_eq!(err.messages(), ["An actor with this name already exists"]);
            assert_eq!(session.history().past_len(), 1);
            assert_eq!(stored(&storage, "actors.json").as_array().unwrap().len(), 1);
        }

        #[test]
        fn deleting_unknown_id_commits_nothing() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);

            let outcome = session.delete(EntityKind::Set, "3");

            assert!(!outcome.value);
            assert!(!session.history().can_undo());
        }

        #[test]
        fn write_failure_keeps_memory_state() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);
            storage.set_fail_writes(true);

            let outcome = session.save(actor("Mei"), None).unwrap();

            assert_eq!(outcome.save.failures.len(), 4);
            assert_eq!(session.repository().actors().len(), 1);
            assert_eq!(stored(&storage, "actors.json"), json!([]));

            storage.set_fail_writes(false);
            assert!(session.save(actor("Bo"), None).unwrap().save.is_ok());
            assert_eq!(stored(&storage, "actors.json").as_array().unwrap().len(), 2);
        }

        #[test]
        fn query_sees_saved_characters() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);
            session.save(actor("Mei"), None).unwrap();
            session
                .save(
                    EntityFields::Set(SetFields {
                        name: "Kitchen".to_string(),
                        tone_sections: json!({ "1": "Door" }),
                        image: None,
                    }),
                    None,
                )
                .unwrap();
            session
                .save(
                    EntityFields::Character(CharacterFields {
                        hanzi: "妈".to_string(),
                        pinyin: "mā".to_string(),
                        meaning: "mother".to_string(),
                        actor_id: "1".to_string(),
                        set_id: "1".to_string(),
                        ..CharacterFields::default()
                    }),
                    None,
                )
                .unwrap();

            let matches = session.query(&Query::Characters(CharacterQuery {
                text: Some("kitchen".to_string()),
                ..CharacterQuery::default()
            }));
            assert_eq!(matches.ids(), vec!["1"]);
        }
    }

    mod history_tests {
        use super::*;

        #[test]
        fn undo_rewrites_documents() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);
            session.save(actor("Mei"), None).unwrap();
            session.save(actor("Bo"), None).unwrap();

            assert!(session.undo().unwrap().is_ok());
            assert_eq!(stored(&storage, "actors.json").as_array().unwrap().len(), 1);

            assert!(session.redo().is_some());
            assert_eq!(stored(&storage, "actors.json").as_array().unwrap().len(), 2);
            assert!(session.redo().is_none());
        }

        #[test]
        fn history_depth_follows_options() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = Session::open(storage, &SessionOptions { max_history: 2 });
            for name in ["A", "B", "C", "D"] {
                session.save(actor(name), None).unwrap();
            }

            assert_eq!(session.history().past_len(), 2);
            session.undo();
            session.undo();
            assert!(session.undo().is_none());
            assert_eq!(session.repository().actors().len(), 2);
        }
    }

    mod backup_tests {
        use super::*;

        #[test]
        fn backup_now_copies_live_state() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);
            session.save(actor("Mei"), None).unwrap();

            let dir = session.backup_now().unwrap();

            let actors = stored(&storage, &dir.join("actors.json").to_string_lossy());
            assert_eq!(actors[0]["name"], "Mei");
            assert_eq!(
                stored(&storage, &dir.join("props.json").to_string_lossy()),
                json!([])
            );
        }

        #[tokio::test]
        async fn periodic_backups_follow_commits() {
            let storage = Arc::new(MemoryStorageBackend::new());
            let mut session = open(&storage);
            session.save(actor("Mei"), None).unwrap();

            session
                .backups
                .start_periodic_every(
                    std::time::Duration::from_millis(20),
                    session.snapshots.subscribe(),
                )
                .unwrap();
            assert!(session.periodic_backups_running());
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            assert!(session.stop_periodic_backups());
            assert!(!session.stop_periodic_backups());

            let backup = storage
                .paths()
                .into_iter()
                .find(|p| p.starts_with(BACKUP_DIR) && p.ends_with("actors.json"))
                .unwrap();
            let text = storage.read_text(&backup).unwrap().unwrap();
            assert!(text.contains("\"Mei\""));
        }
    }
}
