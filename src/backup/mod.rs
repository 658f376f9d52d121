//! Timestamped backups of the whole palace.
//!
//! A backup is a directory `backups/backup_<stamp>/` holding the same four
//! documents as the data root. Backups are independent of undo history and
//! best-effort: a failure is returned or logged, never propagated into the
//! operation that triggered it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::model::{Collections, EntityKind};
use crate::storage::{StorageBackend, StorageError};

/// Directory, relative to the data root, that holds every backup.
pub const BACKUP_DIR: &str = "backups";

/// Default minutes between periodic backups.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// Errors that can occur when scheduling backups.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup interval must be greater than zero")]
    ZeroInterval,

    #[error("Periodic backups need a running tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Writes backups, on demand or on a schedule.
pub struct BackupManager {
    writer: Arc<BackupWriter>,
    periodic: Option<JoinHandle<()>>,
}

/// The part of the manager shared with the periodic task.
struct BackupWriter {
    storage: Arc<dyn StorageBackend>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl BackupManager {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            writer: Arc::new(BackupWriter {
                storage,
                last_stamp: Mutex::new(None),
            }),
            periodic: None,
        }
    }

    /// Write a backup of `state` now. Returns the backup directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the directory or any document cannot be
    /// written. Documents already written stay in place.
    pub fn backup_now(&self, state: &Collections) -> Result<PathBuf, StorageError> {
        self.writer.write(state)
    }

    /// Back up every `interval_minutes`, replacing any previous schedule.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::start_periodic_every`].
    pub fn start_periodic(
        &mut self,
        interval_minutes: u64,
        snapshots: watch::Receiver<Arc<Collections>>,
    ) -> Result<(), BackupError> {
        self.start_periodic_every(
            Duration::from_secs(interval_minutes.saturating_mul(60)),
            snapshots,
        )
    }

    /// Back up every `period`, replacing any previous schedule.
    ///
    /// Each tick writes whatever `snapshots` holds at that moment. The first
    /// backup happens one full period after the call.
    ///
    /// # Errors
    ///
    /// Returns `BackupError::ZeroInterval` for a zero period and
    /// `BackupError::NoRuntime` when called outside a tokio runtime. The
    /// previous schedule is left running in both cases.
    pub fn start_periodic_every(
        &mut self,
        period: Duration,
        snapshots: watch::Receiver<Arc<Collections>>,
    ) -> Result<(), BackupError> {
        if period.is_zero() {
            return Err(BackupError::ZeroInterval);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BackupError::NoRuntime)?;

        self.stop_periodic();

        let writer = Arc::clone(&self.writer);
        self.periodic = Some(runtime.spawn(run_periodic(writer, period, snapshots)));
        tracing::info!(every_secs = period.as_secs(), "periodic backups started");
        Ok(())
    }

    /// Cancel the periodic schedule. Returns whether one was running.
    pub fn stop_periodic(&mut self) -> bool {
        match self.periodic.take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("periodic backups stopped");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.periodic.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for BackupManager {
    fn drop(&mut self) {
        if let Some(handle) = self.periodic.take() {
            handle.abort();
        }
    }
}

async fn run_periodic(
    writer: Arc<BackupWriter>,
    period: Duration,
    snapshots: watch::Receiver<Arc<Collections>>,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        let state = Arc::clone(&snapshots.borrow());
        let writer = Arc::clone(&writer);
        match tokio::task::spawn_blocking(move || writer.write(&state)).await {
            Ok(Ok(dir)) => tracing::info!(dir = %dir.display(), "auto-backup completed"),
            Ok(Err(e)) => tracing::error!(error = %e, "auto-backup failed"),
            Err(e) => tracing::error!(error = %e, "auto-backup task failed"),
        }
    }
}

impl BackupWriter {
    fn write(&self, state: &Collections) -> Result<PathBuf, StorageError> {
        let dir = Path::new(BACKUP_DIR).join(format!("backup_{}", self.next_stamp()));
        self.storage.ensure_dir(&dir)?;

        for kind in EntityKind::ALL {
            let json = state
                .to_json(kind)
                .map_err(|e| StorageError::SerializeError(e.to_string()))?;
            self.storage.write_text(&dir.join(kind.file_name()), &json)?;
        }

        tracing::debug!(dir = %dir.display(), "backup written");
        Ok(dir)
    }

    /// A stamp strictly later than every earlier one from this manager.
    fn next_stamp(&self) -> String {
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now();
        if let Some(previous) = *last
            && now <= previous
        {
            now = previous + TimeDelta::milliseconds(1);
        }
        *last = Some(now);
        format_stamp(now)
    }
}

/// `2024-03-09T14-05-33-120Z`: an ISO-8601 instant with `:` and `.` replaced,
/// so it is safe in file names and sorts chronologically.
#[must_use]
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::model::Actor;
    use crate::storage::memory::MemoryStorageBackend;

    fn state() -> Collections {
        Collections {
            actors: vec![Actor {
                id: "1".to_string(),
                name: "Mei".to_string(),
                pinyin_initial: None,
                image: None,
                characters: vec![],
            }],
            ..Collections::default()
        }
    }

    fn backup_dirs(storage: &MemoryStorageBackend) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = storage
            .paths()
            .into_iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();
        dirs.dedup();
        dirs
    }

    #[test]
    fn stamp_has_no_colons_and_sorts() {
        let early = Utc.with_ymd_and_hms(2024, 3, 9, 9, 5, 33).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 33).unwrap();

        assert_eq!(format_stamp(early), "2024-03-09T09-05-33-000Z");
        assert!(!format_stamp(late).contains(':'));
        assert!(format_stamp(early) < format_stamp(late));
    }

    #[test]
    fn backup_writes_all_four_documents() {
        let storage = Arc::new(MemoryStorageBackend::new());
        let manager = BackupManager::new(storage.clone());

        let dir = manager.backup_now(&state()).unwrap();

        assert!(dir.starts_with(BACKUP_DIR));
        for kind in EntityKind::ALL {
            assert!(storage.exists(&dir.join(kind.file_name())), "missing {kind}");
        }
        let actors = storage.read_text(&dir.join("actors.json")).unwrap().unwrap();
        assert!(actors.contains("\"Mei\""));
    }

    #[test]
    fn consecutive_backups_get_increasing_directories() {
        let storage = Arc::new(MemoryStorageBackend::new());
        let manager = BackupManager::new(storage.clone());

        let first = manager.backup_now(&state()).unwrap();
        let second = manager.backup_now(&state()).unwrap();
        let third = manager.backup_now(&state()).unwrap();

        assert!(first < second && second < third);
        assert_eq!(backup_dirs(&storage).len(), 3);
    }

    #[test]
    fn failed_backup_is_reported() {
        let storage = Arc::new(MemoryStorageBackend::new());
        storage.set_fail_writes(true);
        let manager = BackupManager::new(storage);

        assert!(manager.backup_now(&state()).is_err());
    }

    #[test]
    fn periodic_needs_a_runtime() {
        let mut manager = BackupManager::new(Arc::new(MemoryStorageBackend::new()));
        let (_tx, rx) = watch::channel(Arc::new(state()));

        let result = manager.start_periodic(5, rx);
        assert!(matches!(result, Err(BackupError::NoRuntime)));
        assert!(!manager.is_periodic());
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let mut manager = BackupManager::new(Arc::new(MemoryStorageBackend::new()));
        let (_tx, rx) = watch::channel(Arc::new(state()));

        assert!(matches!(manager.start_periodic(0, rx), Err(BackupError::ZeroInterval)));
    }

    #[tokio::test]
    async fn periodic_backups_run_until_stopped() {
        let storage = Arc::new(MemoryStorageBackend::new());
        let mut manager = BackupManager::new(storage.clone());
        let (_tx, rx) = watch::channel(Arc::new(state()));

        manager
            .start_periodic_every(Duration::from_millis(20), rx)
            .unwrap();
        assert!(manager.is_periodic());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(manager.stop_periodic());
        assert!(!manager.stop_periodic());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let written = backup_dirs(&storage).len();
        assert!(written >= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backup_dirs(&storage).len(), written);
    }

    #[tokio::test]
    async fn restarting_replaces_the_schedule() {
        let storage = Arc::new(MemoryStorageBackend::new());
        let mut manager = BackupManager::new(storage.clone());
        let (_tx, rx) = watch::channel(Arc::new(state()));

        manager.start_periodic(60, rx.clone()).unwrap();
        manager
            .start_periodic_every(Duration::from_millis(20), rx)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        manager.stop_periodic();

        assert!(!backup_dirs(&storage).is_empty());
    }

    #[tokio::test]
    async fn periodic_backup_writes_latest_snapshot() {
        let storage = Arc::new(MemoryStorageBackend::new());
        let mut manager = BackupManager::new(storage.clone());
        let (tx, rx) = watch::channel(Arc::new(Collections::default()));

        tx.send_replace(Arc::new(state()));
        manager
            .start_periodic_every(Duration::from_millis(20), rx)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.stop_periodic();

        let dir = backup_dirs(&storage).into_iter().next().unwrap();
        let actors = storage.read_text(&dir.join("actors.json")).unwrap().unwrap();
        assert!(actors.contains("\"Mei\""));
    }
}
