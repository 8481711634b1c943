//! Centralized session state management.
//!
//! The manager is the only writer of session records. Each session is
//! guarded by its own async mutex (one writer at a time, per id) and every
//! mutation writes through to the session's `session.json` on disk.
//! Cross-session operations never hold more than one session lock.

use super::{Session, SessionMetadata, SessionStatus, SessionSummary};
use crate::error::{ErrorKind, FailureRecord, Result, VidereError};
use crate::generate::DocPayload;
use crate::store::{ArtifactStore, KeyframeEntry};
use crate::transcription::TranscriptSegment;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SESSION_FILE: &str = "session.json";

struct SessionHandle {
    state: Mutex<Session>,
    cancel: CancellationToken,
}

/// Sole authority for session state.
pub struct SessionManager {
    store: Arc<ArtifactStore>,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    stale_after: Duration,
    retention_memory: Duration,
    retention_disk: Option<Duration>,
    grace_window: Duration,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(store: Arc<ArtifactStore>, stale_after: Duration, retention_memory: Duration) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            stale_after,
            retention_memory,
            retention_disk: None,
            grace_window: Duration::from_secs(5),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the grace window adapters get to abandon work after a
    /// cancel signal.
    pub fn with_grace_window(mut self, window: Duration) -> Self {
        self.grace_window = window;
        self
    }

    /// Enable on-disk retention. Terminal sessions whose records are
    /// older than the window are deleted by the sweeper; `None` keeps
    /// them forever.
    pub fn with_disk_retention(mut self, window: Option<Duration>) -> Self {
        self.retention_disk = window;
        self
    }

    /// Create a new session. `id` must be unused; pass `None` to generate
    /// one.
    pub async fn create(&self, id: Option<String>, metadata: SessionMetadata) -> Result<Session> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(&id) {
                return Err(VidereError::Session(format!("session id in use: {}", id)));
            }
        }
        if self.store.exists(&id) {
            return Err(VidereError::Session(format!("session id in use: {}", id)));
        }

        let session = Session::new(id.clone(), metadata);
        self.persist(&session)?;

        let handle = Arc::new(SessionHandle {
            state: Mutex::new(session.clone()),
            cancel: CancellationToken::new(),
        });
        self.sessions.write().await.insert(id.clone(), handle);

        info!("Created session {}", id);
        Ok(session)
    }

    /// Move a session to `queued`.
    pub async fn enqueue(&self, id: &str) -> Result<Session> {
        self.mutate(id, |session| {
            match session.status {
                SessionStatus::Draft => {
                    session.status = SessionStatus::Queued;
                    session.stage_label = "queued".to_string();
                    Ok(())
                }
                SessionStatus::Queued => Ok(()),
                other => Err(VidereError::Session(format!(
                    "cannot enqueue session in state {}",
                    other
                ))),
            }
        })
        .await
    }

    /// Transition `draft|queued -> running`. Idempotent while running.
    pub async fn claim(&self, id: &str) -> Result<Session> {
        self.mutate(id, |session| match session.status {
            SessionStatus::Draft | SessionStatus::Queued => {
                session.status = SessionStatus::Running;
                session.progress = 0;
                session.stage_label = "starting".to_string();
                Ok(())
            }
            SessionStatus::Running => Ok(()),
            other => Err(VidereError::Session(format!(
                "cannot claim session in state {}",
                other
            ))),
        })
        .await
    }

    /// Publish stage progress. Rejects updates on non-running sessions and
    /// regressions; progress 100 is reserved for [`Self::complete`].
    pub async fn update_progress(&self, id: &str, stage_label: &str, progress: u8) -> Result<()> {
        let progress = progress.min(99);
        self.mutate(id, |session| {
            if session.status != SessionStatus::Running {
                return Err(VidereError::Session(format!(
                    "cannot update progress in state {}",
                    session.status
                )));
            }
            if progress < session.progress {
                return Err(VidereError::Session(format!(
                    "non-monotone progress update: {} -> {}",
                    session.progress, progress
                )));
            }
            session.progress = progress;
            session.stage_label = stage_label.to_string();
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Record the final document and mark the session completed.
    pub async fn complete(
        &self,
        id: &str,
        doc_payload: DocPayload,
        artifact_paths: BTreeMap<String, String>,
        transcript_segments: Vec<TranscriptSegment>,
        keyframes: Vec<KeyframeEntry>,
        stt_adapter_used: Option<String>,
    ) -> Result<Session> {
        self.mutate(id, move |session| {
            if session.status != SessionStatus::Running {
                return Err(VidereError::Session(format!(
                    "cannot complete session in state {}",
                    session.status
                )));
            }
            session.status = SessionStatus::Completed;
            session.progress = 100;
            session.stage_label = "completed".to_string();
            session.doc_payload = Some(doc_payload.clone());
            session.artifact_paths = artifact_paths.clone();
            session.transcript_segments = transcript_segments.clone();
            session.keyframes = keyframes.clone();
            session.stt_adapter_used = stt_adapter_used.clone();
            Ok(())
        })
        .await
    }

    /// Terminal failure with a structured record.
    pub async fn fail(&self, id: &str, kind: ErrorKind, message: &str, stage: &str) -> Result<Session> {
        let id_owned = id.to_string();
        self.mutate(id, move |session| {
            if session.status.is_terminal() {
                return Err(VidereError::Session(format!(
                    "session already terminal: {}",
                    session.status
                )));
            }
            session.status = SessionStatus::Failed;
            session.stage_label = "failed".to_string();
            session.error = Some(FailureRecord {
                kind,
                message: message.to_string(),
                stage: stage.to_string(),
                session_id: id_owned.clone(),
            });
            Ok(())
        })
        .await
    }

    /// Request cancellation. Trips the session's cancel token; a queued
    /// session is cancelled on the spot, a running one transitions at the
    /// orchestrator's next checkpoint. A watchdog forces the transition
    /// if the checkpoint never comes within the grace window.
    pub async fn cancel(self: &Arc<Self>, id: &str) -> Result<bool> {
        let handle = self.handle(id).await?;
        let mut session = handle.state.lock().await;

        match session.status {
            SessionStatus::Queued | SessionStatus::Draft => {
                handle.cancel.cancel();
                session.status = SessionStatus::Cancelled;
                session.stage_label = "cancelled".to_string();
                session.last_updated = Utc::now();
                self.persist(&session)?;
                info!("Session {} cancelled before start", id);
                Ok(true)
            }
            SessionStatus::Running => {
                handle.cancel.cancel();
                info!("Cancellation requested for running session {}", id);
                drop(session);

                let manager = Arc::clone(self);
                let session_id = id.to_string();
                let grace = self.grace_window + Duration::from_secs(1);
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Ok(session) = manager.get(&session_id).await {
                        if session.status == SessionStatus::Running {
                            warn!(
                                "Session {} ignored the cancel signal, forcing transition",
                                session_id
                            );
                            let _ = manager.mark_cancelled(&session_id).await;
                        }
                    }
                });
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Orchestrator acknowledgment of an observed cancel signal.
    pub async fn mark_cancelled(&self, id: &str) -> Result<Session> {
        self.mutate(id, |session| {
            if session.status.is_terminal() {
                return Ok(());
            }
            session.status = SessionStatus::Cancelled;
            session.stage_label = "cancelled".to_string();
            Ok(())
        })
        .await
    }

    /// The cancel token observed by the orchestrator and adapters.
    pub async fn cancel_token(&self, id: &str) -> Result<CancellationToken> {
        Ok(self.handle(id).await?.cancel.clone())
    }

    /// Fetch a session, falling back to disk on cache miss.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let handle = self.handle(id).await?;
        let state = handle.state.lock().await.clone();
        Ok(state)
    }

    /// List sessions, optionally filtered by status. Merges the in-memory
    /// cache with what is persisted on disk.
    pub async fn list(&self, filter: Option<SessionStatus>) -> Result<Vec<SessionSummary>> {
        let mut by_id: BTreeMap<String, SessionSummary> = BTreeMap::new();

        for id in self.store.list_sessions()? {
            if let Ok(session) = self.store.get_json::<Session>(&id, SESSION_FILE) {
                by_id.insert(id, session.summary());
            }
        }

        {
            let sessions = self.sessions.read().await;
            for (id, handle) in sessions.iter() {
                let session = handle.state.lock().await;
                by_id.insert(id.clone(), session.summary());
            }
        }

        let mut summaries: Vec<SessionSummary> = by_id
            .into_values()
            .filter(|s| filter.map(|f| s.status == f).unwrap_or(true))
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// The most recently active non-terminal session, if any.
    pub async fn get_active(&self) -> Result<Option<Session>> {
        let ids: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        let mut best: Option<Session> = None;
        for id in ids {
            let session = self.get(&id).await?;
            if session.status.is_terminal() {
                continue;
            }
            let newer = best
                .as_ref()
                .map(|b| session.last_updated > b.last_updated)
                .unwrap_or(true);
            if newer {
                best = Some(session);
            }
        }
        Ok(best)
    }

    /// Fail running sessions whose heartbeat has gone stale. Returns the
    /// ids that were reclaimed.
    pub async fn sweep_zombies(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        let stale =
            chrono::Duration::from_std(self.stale_after).unwrap_or(chrono::Duration::seconds(600));
        let mut reclaimed = Vec::new();

        for id in ids {
            let handle = match self.handle(&id).await {
                Ok(handle) => handle,
                Err(_) => continue,
            };
            let mut session = handle.state.lock().await;
            if session.status == SessionStatus::Running
                && Utc::now() - session.last_updated > stale
            {
                warn!("Zombie session detected: {}", id);
                session.status = SessionStatus::Failed;
                session.stage_label = "failed".to_string();
                session.error = Some(FailureRecord {
                    kind: ErrorKind::StaleTimeout,
                    message: "session heartbeat went stale".to_string(),
                    stage: session.stage_label.clone(),
                    session_id: id.clone(),
                });
                session.last_updated = Utc::now();
                handle.cancel.cancel();
                self.persist(&session)?;
                reclaimed.push(id);
            }
        }

        self.evict_idle().await;
        self.enforce_disk_retention().await?;
        Ok(reclaimed)
    }

    /// Delete terminal session directories older than the disk retention
    /// window, when one is configured.
    async fn enforce_disk_retention(&self) -> Result<()> {
        let Some(window) = self.retention_disk else {
            return Ok(());
        };
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::days(365));
        let now = Utc::now();

        for id in self.store.list_sessions()? {
            let Ok(session) = self.store.get_json::<Session>(&id, SESSION_FILE) else {
                continue;
            };
            if session.status.is_terminal() && now - session.last_updated > window {
                debug!("Disk retention expired for session {}", id);
                self.store.delete(&id)?;
                self.sessions.write().await.remove(&id);
            }
        }
        Ok(())
    }

    /// Spawn the periodic zombie sweeper. Cancelled by
    /// [`Self::shutdown`].
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.sweep_zombies().await {
                            warn!("Zombie sweep failed: {}", e);
                        }
                    }
                    _ = manager.shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Stop the sweeper task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Drop terminal sessions that have been idle past the memory
    /// retention window. Disk records are untouched.
    async fn evict_idle(&self) {
        let retention = chrono::Duration::from_std(self.retention_memory)
            .unwrap_or(chrono::Duration::seconds(3600));
        let now = Utc::now();

        let mut evict = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, handle) in sessions.iter() {
                let session = handle.state.lock().await;
                if session.status.is_terminal() && now - session.last_updated > retention {
                    evict.push(id.clone());
                }
            }
        }

        if !evict.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in evict {
                debug!("Evicting idle session {} from memory", id);
                sessions.remove(&id);
            }
        }
    }

    async fn handle(&self, id: &str) -> Result<Arc<SessionHandle>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(id) {
                return Ok(handle.clone());
            }
        }

        // Cache miss: rehydrate from disk.
        let session: Session = self
            .store
            .get_json(id, SESSION_FILE)
            .map_err(|_| VidereError::Session(format!("unknown session: {}", id)))?;

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionHandle {
                    state: Mutex::new(session),
                    cancel: CancellationToken::new(),
                })
            })
            .clone();
        Ok(handle)
    }

    async fn mutate<F>(&self, id: &str, f: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let handle = self.handle(id).await?;
        let mut session = handle.state.lock().await;
        f(&mut session)?;
        session.last_updated = Utc::now();
        self.persist(&session)?;
        Ok(session.clone())
    }

    fn persist(&self, session: &Session) -> Result<()> {
        self.store.put_json(&session.id, SESSION_FILE, session)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionSource;
    use std::path::PathBuf;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            mode: "general_doc".to_string(),
            title: "Test".to_string(),
            language: None,
            stt_preference: Default::default(),
            source: SessionSource::Local {
                path: PathBuf::from("/tmp/in.mp4"),
            },
        }
    }

    fn manager() -> (tempfile::TempDir, Arc<SessionManager>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("sessions")).unwrap());
        let manager = Arc::new(SessionManager::new(
            store,
            Duration::from_secs(600),
            Duration::from_secs(3600),
        ));
        (dir, manager)
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let (_dir, manager) = manager();
        let session = manager.create(None, metadata()).await.unwrap();
        assert_eq!(session.status, SessionStatus::Draft);

        manager.enqueue(&session.id).await.unwrap();
        let claimed = manager.claim(&session.id).await.unwrap();
        assert_eq!(claimed.status, SessionStatus::Running);

        manager.update_progress(&session.id, "probe", 5).await.unwrap();
        manager.update_progress(&session.id, "proxy", 15).await.unwrap();

        let done = manager
            .complete(
                &session.id,
                DocPayload {
                    format: Default::default(),
                    content: "# Doc".to_string(),
                },
                BTreeMap::new(),
                vec![],
                vec![],
                Some("local".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.progress, 100);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (_dir, manager) = manager();
        manager.create(Some("dup".to_string()), metadata()).await.unwrap();
        assert!(manager.create(Some("dup".to_string()), metadata()).await.is_err());
    }

    #[tokio::test]
    async fn test_progress_rejects_regression() {
        let (_dir, manager) = manager();
        let session = manager.create(None, metadata()).await.unwrap();
        manager.claim(&session.id).await.unwrap();
        manager.update_progress(&session.id, "transcribe", 35).await.unwrap();

        let err = manager.update_progress(&session.id, "probe", 5).await;
        assert!(err.is_err());

        // Equal progress is allowed (throttled re-publish of a stage).
        manager.update_progress(&session.id, "transcribe", 35).await.unwrap();
    }

    #[tokio::test]
    async fn test_progress_rejected_after_terminal() {
        let (_dir, manager) = manager();
        let session = manager.create(None, metadata()).await.unwrap();
        manager.claim(&session.id).await.unwrap();
        manager
            .fail(&session.id, ErrorKind::Internal, "boom", "generate")
            .await
            .unwrap();

        assert!(manager.update_progress(&session.id, "late", 90).await.is_err());
    }

    #[tokio::test]
    async fn test_claim_is_idempotent_while_running() {
        let (_dir, manager) = manager();
        let session = manager.create(None, metadata()).await.unwrap();
        manager.claim(&session.id).await.unwrap();
        let again = manager.claim(&session.id).await.unwrap();
        assert_eq!(again.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_cancel_queued_session() {
        let (_dir, manager) = manager();
        let session = manager.create(None, metadata()).await.unwrap();
        manager.enqueue(&session.id).await.unwrap();

        assert!(manager.cancel(&session.id).await.unwrap());
        let cancelled = manager.get(&session.id).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert!(manager.cancel_token(&session.id).await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_running_trips_token_only() {
        let (_dir, manager) = manager();
        let session = manager.create(None, metadata()).await.unwrap();
        manager.claim(&session.id).await.unwrap();

        assert!(manager.cancel(&session.id).await.unwrap());
        let current = manager.get(&session.id).await.unwrap();
        assert_eq!(current.status, SessionStatus::Running);
        assert!(manager.cancel_token(&session.id).await.unwrap().is_cancelled());

        manager.mark_cancelled(&session.id).await.unwrap();
        let cancelled = manager.get(&session.id).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_disk_fallback_after_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("sessions")).unwrap());

        let id = {
            let manager = Arc::new(SessionManager::new(
                store.clone(),
                Duration::from_secs(600),
                Duration::from_secs(3600),
            ));
            manager.create(None, metadata()).await.unwrap().id
        };

        // A fresh manager only has the disk record.
        let manager = Arc::new(SessionManager::new(
            store,
            Duration::from_secs(600),
            Duration::from_secs(3600),
        ));
        let loaded = manager.get(&id).await.unwrap();
        assert_eq!(loaded.id, id);
    }

    #[tokio::test]
    async fn test_zombie_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("sessions")).unwrap());
        let manager = Arc::new(SessionManager::new(
            store,
            Duration::from_millis(10),
            Duration::from_secs(3600),
        ));

        let session = manager.create(None, metadata()).await.unwrap();
        manager.claim(&session.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let reclaimed = manager.sweep_zombies().await.unwrap();
        assert_eq!(reclaimed, vec![session.id.clone()]);

        let failed = manager.get(&session.id).await.unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.error.as_ref().unwrap().kind, ErrorKind::StaleTimeout);
    }

    #[tokio::test]
    async fn test_disk_retention_deletes_old_terminal_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("sessions")).unwrap());
        let manager = Arc::new(
            SessionManager::new(
                store.clone(),
                Duration::from_secs(600),
                Duration::from_secs(3600),
            )
            .with_disk_retention(Some(Duration::from_millis(10))),
        );

        let session = manager.create(None, metadata()).await.unwrap();
        manager.claim(&session.id).await.unwrap();
        manager
            .fail(&session.id, ErrorKind::Internal, "boom", "probe")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.sweep_zombies().await.unwrap();
        assert!(!store.exists(&session.id));

        // A running session is never reaped by disk retention.
        let live = manager.create(None, metadata()).await.unwrap();
        manager.claim(&live.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.sweep_zombies().await.unwrap();
        assert!(store.exists(&live.id));
    }

    #[tokio::test]
    async fn test_get_active_prefers_most_recent() {
        let (_dir, manager) = manager();
        let a = manager.create(None, metadata()).await.unwrap();
        manager.claim(&a.id).await.unwrap();

        let b = manager.create(None, metadata()).await.unwrap();
        manager.claim(&b.id).await.unwrap();
        manager.update_progress(&b.id, "probe", 5).await.unwrap();

        let active = manager.get_active().await.unwrap().unwrap();
        assert_eq!(active.id, b.id);
    }
}
