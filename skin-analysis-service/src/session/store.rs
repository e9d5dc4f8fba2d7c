use super::state::{AnalysisSession, SessionError, SessionView};
use crate::services::analysis::AnalysisService;
use crate::services::metrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How a session-bound analysis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Completed,
    Failed,
    /// The image changed while the analysis ran; the result was dropped.
    Discarded,
}

pub struct SessionEntry {
    id: Uuid,
    created_at: DateTime<Utc>,
    session: Mutex<AnalysisSession>,
    last_seen: Mutex<Instant>,
}

impl SessionEntry {
    fn new(max_upload_bytes: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            session: Mutex::new(AnalysisSession::new(max_upload_bytes)),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // A panic while holding the lock leaves the state consistent enough to keep serving.
    fn lock(&self) -> MutexGuard<'_, AnalysisSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Run `f` against the session state. The lock is released before returning.
    pub fn with<R>(&self, f: impl FnOnce(&mut AnalysisSession) -> R) -> R {
        self.touch();
        let mut session = self.lock();
        f(&mut session)
    }

    pub fn view(&self) -> SessionView {
        self.touch();
        self.lock().view(self.id, self.created_at)
    }

    /// Analyze the current image and apply the result to this session.
    pub async fn run_analysis(
        &self,
        service: &AnalysisService,
    ) -> Result<AnalysisOutcome, SessionError> {
        let ticket = self.with(|s| s.begin_analysis())?;

        tracing::info!(session_id = %self.id, "Starting session analysis");

        let result = service
            .get_analysis_and_healing_visuals(&ticket.image_base64, ticket.mime_type)
            .await;
        let failed = result.is_err();

        let applied = self.with(|s| s.complete_analysis(&ticket, result));

        let outcome = match (applied, failed) {
            (false, _) => AnalysisOutcome::Discarded,
            (true, true) => AnalysisOutcome::Failed,
            (true, false) => AnalysisOutcome::Completed,
        };
        tracing::info!(session_id = %self.id, outcome = ?outcome, "Session analysis finished");
        Ok(outcome)
    }
}

/// In-memory sessions keyed by id.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<Uuid, Arc<SessionEntry>>>,
    max_upload_bytes: usize,
}

impl SessionStore {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            max_upload_bytes,
        }
    }

    pub fn create(&self) -> Arc<SessionEntry> {
        let entry = Arc::new(SessionEntry::new(self.max_upload_bytes));
        self.sessions.insert(entry.id, entry.clone());
        metrics::set_active_sessions(self.sessions.len());
        tracing::debug!(session_id = %entry.id, "Session created");
        entry
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            metrics::set_active_sessions(self.sessions.len());
            tracing::debug!(session_id = %id, "Session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions untouched for longer than `idle`. Sessions with an
    /// analysis still running are kept.
    pub fn sweep_idle(&self, idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| entry.idle_for() <= idle || entry.lock().is_loading());
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            tracing::info!(removed, remaining = self.sessions.len(), "Swept idle sessions");
        }
        metrics::set_active_sessions(self.sessions.len());
        removed
    }

    /// Periodically sweep idle sessions until the runtime shuts down.
    pub fn spawn_sweeper(&self, idle: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let period = (idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                store.sweep_idle(idle);
            }
        })
    }
}
