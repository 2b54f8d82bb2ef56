use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ledgerscan_core::{ExtractionTicket, Session, SessionError};
use thiserror::Error;
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<Session>>;

/// Session guards are never held across an `.await`. That keeps index-based
/// deletes serialized per session without blocking the runtime.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Sessions untouched for this long are dropped on the next registry access.
    pub idle_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_SESSION_IDLE,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Session limit reached ({max} open sessions)")]
pub struct RegistryFull {
    pub max: usize,
}

#[derive(Debug)]
struct Entry {
    session: SharedSession,
    last_touched: Instant,
}

/// Independent sessions keyed by id. Nothing is shared between entries.
/// Idle sessions are evicted lazily; a busy session is never evicted.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Entry>>,
    limits: SessionLimits,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: Mutex::default(),
            limits,
        }
    }

    pub fn create(&self) -> Result<Uuid, RegistryFull> {
        let now = Instant::now();
        let mut map = self.map();
        self.evict_idle(&mut map, now);
        if map.len() >= self.limits.max_sessions {
            tracing::warn!(open = map.len(), "session limit reached");
            return Err(RegistryFull {
                max: self.limits.max_sessions,
            });
        }

        let id = Uuid::new_v4();
        map.insert(
            id,
            Entry {
                session: Arc::new(Mutex::new(Session::new())),
                last_touched: now,
            },
        );
        tracing::info!(session = %id, "session created");
        Ok(id)
    }

    /// Looks up a live session and marks it as used.
    pub fn get(&self, id: Uuid) -> Option<SharedSession> {
        let now = Instant::now();
        let mut map = self.map();
        self.evict_idle(&mut map, now);
        let entry = map.get_mut(&id)?;
        entry.last_touched = now;
        Some(Arc::clone(&entry.session))
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.map().remove(&id).is_some();
        if removed {
            tracing::info!(session = %id, "session closed");
        }
        removed
    }

    /// Drops every idle session as of `now`. Returns how many were evicted.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut map = self.map();
        self.evict_idle(&mut map, now)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_idle(&self, map: &mut HashMap<Uuid, Entry>, now: Instant) -> usize {
        let before = map.len();
        let idle_timeout = self.limits.idle_timeout;
        map.retain(|id, entry| {
            let idle = now.saturating_duration_since(entry.last_touched) >= idle_timeout;
            let keep = !idle || lock(&entry.session).is_busy();
            if !keep {
                tracing::info!(session = %id, "idle session evicted");
            }
            keep
        });
        before - map.len()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared by every request handler.
pub struct AppState<E> {
    pub sessions: Arc<SessionRegistry>,
    pub extractor: Arc<E>,
}

impl<E> AppState<E> {
    pub fn new(extractor: E) -> Self {
        Self::with_limits(extractor, SessionLimits::default())
    }

    pub fn with_limits(extractor: E, limits: SessionLimits) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::with_limits(limits)),
            extractor: Arc::new(extractor),
        }
    }
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

/// Owns the ticket of a running extraction. Dropping it unsettled (the request
/// future was cancelled) abandons the extraction: busy clears, the store stays as is.
pub struct InFlight {
    session: SharedSession,
    ticket: Option<ExtractionTicket>,
}

impl InFlight {
    pub fn begin(session: SharedSession) -> Result<Self, SessionError> {
        let ticket = lock(&session).begin_extraction()?;
        Ok(Self {
            session,
            ticket: Some(ticket),
        })
    }

    pub fn finish<R>(
        mut self,
        settle: impl FnOnce(&mut Session, ExtractionTicket) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let ticket = self.ticket.take().ok_or(SessionError::StaleTicket)?;
        let mut session = lock(&self.session);
        settle(&mut session, ticket)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            tracing::warn!(generation = ticket.generation(), "extraction cancelled");
            lock(&self.session).abandon_extraction(ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_isolates_sessions() {
        let registry = SessionRegistry::new();
        let a = registry.create().unwrap();
        let b = registry.create().unwrap();
        assert_ne!(a, b);

        let session_a = registry.get(a).unwrap();
        let _ticket = lock(&session_a).begin_extraction().unwrap();

        assert!(lock(&session_a).is_busy());
        assert!(!lock(&registry.get(b).unwrap()).is_busy());
    }

    #[test]
    fn remove_forgets_session() {
        let registry = SessionRegistry::new();
        let id = registry.create().unwrap();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    fn limits(idle_secs: u64, max_sessions: usize) -> SessionLimits {
        SessionLimits {
            idle_timeout: Duration::from_secs(idle_secs),
            max_sessions,
        }
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let registry = SessionRegistry::with_limits(limits(60, 100));
        let stale = registry.create().unwrap();
        let fresh = registry.create().unwrap();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.sweep(Instant::now()), 0);
        assert_eq!(registry.sweep(Instant::now() + Duration::from_secs(61)), 2);
        assert!(registry.get(stale).is_none());
        assert!(registry.get(fresh).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn busy_sessions_survive_eviction() {
        let registry = SessionRegistry::with_limits(limits(60, 100));
        let busy = registry.create().unwrap();
        let idle = registry.create().unwrap();
        let session = registry.get(busy).unwrap();
        let _ticket = lock(&session).begin_extraction().unwrap();

        assert_eq!(registry.sweep(Instant::now() + Duration::from_secs(120)), 1);
        assert!(registry.get(busy).is_some());
        assert!(registry.get(idle).is_none());
    }

    #[test]
    fn repeated_creates_stop_at_the_limit() {
        let registry = SessionRegistry::with_limits(limits(3600, 3));
        for _ in 0..3 {
            registry.create().unwrap();
        }
        assert_eq!(registry.create(), Err(RegistryFull { max: 3 }));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn zero_idle_timeout_recycles_slots() {
        let registry = SessionRegistry::with_limits(limits(0, 1));
        for _ in 0..10_000 {
            registry.create().unwrap();
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dropping_in_flight_abandons() {
        let session: SharedSession = Arc::new(Mutex::new(Session::new()));
        let in_flight = InFlight::begin(Arc::clone(&session)).unwrap();
        assert!(lock(&session).is_busy());
        assert!(matches!(
            InFlight::begin(Arc::clone(&session)),
            Err(SessionError::Busy)
        ));

        drop(in_flight);

        assert!(!lock(&session).is_busy());
        assert_eq!(lock(&session).count(), 0);
    }

    #[test]
    fn finish_settles_without_abandon() {
        let session: SharedSession = Arc::new(Mutex::new(Session::new()));
        let in_flight = InFlight::begin(Arc::clone(&session)).unwrap();
        let notice = in_flight
            .finish(|s, ticket| s.complete_extraction(ticket, Vec::new()))
            .unwrap();
        assert!(notice.is_some());
        assert!(!lock(&session).is_busy());
    }
}
