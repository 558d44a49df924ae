use crate::{EmsError, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

pub type SessionId = usize;

/// Addresses of the two endpoints a client created before connecting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionEndpoints {
    pub request: PathBuf,
    pub response: PathBuf,
}

impl SessionEndpoints {
    pub fn new(request: impl Into<PathBuf>, response: impl Into<PathBuf>) -> Self {
        Self {
            request: request.into(),
            response: response.into(),
        }
    }
}

/// Lifecycle of one client session as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub endpoints: SessionEndpoints,
}

struct SessionSlot {
    endpoints: SessionEndpoints,
    // Returned to the pool when the slot is cleared.
    _permit: OwnedSemaphorePermit,
}

/// Bounded registry of active sessions.
///
/// A slot is either empty or holds the endpoints of one session together
/// with the admission permit it consumed, so the id pool and the endpoint
/// map live in one vector under one lock and cannot disagree.
pub struct SessionTable {
    permits: Arc<Semaphore>,
    slots: Mutex<Vec<Option<SessionSlot>>>,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Option<SessionSlot>>> {
        // Slot updates never panic halfway, so a poisoned guard is still consistent.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.slots().len()
    }

    /// Takes the lowest free id, waiting for a release while the pool is full.
    pub async fn allocate(&self, endpoints: SessionEndpoints) -> Result<SessionId> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EmsError::TransportFailure("session table closed".to_string()))?;
        self.install(endpoints, permit)
    }

    /// Like `allocate`, but fails with `PoolExhausted` instead of waiting.
    pub fn try_allocate(&self, endpoints: SessionEndpoints) -> Result<SessionId> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| EmsError::PoolExhausted)?;
        self.install(endpoints, permit)
    }

    fn install(&self, endpoints: SessionEndpoints, permit: OwnedSemaphorePermit) -> Result<SessionId> {
        let mut slots = self.slots();
        let id = slots
            .iter()
            .position(Option::is_none)
            .ok_or(EmsError::PoolExhausted)?;

        slots[id] = Some(SessionSlot {
            endpoints,
            _permit: permit,
        });

        info!(session_id = id, "Session allocated");
        Ok(id)
    }

    /// Frees `id`. Returns false if it was not active.
    pub fn release(&self, id: SessionId) -> bool {
        let released = self
            .slots()
            .get_mut(id)
            .and_then(Option::take)
            .is_some();

        if released {
            info!(session_id = id, "Session released");
        } else {
            debug!(session_id = id, "Release of inactive session ignored");
        }
        released
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        matches!(self.slots().get(id), Some(Some(_)))
    }

    pub fn endpoints(&self, id: SessionId) -> Option<SessionEndpoints> {
        self.slots()
            .get(id)
            .and_then(Option::as_ref)
            .map(|slot| slot.endpoints.clone())
    }

    pub fn active_count(&self) -> usize {
        self.slots().iter().filter(|slot| slot.is_some()).count()
    }

    /// Point-in-time copy of the active sessions, in id order.
    pub fn snapshot(&self) -> SessionSnapshot {
        let sessions = self
            .slots()
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| {
                slot.as_ref().map(|slot| SessionInfo {
                    id,
                    endpoints: slot.endpoints.clone(),
                })
            })
            .collect();
        SessionSnapshot { sessions }
    }

    /// Wakes every pending `allocate` with an error and refuses new ones.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// Sessions active when the snapshot was taken. Can be iterated any number of times.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    sessions: Vec<SessionInfo>,
}

impl SessionSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, SessionInfo> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.iter().map(|session| session.id)
    }
}

impl<'a> IntoIterator for &'a SessionSnapshot {
    type Item = &'a SessionInfo;
    type IntoIter = std::slice::Iter<'a, SessionInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn endpoints(n: usize) -> SessionEndpoints {
        SessionEndpoints::new(format!("/tmp/req{}", n), format!("/tmp/resp{}", n))
    }

    #[tokio::test]
    async fn allocates_lowest_free_id() {
        let table = SessionTable::new(3);
        assert_eq!(table.allocate(endpoints(0)).await.unwrap(), 0);
        assert_eq!(table.allocate(endpoints(1)).await.unwrap(), 1);
        assert_eq!(table.allocate(endpoints(2)).await.unwrap(), 2);

        assert!(table.release(1));
        assert_eq!(table.allocate(endpoints(3)).await.unwrap(), 1);
        assert_eq!(table.endpoints(1), Some(endpoints(3)));
    }

    #[test]
    fn release_is_idempotent() {
        let table = SessionTable::new(2);
        let id = table.try_allocate(endpoints(0)).unwrap();

        assert!(table.release(id));
        assert!(!table.release(id));
        assert!(!table.release(99));
        assert_eq!(table.active_count(), 0);
        assert_eq!(table.endpoints(id), None);
    }

    #[test]
    fn try_allocate_reports_exhaustion() {
        let table = SessionTable::new(1);
        table.try_allocate(endpoints(0)).unwrap();
        assert!(matches!(table.try_allocate(endpoints(1)), Err(EmsError::PoolExhausted)));
    }

    #[tokio::test]
    async fn allocate_waits_for_release() {
        let table = Arc::new(SessionTable::new(1));
        let first = table.allocate(endpoints(0)).await.unwrap();

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.allocate(endpoints(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        table.release(first);
        let second = waiter.await.unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(table.endpoints(second), Some(endpoints(1)));
    }

    #[tokio::test]
    async fn close_wakes_pending_allocations() {
        let table = Arc::new(SessionTable::new(1));
        table.allocate(endpoints(0)).await.unwrap();

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.allocate(endpoints(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        table.close();
        assert!(waiter.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn snapshot_is_restartable() {
        let table = SessionTable::new(4);
        table.allocate(endpoints(0)).await.unwrap();
        table.allocate(endpoints(1)).await.unwrap();
        table.allocate(endpoints(2)).await.unwrap();
        table.release(1);

        let snapshot = table.snapshot();
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!((&snapshot).into_iter().count(), 2);

        table.release(0);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(table.snapshot().len(), 1);
    }
}
