use crate::{EmsError, GridView, Result, Seat, SeatGrid};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Ordered collection of events.
///
/// The outer lock only guards membership: `create` takes it exclusively,
/// lookups share it. Seat operations resolve their grid, drop the outer
/// lock and then work under the grid's own lock, so a slow reservation on
/// one event never holds up lookups of the others.
#[derive(Debug)]
pub struct EventStore {
    events: RwLock<Vec<Arc<SeatGrid>>>,
    access_delay: Duration,
}

impl EventStore {
    pub fn new(access_delay: Duration) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            access_delay,
        }
    }

    /// Store with no artificial lookup latency.
    pub fn without_delay() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn access_delay(&self) -> Duration {
        self.access_delay
    }

    /// Simulates a costly backing-store access before every lookup.
    async fn simulate_access(&self) {
        if !self.access_delay.is_zero() {
            tokio::time::sleep(self.access_delay).await;
        }
    }

    fn find(events: &[Arc<SeatGrid>], event_id: u32) -> Option<&Arc<SeatGrid>> {
        events.iter().find(|grid| grid.id() == event_id)
    }

    pub async fn create(&self, event_id: u32, rows: usize, cols: usize) -> Result<()> {
        let mut events = self.events.write().await;

        self.simulate_access().await;
        if Self::find(&events, event_id).is_some() {
            return Err(EmsError::AlreadyExists(event_id));
        }

        let grid = SeatGrid::new(event_id, rows, cols)?;
        events.push(Arc::new(grid));

        info!(event_id, rows, cols, "Event created");
        Ok(())
    }

    pub async fn get(&self, event_id: u32) -> Result<Arc<SeatGrid>> {
        let events = self.events.read().await;

        self.simulate_access().await;
        Self::find(&events, event_id)
            .cloned()
            .ok_or(EmsError::NotFound(event_id))
    }

    /// Event ids in creation order.
    pub async fn list(&self) -> Vec<u32> {
        let events = self.events.read().await;
        events.iter().map(|grid| grid.id()).collect()
    }

    pub async fn reserve(&self, event_id: u32, seats: &[Seat]) -> Result<u32> {
        let grid = self.get(event_id).await?;
        let reservation_id = grid.reserve(seats).await?;

        debug!(event_id, reservation_id, seats = seats.len(), "Seats reserved");
        Ok(reservation_id)
    }

    pub async fn show(&self, event_id: u32) -> Result<GridView> {
        let grid = self.get(event_id).await?;
        Ok(grid.show().await)
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Drops every event. Waits for in-flight structural operations to finish.
    pub async fn terminate(&self) {
        let mut events = self.events.write().await;
        let count = events.len();
        events.clear();
        info!(count, "Event store torn down");
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::without_delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_list_in_insertion_order() {
        let store = EventStore::without_delay();
        store.create(7, 1, 1).await.unwrap();
        store.create(3, 2, 2).await.unwrap();
        store.create(5, 1, 4).await.unwrap();

        assert_eq!(store.list().await, vec![7, 3, 5]);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn duplicate_create_keeps_original() {
        let store = EventStore::without_delay();
        store.create(1, 2, 3).await.unwrap();
        store.reserve(1, &[Seat::new(1, 1)]).await.unwrap();

        let err = store.create(1, 9, 9).await.unwrap_err();
        assert!(matches!(err, EmsError::AlreadyExists(1)));

        let view = store.show(1).await.unwrap();
        assert_eq!((view.rows, view.cols), (2, 3));
        assert_eq!(view.seat(Seat::new(1, 1)), Some(1));
        assert_eq!(store.list().await, vec![1]);
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let store = EventStore::without_delay();
        assert!(matches!(store.get(4).await, Err(EmsError::NotFound(4))));
        assert!(matches!(store.show(4).await, Err(EmsError::NotFound(4))));
        assert!(matches!(
            store.reserve(4, &[Seat::new(1, 1)]).await,
            Err(EmsError::NotFound(4))
        ));
    }

    #[tokio::test]
    async fn invalid_dimensions_leave_store_unchanged() {
        let store = EventStore::without_delay();
        assert!(store.create(1, 0, 5).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_honor_access_delay() {
        let store = EventStore::new(Duration::from_millis(50));
        store.create(1, 1, 1).await.unwrap();

        let started = tokio::time::Instant::now();
        store.get(1).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn terminate_clears_events() {
        let store = EventStore::without_delay();
        store.create(1, 1, 1).await.unwrap();
        store.terminate().await;
        assert!(store.list().await.is_empty());
    }
}
