use crate::{EmsError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Seat value for a cell nobody has claimed yet.
pub const FREE_SEAT: u32 = 0;

/// Largest number of seats a single event may hold.
pub const MAX_SEATS: usize = 1 << 24;

/// A seat coordinate, 1-based on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seat {
    pub row: usize,
    pub col: usize,
}

impl Seat {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Consistent copy of a grid taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridView {
    pub rows: usize,
    pub cols: usize,
    pub seats: Vec<Vec<u32>>,
}

impl GridView {
    pub fn seat(&self, seat: Seat) -> Option<u32> {
        self.seats
            .get(seat.row.checked_sub(1)?)
            .and_then(|row| row.get(seat.col.checked_sub(1)?))
            .copied()
    }

    pub fn reserved_count(&self) -> usize {
        self.seats.iter().flatten().filter(|&&v| v != FREE_SEAT).count()
    }
}

#[derive(Debug)]
struct GridState {
    seats: Vec<u32>,
    reservations: u32,
}

/// One event's seating matrix. The seat contents and the reservation
/// counter live behind the same lock so they are always updated together.
#[derive(Debug)]
pub struct SeatGrid {
    id: u32,
    rows: usize,
    cols: usize,
    state: RwLock<GridState>,
}

impl SeatGrid {
    pub fn new(id: u32, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(EmsError::InvalidRequest(format!(
                "Event {} must have at least one row and one column",
                id
            )));
        }
        let too_large =
            || EmsError::InvalidRequest(format!("Event {} is too large: {}x{}", id, rows, cols));
        let capacity = rows
            .checked_mul(cols)
            .filter(|&seats| seats <= MAX_SEATS)
            .ok_or_else(too_large)?;

        let mut seats = Vec::new();
        seats.try_reserve_exact(capacity).map_err(|_| too_large())?;
        seats.resize(capacity, FREE_SEAT);

        Ok(Self {
            id,
            rows,
            cols,
            state: RwLock::new(GridState {
                seats,
                reservations: 0,
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Index of a seat in the flat seat vector. Assumes the seat is in bounds.
    fn seat_index(&self, seat: Seat) -> usize {
        (seat.row - 1) * self.cols + (seat.col - 1)
    }

    fn check_bounds(&self, seat: Seat) -> Result<()> {
        if seat.row == 0 || seat.row > self.rows || seat.col == 0 || seat.col > self.cols {
            return Err(EmsError::OutOfBounds {
                row: seat.row,
                col: seat.col,
            });
        }
        Ok(())
    }

    /// Reserves every seat in `seats` under one new reservation id, or none of them.
    pub async fn reserve(&self, seats: &[Seat]) -> Result<u32> {
        if seats.is_empty() {
            return Err(EmsError::InvalidRequest("No seats to reserve".to_string()));
        }

        let mut state = self.state.write().await;

        for seat in seats {
            self.check_bounds(*seat)?;
        }

        for seat in seats {
            if state.seats[self.seat_index(*seat)] != FREE_SEAT {
                return Err(EmsError::AlreadyReserved {
                    row: seat.row,
                    col: seat.col,
                });
            }
        }

        state.reservations += 1;
        let reservation_id = state.reservations;
        for seat in seats {
            let index = self.seat_index(*seat);
            state.seats[index] = reservation_id;
        }

        Ok(reservation_id)
    }

    pub async fn show(&self) -> GridView {
        let state = self.state.read().await;
        GridView {
            rows: self.rows,
            cols: self.cols,
            seats: state.seats.chunks(self.cols).map(<[u32]>::to_vec).collect(),
        }
    }

    pub async fn reservation_count(&self) -> u32 {
        self.state.read().await.reservations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_grid_is_empty() {
        let grid = SeatGrid::new(1, 2, 3).unwrap();
        let view = grid.show().await;

        assert_eq!(view.rows, 2);
        assert_eq!(view.cols, 3);
        assert_eq!(view.seats, vec![vec![0, 0, 0], vec![0, 0, 0]]);
        assert_eq!(grid.reservation_count().await, 0);
    }

    #[test]
    fn zero_sized_grid_is_rejected() {
        assert!(matches!(SeatGrid::new(1, 0, 3), Err(EmsError::InvalidRequest(_))));
        assert!(matches!(SeatGrid::new(1, 3, 0), Err(EmsError::InvalidRequest(_))));
    }

    #[test]
    fn oversized_grid_is_rejected() {
        assert!(matches!(
            SeatGrid::new(1, 1 << 31, 1 << 31),
            Err(EmsError::InvalidRequest(_))
        ));
        assert!(matches!(
            SeatGrid::new(1, usize::MAX, 2),
            Err(EmsError::InvalidRequest(_))
        ));
        assert!(matches!(
            SeatGrid::new(1, MAX_SEATS + 1, 1),
            Err(EmsError::InvalidRequest(_))
        ));
        assert!(SeatGrid::new(1, 1000, 1000).is_ok());
    }

    #[tokio::test]
    async fn reserve_assigns_increasing_ids() {
        let grid = SeatGrid::new(1, 2, 2).unwrap();

        assert_eq!(grid.reserve(&[Seat::new(1, 1), Seat::new(1, 2)]).await.unwrap(), 1);
        assert_eq!(grid.reserve(&[Seat::new(2, 2)]).await.unwrap(), 2);

        let view = grid.show().await;
        assert_eq!(view.seats, vec![vec![1, 1], vec![0, 2]]);
        assert_eq!(view.seat(Seat::new(2, 2)), Some(2));
        assert_eq!(view.reserved_count(), 3);
    }

    #[tokio::test]
    async fn out_of_bounds_reserves_nothing() {
        let grid = SeatGrid::new(1, 2, 2).unwrap();

        let err = grid.reserve(&[Seat::new(1, 1), Seat::new(3, 1)]).await.unwrap_err();
        assert!(matches!(err, EmsError::OutOfBounds { row: 3, col: 1 }));

        let err = grid.reserve(&[Seat::new(0, 1)]).await.unwrap_err();
        assert!(matches!(err, EmsError::OutOfBounds { row: 0, col: 1 }));

        assert_eq!(grid.show().await.reserved_count(), 0);
        assert_eq!(grid.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn conflict_reserves_nothing() {
        let grid = SeatGrid::new(1, 2, 2).unwrap();
        grid.reserve(&[Seat::new(2, 1)]).await.unwrap();

        let err = grid
            .reserve(&[Seat::new(1, 1), Seat::new(1, 2), Seat::new(2, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, EmsError::AlreadyReserved { row: 2, col: 1 }));

        let view = grid.show().await;
        assert_eq!(view.seats, vec![vec![0, 0], vec![1, 0]]);
        assert_eq!(grid.reservation_count().await, 1);
    }

    #[tokio::test]
    async fn empty_reservation_is_invalid() {
        let grid = SeatGrid::new(1, 1, 1).unwrap();
        assert!(matches!(grid.reserve(&[]).await, Err(EmsError::InvalidRequest(_))));
    }
}
