//! Parking lot allocator
//!
//! A fixed array of slots, each empty or owned by exactly one vehicle.

use log::debug;

use super::types::{CarId, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct ParkingLot {
    slots: Vec<Option<CarId>>,
    positions: Vec<Position>,
}

impl ParkingLot {
    /// Create an empty lot with one slot per position
    pub fn new(positions: Vec<Position>) -> Self {
        Self {
            slots: vec![None; positions.len()],
            positions,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.occupied()
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    pub fn slots(&self) -> &[Option<CarId>] {
        &self.slots
    }

    pub fn position(&self, index: usize) -> Option<Position> {
        self.positions.get(index).copied()
    }

    /// Lowest-indexed free slot
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Commit `car` to the lowest-indexed free slot
    pub fn acquire(&mut self, car: CarId) -> Option<usize> {
        let index = self.first_free()?;
        self.slots[index] = Some(car);
        debug!("Car {:?} committed to parking slot {}", car.0, index);
        Some(index)
    }

    /// Free `index` if it is held by `car`. Returns whether the slot was released.
    pub fn release(&mut self, index: usize, car: CarId) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if *slot == Some(car) => {
                *slot = None;
                debug!("Car {:?} vacated parking slot {}", car.0, index);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(capacity: usize) -> ParkingLot {
        ParkingLot::new(vec![Position::default(); capacity])
    }

    #[test]
    fn acquires_lowest_free_slot() {
        let mut lot = lot(3);
        assert_eq!(lot.acquire(CarId(1)), Some(0));
        assert_eq!(lot.acquire(CarId(2)), Some(1));
        assert!(lot.release(0, CarId(1)));
        assert_eq!(lot.acquire(CarId(3)), Some(0));
        assert_eq!(lot.occupied(), 2);
    }

    #[test]
    fn full_lot_refuses() {
        let mut lot = lot(1);
        assert_eq!(lot.acquire(CarId(1)), Some(0));
        assert!(lot.is_full());
        assert_eq!(lot.acquire(CarId(2)), None);
    }

    #[test]
    fn only_the_owner_can_release() {
        let mut lot = lot(2);
        lot.acquire(CarId(1));
        assert!(!lot.release(0, CarId(2)));
        assert!(!lot.release(5, CarId(1)));
        assert_eq!(lot.slots()[0], Some(CarId(1)));
    }

    #[test]
    fn zero_capacity_is_always_full() {
        let mut lot = lot(0);
        assert!(lot.is_full());
        assert_eq!(lot.acquire(CarId(1)), None);
    }
}
