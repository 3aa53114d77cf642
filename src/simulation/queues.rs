//! Queue geometry and per-tick queue orderings
//!
//! Queues are never stored as live lists. Each tick they are derived from the
//! vehicle population as sorted views, and a vehicle's slot is a pure function
//! of its rank.

use ordered_float::OrderedFloat;
use sorted_vec::SortedVec;
use std::collections::{BTreeMap, HashMap};

use super::car::SimCar;
use super::types::{CarId, CarStatus, Position};

/// A single-file queue that runs from a head position along a lane and,
/// once the first leg is used up, continues along a second direction.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearQueue {
    pub head: Position,
    /// Unit vector pointing from the head toward the tail
    pub direction: Position,
    /// Length of the first leg before the queue bends
    pub first_leg: f32,
    /// Unit vector of the second leg
    pub bend: Position,
    pub spacing: f32,
}

impl LinearQueue {
    /// Position of the vehicle at `rank` (0 = head)
    pub fn position(&self, rank: usize) -> Position {
        let distance = rank as f32 * self.spacing;
        if distance <= self.first_leg {
            self.head.offset(&self.direction, distance)
        } else {
            let corner = self.head.offset(&self.direction, self.first_leg);
            corner.offset(&self.bend, distance - self.first_leg)
        }
    }
}

/// A queue folded into parallel rows of alternating direction
#[derive(Debug, Clone, PartialEq)]
pub struct FoldedQueue {
    pub head: Position,
    /// Unit vector along a row, from the head toward the tail of row 0
    pub direction: Position,
    /// Offset between consecutive rows
    pub row_step: Position,
    pub spacing: f32,
    pub cars_per_row: usize,
}

impl FoldedQueue {
    /// Position of the vehicle at `rank` (0 = head)
    pub fn position(&self, rank: usize) -> Position {
        let per_row = self.cars_per_row.max(1);
        let row = rank / per_row;
        let column = rank % per_row;
        let offset = if row % 2 == 0 {
            column
        } else {
            per_row - 1 - column
        };
        let in_row = self.head.offset(&self.direction, offset as f32 * self.spacing);
        Position::new(
            in_row.x + self.row_step.x * row as f32,
            in_row.y + self.row_step.y * row as f32,
        )
    }
}

/// Ordered views of every queue, derived from the population at one instant
#[derive(Debug, Default)]
pub struct QueueViews {
    /// Vehicles waiting to enter the campus, by id
    pub entry: Vec<CarId>,
    /// Vehicles waiting to leave the campus, by join time
    pub exit: Vec<CarId>,
    /// Vehicles at the final checkpoint, by id
    pub final_checkpoint: Vec<CarId>,
    entry_ranks: HashMap<CarId, usize>,
    exit_ranks: HashMap<CarId, usize>,
    final_ranks: HashMap<CarId, usize>,
}

impl QueueViews {
    pub fn collect(cars: &BTreeMap<CarId, SimCar>) -> Self {
        let mut views = QueueViews::default();
        let mut exit_order: SortedVec<(OrderedFloat<f32>, CarId)> = SortedVec::new();

        // BTreeMap iteration is already in id order
        for car in cars.values() {
            match car.status {
                CarStatus::WaitingToEnter => views.entry.push(car.id),
                CarStatus::WaitingAtFinalCheckpoint => views.final_checkpoint.push(car.id),
                CarStatus::WaitingToExitCampus => {
                    let joined = car.join_queue_time.unwrap_or(f32::INFINITY);
                    exit_order.insert((OrderedFloat(joined), car.id));
                }
                _ => {}
            }
        }

        views.exit = exit_order.iter().map(|(_, id)| *id).collect();
        views.entry_ranks = rank_map(&views.entry);
        views.exit_ranks = rank_map(&views.exit);
        views.final_ranks = rank_map(&views.final_checkpoint);
        views
    }

    pub fn entry_rank(&self, id: CarId) -> Option<usize> {
        self.entry_ranks.get(&id).copied()
    }

    pub fn exit_rank(&self, id: CarId) -> Option<usize> {
        self.exit_ranks.get(&id).copied()
    }

    pub fn final_rank(&self, id: CarId) -> Option<usize> {
        self.final_ranks.get(&id).copied()
    }
}

fn rank_map(order: &[CarId]) -> HashMap<CarId, usize> {
    order.iter().enumerate().map(|(i, id)| (*id, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_lane() -> LinearQueue {
        LinearQueue {
            head: Position::new(60.0, 40.0),
            direction: Position::new(0.0, 1.0),
            first_leg: 5.0,
            bend: Position::new(-1.0, 0.0),
            spacing: 2.5,
        }
    }

    #[test]
    fn linear_queue_wraps_onto_second_leg() {
        let lane = entry_lane();
        assert_eq!(lane.position(0), Position::new(60.0, 40.0));
        assert_eq!(lane.position(2), Position::new(60.0, 45.0));
        assert_eq!(lane.position(3), Position::new(57.5, 45.0));
        assert_eq!(lane.position(4), Position::new(55.0, 45.0));
    }

    #[test]
    fn folded_queue_alternates_row_direction() {
        let queue = FoldedQueue {
            head: Position::new(50.0, 38.0),
            direction: Position::new(-1.0, 0.0),
            row_step: Position::new(0.0, -2.0),
            spacing: 2.0,
            cars_per_row: 3,
        };
        // Row 0 runs head to tail
        assert_eq!(queue.position(0), Position::new(50.0, 38.0));
        assert_eq!(queue.position(2), Position::new(46.0, 38.0));
        // Row 1 runs back, so rank 3 sits above rank 2
        assert_eq!(queue.position(3), Position::new(46.0, 36.0));
        assert_eq!(queue.position(5), Position::new(50.0, 36.0));
        // Row 2 runs head to tail again
        assert_eq!(queue.position(6), Position::new(50.0, 34.0));
    }

    #[test]
    fn exit_queue_is_ordered_by_join_time() {
        let mut cars = BTreeMap::new();
        for (id, joined) in [(1, 9.0), (2, 3.0), (3, 3.0), (4, 5.0)] {
            let mut car = SimCar::new(CarId(id), false, Position::default());
            car.status = CarStatus::WaitingToExitCampus;
            car.join_queue_time = Some(joined);
            cars.insert(car.id, car);
        }
        let views = QueueViews::collect(&cars);
        assert_eq!(views.exit, vec![CarId(2), CarId(3), CarId(4), CarId(1)]);
        assert_eq!(views.exit_rank(CarId(1)), Some(3));
        assert_eq!(views.entry_rank(CarId(1)), None);
    }
}
