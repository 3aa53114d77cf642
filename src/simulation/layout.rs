//! Static map geometry consumed by the engine
//!
//! Routes, queue lanes and parking slot positions are opaque to the engine: it
//! only follows polylines and asks for positions by rank or slot index. The
//! default `Layout::campus()` describes a drop-off loop feeding a single-lane
//! bottleneck in front of a campus parking area. Coordinates are percent of
//! map width/height.

use super::queues::{FoldedQueue, LinearQueue};
use super::types::{Position, Route, QUEUE_SPACING};

/// Grid generator for parking slot positions
#[derive(Debug, Clone, PartialEq)]
pub struct ParkingGrid {
    pub origin: Position,
    pub slots_per_row: usize,
    pub column_spacing: f32,
    pub row_spacing: f32,
}

impl ParkingGrid {
    /// Slot positions for a lot of the given capacity, row by row
    pub fn slot_positions(&self, capacity: usize) -> Vec<Position> {
        let per_row = self.slots_per_row.max(1);
        (0..capacity)
            .map(|i| {
                let row = i / per_row;
                let column = i % per_row;
                Position::new(
                    self.origin.x + column as f32 * self.column_spacing,
                    self.origin.y + row as f32 * self.row_spacing,
                )
            })
            .collect()
    }
}

/// Every piece of geometry the engine needs
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Where new vehicles appear
    pub spawn_point: Position,
    /// The shared single-lane junction
    pub bottleneck: Position,
    /// Spawn point to the corner of the drop-off loop
    pub outer_road: Route,
    /// Corner of the loop up to the bottleneck
    pub approach_road: Route,
    /// Bottleneck to the top of the campus entry aisle
    pub campus_entry: Route,
    /// Along the entry aisle to the internal drop-off point
    pub campus_dropoff: Route,
    /// Internal drop-off point round to the exit junction
    pub campus_exit_from_dropoff: Route,
    /// Head of the exit queue back through the bottleneck
    pub campus_outbound: Route,
    /// Bottleneck to the final checkpoint
    pub to_final_checkpoint: Route,
    /// Final checkpoint off the map
    pub final_exit: Route,
    /// Y coordinate of the aisle cars use to leave the parking rows
    pub exit_aisle_y: f32,
    /// Where the exit aisle meets the exit queue
    pub exit_junction: Position,
    /// Where the exit aisle turns toward the exit junction
    pub exit_turn: Position,
    pub entry_queue: LinearQueue,
    pub exit_queue: FoldedQueue,
    pub final_queue: LinearQueue,
    pub parking: ParkingGrid,
}

impl Default for Layout {
    fn default() -> Self {
        Self::campus()
    }
}

impl Layout {
    pub fn campus() -> Self {
        let spawn_point = Position::new(1.0, 79.5);
        let loop_corner = Position::new(60.0, 79.5);
        let bottleneck = Position::new(60.0, 41.5);
        let final_checkpoint = Position::new(1.0, 41.5);

        let campus_entrance = Position::new(57.0, 41.5);
        let parking_entrance = Position::new(57.0, 28.0);
        let dropoff_point = Position::new(8.0, 28.0);
        let exit_aisle_y = 33.0;
        let exit_column_x = 55.0;
        let exit_turn = Position::new(exit_column_x, 35.0);
        let exit_junction = Position::new(exit_column_x, 39.5);
        let exit_queue_head = Position::new(exit_column_x, 38.0);

        Self {
            spawn_point,
            bottleneck,
            outer_road: Route::through(&[spawn_point, loop_corner]),
            approach_road: Route::through(&[loop_corner, bottleneck]),
            campus_entry: Route::through(&[
                bottleneck,
                campus_entrance,
                Position::new(57.0, 35.0),
                parking_entrance,
            ]),
            campus_dropoff: Route::through(&[parking_entrance, dropoff_point]),
            campus_exit_from_dropoff: Route::through(&[
                dropoff_point,
                Position::new(dropoff_point.x, exit_aisle_y),
                Position::new(exit_column_x, exit_aisle_y),
                exit_turn,
                exit_junction,
            ]),
            campus_outbound: Route::through(&[
                exit_queue_head,
                Position::new(exit_column_x, bottleneck.y),
                bottleneck,
            ]),
            to_final_checkpoint: Route::through(&[bottleneck, final_checkpoint]),
            final_exit: Route::through(&[final_checkpoint, Position::new(-5.0, 41.5)]),
            exit_aisle_y,
            exit_junction,
            exit_turn,
            entry_queue: LinearQueue {
                head: bottleneck,
                direction: Position::new(0.0, 1.0),
                first_leg: loop_corner.y - bottleneck.y,
                bend: Position::new(-1.0, 0.0),
                spacing: QUEUE_SPACING,
            },
            exit_queue: FoldedQueue {
                head: exit_queue_head,
                direction: Position::new(-1.0, 0.0),
                row_step: Position::new(0.0, -1.5),
                spacing: QUEUE_SPACING,
                cars_per_row: 8,
            },
            final_queue: LinearQueue {
                head: final_checkpoint,
                direction: Position::new(1.0, 0.0),
                first_leg: bottleneck.x - final_checkpoint.x,
                bend: Position::new(0.0, 1.0),
                spacing: QUEUE_SPACING,
            },
            parking: ParkingGrid {
                origin: Position::new(7.0, 23.0),
                slots_per_row: 25,
                column_spacing: 1.8,
                row_spacing: 4.0,
            },
        }
    }

    /// Short maneuver from the end of the entry aisle into a slot
    pub fn route_to_slot(&self, from: Position, slot: Position) -> Route {
        Route::through(&[from, Position::new(slot.x, from.y), slot])
    }

    /// Route from a vacated slot down to the exit aisle and round to the exit junction
    pub fn route_from_slot_to_exit(&self, slot: Position) -> Route {
        Route::through(&[
            slot,
            Position::new(slot.x, self.exit_aisle_y),
            Position::new(self.exit_turn.x, self.exit_aisle_y),
            self.exit_turn,
            self.exit_junction,
        ])
    }

    /// Front-of-queue position for vehicles leaving the campus
    pub fn exit_queue_head(&self) -> Position {
        self.exit_queue.position(0)
    }
}
