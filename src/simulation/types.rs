//! Core types for the campus traffic simulation
//!
//! Ids, plane geometry, precomputed routes and the vehicle lifecycle states.

use serde::{Deserialize, Serialize};

/// A unique identifier for a vehicle.
/// Assigned monotonically starting at 1 and never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CarId(pub u32);

/// A 2D position on the map
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Move `distance` units along `direction` (expected to be a unit vector)
    pub fn offset(&self, direction: &Position, distance: f32) -> Position {
        Position {
            x: self.x + direction.x * distance,
            y: self.y + direction.y * distance,
        }
    }

    /// Step toward `target` by at most `max_step`, snapping when close enough.
    pub fn step_toward(&self, target: &Position, max_step: f32) -> Position {
        let distance = self.distance(target);
        if distance <= max_step || distance == 0.0 {
            return *target;
        }
        let ratio = max_step / distance;
        self.lerp(target, ratio)
    }
}

/// One waypoint of a route, annotated with the length of the segment to the next waypoint.
/// The length of the last waypoint is always zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePoint {
    pub position: Position,
    pub length: f32,
}

/// An ordered polyline a vehicle follows, with precomputed segment lengths
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    points: Vec<RoutePoint>,
    total_length: f32,
}

impl Route {
    /// Build a route through the given waypoints, computing segment lengths
    pub fn through(waypoints: &[Position]) -> Self {
        let points = waypoints
            .iter()
            .enumerate()
            .map(|(i, position)| RoutePoint {
                position: *position,
                length: waypoints
                    .get(i + 1)
                    .map(|next| position.distance(next))
                    .unwrap_or(0.0),
            })
            .collect();
        Self::from_points(points)
    }

    /// Build a route from waypoints whose segment lengths are already known
    pub fn from_points(points: Vec<RoutePoint>) -> Self {
        let total_length = points
            .iter()
            .take(points.len().saturating_sub(1))
            .map(|p| p.length)
            .sum();
        Self {
            points,
            total_length,
        }
    }

    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<Position> {
        self.points.first().map(|p| p.position)
    }

    pub fn end(&self) -> Option<Position> {
        self.points.last().map(|p| p.position)
    }

    /// Locate a point `progress` units along the route.
    ///
    /// Returns the interpolated position and the index of the segment it lies on.
    /// Progress past the end clamps to the last waypoint.
    pub fn locate(&self, progress: f32) -> Option<(Position, usize)> {
        let last = self.points.last()?;
        let mut accumulated = 0.0;
        for (i, pair) in self.points.windows(2).enumerate() {
            let (from, to) = (&pair[0], &pair[1]);
            if progress >= accumulated && progress <= accumulated + from.length {
                let fraction = if from.length > 0.0 {
                    (progress - accumulated) / from.length
                } else {
                    0.0
                };
                return Some((from.position.lerp(&to.position, fraction), i));
            }
            accumulated += from.length;
        }
        Some((last.position, self.points.len().saturating_sub(2)))
    }

    pub fn segment_at(&self, progress: f32) -> Option<usize> {
        self.locate(progress).map(|(_, segment)| segment)
    }
}

/// Lifecycle state of a vehicle, ordered roughly along its journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarStatus {
    WaitingToSpawn,
    DrivingToOuterQueue,
    DrivingToBottleneck,
    DecidingAtBottleneck,
    WaitingToEnter,
    DroppingOffAtBottleneck,
    EnteringCampus,
    DrivingToInternalDropoff,
    DroppingOffInCampus,
    MovingToPark,
    Parking,
    ExitingCampus,
    MovingFromPark,
    WaitingToExitCampus,
    DrivingThroughBottleneckOutbound,
    DrivingToFinalCheckpoint,
    WaitingAtFinalCheckpoint,
    DrivingToExit,
    Exited,
}

impl CarStatus {
    /// Whether the vehicle counts toward campus occupancy
    pub fn is_inside_campus(self) -> bool {
        matches!(
            self,
            CarStatus::EnteringCampus
                | CarStatus::DrivingToInternalDropoff
                | CarStatus::DroppingOffInCampus
                | CarStatus::MovingToPark
                | CarStatus::Parking
                | CarStatus::MovingFromPark
                | CarStatus::ExitingCampus
                | CarStatus::WaitingToExitCampus
        )
    }

    /// Whether the vehicle advances along its route each tick
    pub fn follows_route(self) -> bool {
        matches!(
            self,
            CarStatus::DrivingToOuterQueue
                | CarStatus::DrivingToBottleneck
                | CarStatus::EnteringCampus
                | CarStatus::DrivingToInternalDropoff
                | CarStatus::MovingToPark
                | CarStatus::MovingFromPark
                | CarStatus::ExitingCampus
                | CarStatus::DrivingThroughBottleneckOutbound
                | CarStatus::DrivingToFinalCheckpoint
                | CarStatus::DrivingToExit
        )
    }
}

/// Base road speed (map units per simulated second)
pub const CAR_SPEED: f32 = 15.0;

/// Speed on the campus aisles
pub const PARKING_LOT_SPEED: f32 = 2.0;

/// Speed from the bottleneck into the campus
pub const CAMPUS_ENTRY_SPEED: f32 = PARKING_LOT_SPEED / 3.0 * 2.0;

/// Speed from the exit queue head back through the bottleneck
pub const CAMPUS_EXIT_SPEED: f32 = 3.0;

/// Speed for parking maneuvers
pub const CRAWLING_SPEED: f32 = 0.8;

/// Minimum spacing between queued or following vehicles
pub const QUEUE_SPACING: f32 = 2.5;

/// Upper bound on the speed multiplier applied inside the campus
pub const CAMPUS_SPEED_CAP: f32 = 6.0;

/// Seconds a vehicle spends dropping off, at the bottleneck or inside the campus
pub const CAR_DROP_OFF_TIME: f32 = 10.0;
