//! Campus traffic simulation core
//!
//! This module contains all the simulation logic: the vehicle state machine,
//! the shared bottleneck controller, the parking allocator, queue geometry and
//! metrics. It has no rendering dependencies and can be driven from a console
//! loop or from tests.

mod car;
mod car_manager;
mod config;
mod gridlock;
mod intersection;
mod layout;
mod metrics;
mod parking;
mod queues;
mod types;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use car::{CarUpdateResult, SimCar, POSITION_TOLERANCE};
#[allow(unused_imports)]
pub use car_manager::{campus_occupancy, FollowingMaps, Leader};
pub use config::{DecisionPolicy, ManualControls, OperatingMode, SimConfig, TrafficOverride};
#[allow(unused_imports)]
pub use gridlock::{GridlockResolver, ReleaseQueue, BACKPRESSURE_THRESHOLD};
#[allow(unused_imports)]
pub use intersection::{
    inbound_phase_duration, outbound_phase_duration, Phase, SimIntersection, INITIAL_PHASE_TIME,
    RELEASE_INTERVAL, TRANSITION_TIME,
};
#[allow(unused_imports)]
pub use layout::{Layout, ParkingGrid};
pub use metrics::{
    format_clock, format_optional_clock, Metrics, SummaryStats, TrafficFlow,
    CONGESTION_QUEUE_THRESHOLD,
};
#[allow(unused_imports)]
pub use parking::ParkingLot;
#[allow(unused_imports)]
pub use queues::{FoldedQueue, LinearQueue, QueueViews};
#[allow(unused_imports)]
pub use types::{
    CarId, CarStatus, Position, Route, RoutePoint, CAMPUS_ENTRY_SPEED, CAMPUS_EXIT_SPEED,
    CAMPUS_SPEED_CAP, CAR_DROP_OFF_TIME, CAR_SPEED, CRAWLING_SPEED, PARKING_LOT_SPEED,
    QUEUE_SPACING,
};
pub use world::{SimSnapshot, SimWorld, TickOutcome, VehicleView, MAX_FRAME_DELTA};
