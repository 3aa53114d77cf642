//! Main simulation world that ties everything together
//!
//! `SimWorld` owns the whole mutable snapshot (vehicles, parking lot,
//! bottleneck controller, clock and statistics) and advances it one tick at a
//! time from elapsed real-time deltas supplied by the driver.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;

use super::car::{SimCar, TickContext, TickShared};
use super::car_manager::{
    campus_occupancy, release_from_bottleneck, release_from_spawn_queue, update_cars,
    FollowingMaps,
};
use super::config::{ManualControls, OperatingMode, SimConfig};
use super::gridlock::GridlockResolver;
use super::intersection::{Phase, SimIntersection};
use super::layout::Layout;
use super::metrics::{format_clock, format_optional_clock, Metrics, SummaryStats};
use super::parking::ParkingLot;
use super::queues::QueueViews;
use super::types::{CarId, CarStatus, Position, CAMPUS_SPEED_CAP};

/// Real seconds above which a frame is dropped instead of simulated
pub const MAX_FRAME_DELTA: f32 = 0.1;

/// What a call to `SimWorld::tick` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The world advanced by one tick
    Advanced,
    /// The frame was too long (or negative) and was skipped
    Resynchronized,
    /// Every vehicle has spawned and left; nothing changes any more
    Finished,
}

/// Externally visible state of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleView {
    pub id: CarId,
    pub status: CarStatus,
    pub position: Position,
    pub parking_spot: Option<usize>,
}

/// Everything a display or report needs from the world at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimSnapshot {
    pub time: f32,
    pub phase: Phase,
    pub phase_timer: f32,
    pub backpressure: bool,
    pub vehicles: Vec<VehicleView>,
    pub parking_occupied: usize,
    pub parking_capacity: usize,
    pub metrics: Metrics,
    pub summary: SummaryStats,
    pub finished: bool,
}

/// The main simulation world
pub struct SimWorld {
    pub config: SimConfig,

    /// Route table and queue geometry
    pub layout: Layout,

    /// Active vehicles, in id order
    pub cars: BTreeMap<CarId, SimCar>,

    pub parking: ParkingLot,

    /// The shared bottleneck
    pub intersection: SimIntersection,

    pub gridlock: GridlockResolver,

    /// Operator signals, only read in manual mode
    pub controls: ManualControls,

    /// Simulation time
    pub time: f32,

    pub metrics: Metrics,

    pub summary: SummaryStats,

    /// Vehicles created so far
    pub spawned: u32,

    /// Vehicles that have left the map
    pub exited: u32,

    finished: bool,

    /// Next ID to assign
    next_id: u32,

    /// Simulated seconds until the next spawn
    spawn_timer: f32,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,

    seed: Option<u64>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimWorld {
    fn new_internal(config: SimConfig, layout: Layout, seed: Option<u64>) -> Self {
        let parking = ParkingLot::new(layout.parking.slot_positions(config.parking_capacity));
        let metrics = Metrics::collect(
            &BTreeMap::new(),
            &parking,
            config.campus_car_limit,
            0,
            0,
        );
        Self {
            spawn_timer: config.spawn_interval,
            config,
            layout,
            cars: BTreeMap::new(),
            parking,
            intersection: SimIntersection::new(),
            gridlock: GridlockResolver::new(),
            controls: ManualControls::default(),
            time: 0.0,
            metrics,
            summary: SummaryStats::default(),
            spawned: 0,
            exited: 0,
            finished: false,
            next_id: 1,
            rng: seed.map(StdRng::seed_from_u64),
            seed,
        }
    }

    pub fn new(config: SimConfig) -> Self {
        Self::new_internal(config, Layout::campus(), None)
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(config: SimConfig, seed: u64) -> Self {
        Self::new_internal(config, Layout::campus(), Some(seed))
    }

    /// Create a SimWorld on a custom map
    pub fn with_layout(config: SimConfig, layout: Layout, seed: Option<u64>) -> Self {
        Self::new_internal(config, layout, seed)
    }

    pub fn set_manual_controls(&mut self, controls: ManualControls) {
        self.controls = controls;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Draw a uniform value in [0, 1), using seeded RNG if available
    fn random_unit(&mut self) -> f64 {
        match &mut self.rng {
            Some(rng) => rng.random::<f64>(),
            None => rand::rng().random::<f64>(),
        }
    }

    /// Discard all state and start over from the configuration.
    /// A seeded world replays the same run.
    pub fn reset(&mut self) {
        let controls = self.controls;
        *self = Self::new_internal(self.config.clone(), self.layout.clone(), self.seed);
        self.controls = controls;
        info!("Simulation reset");
    }

    fn update_controller(&mut self, delta_secs: f32, queues: &QueueViews) {
        match self.config.mode {
            OperatingMode::Auto => {
                self.intersection
                    .update_auto(delta_secs, queues.entry.len(), queues.exit.len());
            }
            OperatingMode::Manual => {
                self.intersection
                    .update_manual(delta_secs, self.controls.traffic);
            }
        }
    }

    /// Create one vehicle in the spawn queue when the spawn timer runs out
    fn spawn(&mut self, delta_secs: f32) {
        self.spawn_timer -= delta_secs;
        if self.spawn_timer > 0.0 || self.spawned >= self.config.total_cars {
            return;
        }

        let wants_to_park = self.random_unit() < self.config.park_probability;
        let id = CarId(self.next_id);
        self.next_id += 1;
        self.cars
            .insert(id, SimCar::new(id, wants_to_park, self.layout.spawn_point));
        self.spawned += 1;
        self.spawn_timer = self.config.spawn_interval;
        debug!("Spawned car {:?} (wants to park: {})", id.0, wants_to_park);
    }

    /// Advance the simulation by `real_delta` seconds of wall time
    pub fn tick(&mut self, real_delta: f32) -> TickOutcome {
        if self.finished {
            return TickOutcome::Finished;
        }
        if !(0.0..=MAX_FRAME_DELTA).contains(&real_delta) {
            debug!("Dropping a {:.3}s frame", real_delta);
            return TickOutcome::Resynchronized;
        }

        let delta_secs = real_delta * self.config.speed_multiplier;
        let campus_delta = real_delta * self.config.speed_multiplier.min(CAMPUS_SPEED_CAP);
        self.time += delta_secs;

        let occupancy = campus_occupancy(&self.cars);
        let queues = QueueViews::collect(&self.cars);

        self.update_controller(delta_secs, &queues);
        self.spawn(delta_secs);
        release_from_spawn_queue(&mut self.cars, &self.layout);

        self.gridlock
            .update_backpressure(queues.final_checkpoint.len());
        let backpressure = self.gridlock.is_engaged();

        let occupancy = release_from_bottleneck(
            delta_secs,
            &mut self.cars,
            &mut self.intersection,
            &queues,
            &self.layout,
            &self.config,
            backpressure,
            occupancy,
        );

        let following = FollowingMaps::build(&self.cars);
        let ctx = TickContext {
            real_delta,
            delta: delta_secs,
            campus_delta,
            time: self.time,
            config: &self.config,
            controls: self.controls,
            layout: &self.layout,
            following: &following,
            queues: &queues,
            backpressure,
        };
        let mut shared = TickShared {
            parking: &mut self.parking,
            intersection: &mut self.intersection,
            campus_occupancy: occupancy,
            bypassed_this_tick: false,
        };
        let exited = update_cars(&mut self.cars, &ctx, &mut shared);
        self.exited += exited.len() as u32;

        self.gridlock
            .resolve(&mut self.cars, &self.layout, exited.len());

        self.metrics = Metrics::collect(
            &self.cars,
            &self.parking,
            self.config.campus_car_limit,
            self.spawned,
            self.exited,
        );
        self.summary
            .record(self.metrics.flow, self.time, delta_secs);

        if self.spawned >= self.config.total_cars && self.cars.is_empty() {
            self.finished = true;
            info!(
                "All {} cars have left the campus after {}",
                self.exited,
                format_clock(self.time)
            );
        }
        TickOutcome::Advanced
    }

    /// Capture the externally visible state
    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            time: self.time,
            phase: self.intersection.phase,
            phase_timer: self.intersection.phase_timer,
            backpressure: self.gridlock.is_engaged(),
            vehicles: self
                .cars
                .values()
                .map(|car| VehicleView {
                    id: car.id,
                    status: car.status,
                    position: car.position,
                    parking_spot: car.parking_spot,
                })
                .collect(),
            parking_occupied: self.parking.occupied(),
            parking_capacity: self.parking.capacity(),
            metrics: self.metrics.clone(),
            summary: self.summary.clone(),
            finished: self.finished,
        }
    }

    /// Print a summary of the current state (for console testing)
    pub fn print_summary(&self) {
        println!("=== Campus Traffic Summary ===");
        println!("Time: {} ({:.2}s)", format_clock(self.time), self.time);
        println!(
            "Bottleneck: {:?}, {:.1}s left, in={}, out={}",
            self.intersection.phase,
            self.intersection.phase_timer,
            self.intersection.in_counter,
            self.intersection.out_counter
        );
        println!(
            "Cars: spawned={}/{}, exited={}, active={}",
            self.spawned,
            self.config.total_cars,
            self.exited,
            self.cars.len()
        );
        println!(
            "Parking: {}/{} occupied",
            self.parking.occupied(),
            self.parking.capacity()
        );
        println!();

        println!("--- Queues ---");
        println!("  Spawn queue: {}", self.metrics.spawn_queue);
        println!("  Waiting to enter: {}", self.metrics.waiting_inbound);
        println!("  Waiting to exit: {}", self.metrics.waiting_outbound);
        println!("  Final checkpoint: {}", self.metrics.final_checkpoint);
        println!(
            "  Campus occupancy: {}/{}",
            self.metrics.campus_occupancy, self.config.campus_car_limit
        );
        println!(
            "  Backpressure: {}",
            if self.gridlock.is_engaged() {
                "engaged"
            } else {
                "off"
            }
        );
        println!("  Traffic flow: {}", self.metrics.flow);

        println!("--- Summary ---");
        println!(
            "  First time parking was full: {}",
            format_optional_clock(self.summary.first_parking_full_time)
        );
        println!(
            "  First congestion: {}",
            format_optional_clock(self.summary.first_congestion_time)
        );
        println!(
            "  Last congestion: {}",
            format_optional_clock(self.summary.last_congestion_time)
        );
        println!(
            "  Total congestion time: {}",
            format_clock(self.summary.total_congestion_time)
        );
    }
}
