//! Per-tick metrics, congestion classification and running summary statistics

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::car::SimCar;
use super::parking::ParkingLot;
use super::types::{CarId, CarStatus};

/// Queue depth above which a queue counts as congested
pub const CONGESTION_QUEUE_THRESHOLD: usize = 5;

/// Traffic condition for one tick, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrafficFlow {
    CampusFull,
    CongestionAtEntry,
    CongestionAtBottleneck,
    CongestionAtFinalCheckpoint,
    ParkingFull,
    Normal,
}

impl TrafficFlow {
    pub fn label(self) -> &'static str {
        match self {
            TrafficFlow::CampusFull => "Campus Full",
            TrafficFlow::CongestionAtEntry => "Congestion at Entry",
            TrafficFlow::CongestionAtBottleneck => "Congestion at Bottleneck",
            TrafficFlow::CongestionAtFinalCheckpoint => "Congestion at Final Checkpoint",
            TrafficFlow::ParkingFull => "Parking Full",
            TrafficFlow::Normal => "Normal",
        }
    }

    /// Only queue congestion counts toward congestion time
    pub fn is_congestion(self) -> bool {
        matches!(
            self,
            TrafficFlow::CongestionAtEntry
                | TrafficFlow::CongestionAtBottleneck
                | TrafficFlow::CongestionAtFinalCheckpoint
        )
    }
}

impl fmt::Display for TrafficFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Counts taken from the vehicle population after a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// Vehicles held at the spawn point
    pub spawn_queue: usize,
    /// Vehicles waiting to enter, plus those still driving in behind a queue
    pub waiting_inbound: usize,
    /// Vehicles in the campus exit queue
    pub waiting_outbound: usize,
    pub final_checkpoint: usize,
    pub parked: usize,
    pub parking_free: usize,
    pub campus_occupancy: usize,
    pub total_spawned: u32,
    pub total_exited: u32,
    pub active: usize,
    pub flow: TrafficFlow,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            spawn_queue: 0,
            waiting_inbound: 0,
            waiting_outbound: 0,
            final_checkpoint: 0,
            parked: 0,
            parking_free: 0,
            campus_occupancy: 0,
            total_spawned: 0,
            total_exited: 0,
            active: 0,
            flow: TrafficFlow::Normal,
        }
    }
}

impl Metrics {
    pub fn collect(
        cars: &BTreeMap<CarId, SimCar>,
        parking: &ParkingLot,
        campus_car_limit: usize,
        total_spawned: u32,
        total_exited: u32,
    ) -> Self {
        let mut metrics = Metrics {
            parking_free: parking.free(),
            total_spawned,
            total_exited,
            active: cars.len(),
            ..Default::default()
        };

        let mut waiting_to_enter = 0;
        let mut driving_in = 0;
        for car in cars.values() {
            match car.status {
                CarStatus::WaitingToSpawn => metrics.spawn_queue += 1,
                CarStatus::WaitingToEnter => waiting_to_enter += 1,
                CarStatus::DrivingToOuterQueue | CarStatus::DrivingToBottleneck => driving_in += 1,
                CarStatus::WaitingToExitCampus => metrics.waiting_outbound += 1,
                CarStatus::WaitingAtFinalCheckpoint => metrics.final_checkpoint += 1,
                CarStatus::Parking => metrics.parked += 1,
                _ => {}
            }
            if car.status.is_inside_campus() {
                metrics.campus_occupancy += 1;
            }
        }

        // Cars still rolling in only count once a queue has formed ahead of them
        metrics.waiting_inbound = if waiting_to_enter > 0 {
            waiting_to_enter + driving_in
        } else {
            0
        };
        metrics.flow = metrics.classify(campus_car_limit);
        metrics
    }

    fn classify(&self, campus_car_limit: usize) -> TrafficFlow {
        let threshold = CONGESTION_QUEUE_THRESHOLD;
        if self.campus_occupancy >= campus_car_limit {
            TrafficFlow::CampusFull
        } else if self.spawn_queue > threshold {
            TrafficFlow::CongestionAtEntry
        } else if self.waiting_inbound > threshold || self.waiting_outbound > threshold {
            TrafficFlow::CongestionAtBottleneck
        } else if self.final_checkpoint > threshold {
            TrafficFlow::CongestionAtFinalCheckpoint
        } else if self.parking_free == 0 {
            TrafficFlow::ParkingFull
        } else {
            TrafficFlow::Normal
        }
    }
}

/// Run-level statistics surfaced at the end of a simulation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub first_parking_full_time: Option<f32>,
    pub first_congestion_time: Option<f32>,
    pub last_congestion_time: Option<f32>,
    pub total_congestion_time: f32,
}

impl SummaryStats {
    pub fn record(&mut self, flow: TrafficFlow, time: f32, delta_secs: f32) {
        if flow == TrafficFlow::ParkingFull && self.first_parking_full_time.is_none() {
            self.first_parking_full_time = Some(time);
        }
        if flow.is_congestion() {
            self.first_congestion_time.get_or_insert(time);
            self.last_congestion_time = Some(time);
            self.total_congestion_time += delta_secs;
        }
    }
}

/// Format simulated seconds as `hh:mm:ss`
pub fn format_clock(secs: f32) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// `hh:mm:ss`, or "never" when the event did not happen
pub fn format_optional_clock(secs: Option<f32>) -> String {
    secs.map_or_else(|| "never".to_string(), format_clock)
}
