//! Backpressure from the final checkpoint and the fair release that keeps
//! the bottleneck draining while it is engaged

use log::{debug, info};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;

use super::car::SimCar;
use super::layout::Layout;
use super::types::{CarId, CarStatus};

/// Final checkpoint queue length at which outbound release stops
pub const BACKPRESSURE_THRESHOLD: usize = 10;

/// The two places a vehicle can be waiting to cross the bottleneck outbound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReleaseQueue {
    /// The folded exit queue inside the campus
    Campus,
    /// Vehicles that dropped off at the bottleneck
    Dropoff,
}

impl ReleaseQueue {
    fn other(self) -> Self {
        match self {
            ReleaseQueue::Campus => ReleaseQueue::Dropoff,
            ReleaseQueue::Dropoff => ReleaseQueue::Campus,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridlockResolver {
    engaged: bool,
    /// Queue that gets the next release while backpressure is engaged
    pub favored: ReleaseQueue,
}

impl Default for GridlockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl GridlockResolver {
    pub fn new() -> Self {
        Self {
            engaged: false,
            favored: ReleaseQueue::Campus,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Engage above the threshold, disengage only once back below it.
    /// Returns true when the state changed.
    pub fn update_backpressure(&mut self, final_queue_len: usize) -> bool {
        let next = if self.engaged {
            final_queue_len >= BACKPRESSURE_THRESHOLD
        } else {
            final_queue_len > BACKPRESSURE_THRESHOLD
        };
        let changed = next != self.engaged;
        self.engaged = next;
        if changed {
            if next {
                info!("Backpressure engaged: {} cars at the final checkpoint", final_queue_len);
            } else {
                info!("Backpressure released: {} cars at the final checkpoint", final_queue_len);
            }
        }
        changed
    }

    /// Release one waiting vehicle per vehicle that left the map, alternating
    /// between the campus exit queue and the bottleneck drop-off.
    ///
    /// Returns which queue each release came from.
    pub fn resolve(
        &mut self,
        cars: &mut BTreeMap<CarId, SimCar>,
        layout: &Layout,
        exits: usize,
    ) -> Vec<(CarId, ReleaseQueue)> {
        let mut released = Vec::new();
        if !self.engaged {
            return released;
        }

        for _ in 0..exits {
            let favored = self.favored;
            let pick = candidate(cars, layout, favored)
                .map(|id| (id, favored))
                .or_else(|| candidate(cars, layout, favored.other()).map(|id| (id, favored.other())));

            let Some((id, queue)) = pick else {
                break;
            };
            let Some(car) = cars.get_mut(&id) else {
                break;
            };

            match queue {
                ReleaseQueue::Campus => {
                    car.assign_route(
                        CarStatus::DrivingThroughBottleneckOutbound,
                        &layout.campus_outbound,
                    );
                }
                ReleaseQueue::Dropoff => {
                    car.assign_route(CarStatus::DrivingToFinalCheckpoint, &layout.to_final_checkpoint);
                    if let Some(start) = layout.to_final_checkpoint.start() {
                        car.position = start;
                    }
                }
            }
            if queue == favored {
                self.favored = favored.other();
            }
            debug!("Gridlock release of car {:?} from {:?}", id.0, queue);
            released.push((id, queue));
        }
        released
    }
}

/// The vehicle `queue` would release right now, if any is ready
fn candidate(
    cars: &BTreeMap<CarId, SimCar>,
    layout: &Layout,
    queue: ReleaseQueue,
) -> Option<CarId> {
    match queue {
        ReleaseQueue::Campus => cars
            .values()
            .filter(|c| c.status == CarStatus::WaitingToExitCampus)
            .min_by_key(|c| (OrderedFloat(c.join_queue_time.unwrap_or(f32::INFINITY)), c.id))
            .filter(|c| c.is_at_exit_queue_head(layout))
            .map(|c| c.id),
        ReleaseQueue::Dropoff => cars
            .values()
            .find(|c| c.status == CarStatus::DroppingOffAtBottleneck && c.timer <= 0.0)
            .map(|c| c.id),
    }
}
