//! Queue releases, car-following maps and the per-car pass
//!
//! These functions run in a fixed order inside `SimWorld::tick` and operate
//! on the single owned vehicle collection.

use log::debug;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};

use super::car::{CarUpdateResult, SimCar, TickContext, TickShared};
use super::config::SimConfig;
use super::intersection::{Phase, SimIntersection};
use super::layout::Layout;
use super::queues::QueueViews;
use super::types::{CarId, CarStatus, Position, QUEUE_SPACING};

/// What a follower needs to know about the vehicle ahead of it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leader {
    pub id: CarId,
    pub status: CarStatus,
    pub position: Position,
    pub progress: f32,
}

impl Leader {
    fn of(car: &SimCar) -> Self {
        Self {
            id: car.id,
            status: car.status,
            position: car.position,
            progress: car.progress,
        }
    }
}

/// Immediate leader of every vehicle that follows another, per traffic context
#[derive(Debug, Default)]
pub struct FollowingMaps {
    /// Outer road, approach road and entry queue
    pub inbound: HashMap<CarId, Leader>,
    /// Bottleneck into the campus
    pub campus_entry: HashMap<CarId, Leader>,
    /// Entry aisle toward the internal drop-off (travels toward lower x)
    pub entry_aisle: HashMap<CarId, Leader>,
    /// Exit aisle toward the exit junction (travels toward higher x)
    pub exit_aisle: HashMap<CarId, Leader>,
}

impl FollowingMaps {
    pub fn build(cars: &BTreeMap<CarId, SimCar>) -> Self {
        Self {
            inbound: leader_map(inbound_order(cars)),
            campus_entry: leader_map(sorted_by(
                cars.values()
                    .filter(|c| c.status == CarStatus::EnteringCampus),
                |c| OrderedFloat(c.progress),
            )),
            entry_aisle: leader_map(sorted_by(
                cars.values().filter(|c| {
                    matches!(
                        c.status,
                        CarStatus::DrivingToInternalDropoff | CarStatus::DroppingOffInCampus
                    )
                }),
                |c| OrderedFloat(-c.position.x),
            )),
            exit_aisle: leader_map(sorted_by(
                cars.values().filter(|c| {
                    matches!(
                        c.status,
                        CarStatus::MovingFromPark | CarStatus::ExitingCampus
                    ) && c.segment() == Some(1)
                }),
                |c| OrderedFloat(c.position.x),
            )),
        }
    }
}

/// Inbound traffic from the rear: outer road, then approach road (both by
/// progress), then the entry queue from its tail to its head.
fn inbound_order(cars: &BTreeMap<CarId, SimCar>) -> Vec<&SimCar> {
    let stage = |status: CarStatus| match status {
        CarStatus::DrivingToOuterQueue => Some(0),
        CarStatus::DrivingToBottleneck => Some(1),
        CarStatus::WaitingToEnter => Some(2),
        _ => None,
    };
    let mut order: Vec<(u8, OrderedFloat<f32>, std::cmp::Reverse<CarId>, &SimCar)> = cars
        .values()
        .filter_map(|car| {
            let rank = stage(car.status)?;
            let progress = if car.status == CarStatus::WaitingToEnter {
                OrderedFloat(0.0)
            } else {
                OrderedFloat(car.progress)
            };
            Some((rank, progress, std::cmp::Reverse(car.id), car))
        })
        .collect();
    order.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
    order.into_iter().map(|(_, _, _, car)| car).collect()
}

fn sorted_by<'a, K: Ord>(
    cars: impl Iterator<Item = &'a SimCar>,
    key: impl Fn(&SimCar) -> K,
) -> Vec<&'a SimCar> {
    let mut cars: Vec<&SimCar> = cars.collect();
    cars.sort_by_key(|c| (key(*c), c.id));
    cars
}

/// Each vehicle's leader is the next one in rear-to-front order
fn leader_map(order: Vec<&SimCar>) -> HashMap<CarId, Leader> {
    order
        .windows(2)
        .map(|pair| (pair[0].id, Leader::of(pair[1])))
        .collect()
}

/// Release the head of the spawn queue onto the outer road once the rearmost
/// vehicle there has moved a full spacing away from the spawn point
pub fn release_from_spawn_queue(
    cars: &mut BTreeMap<CarId, SimCar>,
    layout: &Layout,
) -> Option<CarId> {
    let head = cars
        .values()
        .find(|c| c.status == CarStatus::WaitingToSpawn)?
        .id;

    let blocked = cars
        .values()
        .filter(|c| c.status == CarStatus::DrivingToOuterQueue)
        .map(|c| c.progress)
        .min_by_key(|p| OrderedFloat(*p))
        .is_some_and(|rearmost| rearmost < QUEUE_SPACING);
    if blocked {
        return None;
    }

    let car = cars.get_mut(&head)?;
    car.assign_route(CarStatus::DrivingToOuterQueue, &layout.outer_road);
    car.position = layout.spawn_point;
    Some(head)
}

/// Release at most one vehicle per stagger interval through the bottleneck.
///
/// Returns the campus occupancy after the release.
#[allow(clippy::too_many_arguments)]
pub fn release_from_bottleneck(
    delta_secs: f32,
    cars: &mut BTreeMap<CarId, SimCar>,
    intersection: &mut SimIntersection,
    queues: &QueueViews,
    layout: &Layout,
    config: &SimConfig,
    backpressure: bool,
    campus_occupancy: usize,
) -> usize {
    if !intersection.release_ready(delta_secs) {
        return campus_occupancy;
    }

    let batch = config.release_batch();
    match intersection.phase {
        Phase::AllowingIn
            if intersection.admits_inbound(batch)
                && campus_occupancy < config.campus_car_limit =>
        {
            let Some(car) = queues.entry.first().and_then(|id| cars.get_mut(id)) else {
                return campus_occupancy;
            };
            car.assign_route(CarStatus::EnteringCampus, &layout.campus_entry);
            intersection.record_inbound_release();
            debug!("Released car {:?} into the campus", car.id.0);
            campus_occupancy + 1
        }
        Phase::AllowingOut if intersection.admits_outbound(batch) && !backpressure => {
            let Some(car) = queues.exit.first().and_then(|id| cars.get_mut(id)) else {
                return campus_occupancy;
            };
            if !car.is_at_exit_queue_head(layout) {
                return campus_occupancy;
            }
            car.assign_route(
                CarStatus::DrivingThroughBottleneckOutbound,
                &layout.campus_outbound,
            );
            intersection.record_outbound_release();
            debug!("Released car {:?} out of the campus", car.id.0);
            campus_occupancy.saturating_sub(1)
        }
        _ => campus_occupancy,
    }
}

/// Update all cars in id order
///
/// Returns the ids of cars that left the map this tick; they are already removed.
pub fn update_cars(
    cars: &mut BTreeMap<CarId, SimCar>,
    ctx: &TickContext,
    shared: &mut TickShared,
) -> Vec<CarId> {
    let mut exited = Vec::new();
    for car in cars.values_mut() {
        if car.update(ctx, shared) == CarUpdateResult::Exited {
            exited.push(car.id);
        }
    }
    for id in &exited {
        cars.remove(id);
    }
    exited
}

/// Count vehicles currently inside the campus
pub fn campus_occupancy(cars: &BTreeMap<CarId, SimCar>) -> usize {
    cars.values()
        .filter(|c| c.status.is_inside_campus())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(id: u32, status: CarStatus, progress: f32) -> SimCar {
        let mut car = SimCar::new(CarId(id), true, Position::default());
        car.status = status;
        car.progress = progress;
        car
    }

    #[test]
    fn inbound_leaders_run_from_outer_road_to_entry_queue() {
        let mut cars = BTreeMap::new();
        for c in [
            car(1, CarStatus::WaitingToEnter, 0.0),
            car(2, CarStatus::DrivingToBottleneck, 20.0),
            car(3, CarStatus::DrivingToBottleneck, 5.0),
            car(4, CarStatus::DrivingToOuterQueue, 40.0),
        ] {
            cars.insert(c.id, c);
        }
        let maps = FollowingMaps::build(&cars);

        assert_eq!(maps.inbound[&CarId(4)].id, CarId(3));
        assert_eq!(maps.inbound[&CarId(3)].id, CarId(2));
        assert_eq!(maps.inbound[&CarId(2)].id, CarId(1));
        assert!(!maps.inbound.contains_key(&CarId(1)));
    }

    #[test]
    fn spawn_queue_waits_for_a_gap() {
        let layout = Layout::campus();
        let mut cars = BTreeMap::new();
        cars.insert(CarId(1), car(1, CarStatus::DrivingToOuterQueue, 1.0));
        cars.insert(CarId(2), car(2, CarStatus::WaitingToSpawn, 0.0));

        assert_eq!(release_from_spawn_queue(&mut cars, &layout), None);

        if let Some(leader) = cars.get_mut(&CarId(1)) {
            leader.progress = QUEUE_SPACING;
        }
        assert_eq!(release_from_spawn_queue(&mut cars, &layout), Some(CarId(2)));
        assert_eq!(cars[&CarId(2)].status, CarStatus::DrivingToOuterQueue);
    }

    #[test]
    fn outbound_release_waits_for_backpressure_to_clear() {
        let layout = Layout::campus();
        let config = SimConfig::default();
        let mut intersection = SimIntersection::new();
        let mut cars = BTreeMap::new();
        let mut leaving = car(1, CarStatus::WaitingToExitCampus, 0.0);
        leaving.position = layout.exit_queue_head();
        leaving.join_queue_time = Some(0.0);
        cars.insert(leaving.id, leaving);
        let queues = QueueViews::collect(&cars);

        let occupancy = release_from_bottleneck(
            0.1, &mut cars, &mut intersection, &queues, &layout, &config, true, 1,
        );
        assert_eq!(occupancy, 1);
        assert_eq!(cars[&CarId(1)].status, CarStatus::WaitingToExitCampus);
        assert_eq!(intersection.out_counter, 0);

        let occupancy = release_from_bottleneck(
            0.1, &mut cars, &mut intersection, &queues, &layout, &config, false, 1,
        );
        assert_eq!(occupancy, 0);
        assert_eq!(cars[&CarId(1)].status, CarStatus::DrivingThroughBottleneckOutbound);
        assert_eq!(intersection.out_counter, 1);
    }
}
