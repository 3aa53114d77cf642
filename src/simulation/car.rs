//! Vehicle state machine and motion model
//!
//! A vehicle is updated once per tick against data taken before the per-car
//! pass (leaders, queue ranks). Only the parking lot, the bottleneck quota and
//! the campus headroom are shared mutable state during the pass.

use log::{debug, warn};

use super::car_manager::FollowingMaps;
use super::config::{ManualControls, SimConfig};
use super::intersection::{Phase, SimIntersection};
use super::layout::Layout;
use super::parking::ParkingLot;
use super::queues::QueueViews;
use super::types::{
    CarId, CarStatus, Position, Route, CAMPUS_ENTRY_SPEED, CAMPUS_EXIT_SPEED, CAR_DROP_OFF_TIME,
    CAR_SPEED, CRAWLING_SPEED, PARKING_LOT_SPEED, QUEUE_SPACING,
};

/// Offsets below this are treated as "in position"
pub const POSITION_TOLERANCE: f32 = 0.1;

/// Result of a car update indicating what action should be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarUpdateResult {
    Continue,
    Exited,
}

/// Read-only inputs to the per-car pass
pub struct TickContext<'a> {
    /// Wall-clock seconds elapsed this tick
    pub real_delta: f32,
    /// Simulated seconds elapsed this tick
    pub delta: f32,
    /// Simulated seconds elapsed this tick for motion inside the campus
    pub campus_delta: f32,
    /// Simulation time at the end of this tick
    pub time: f32,
    pub config: &'a SimConfig,
    pub controls: ManualControls,
    pub layout: &'a Layout,
    pub following: &'a FollowingMaps,
    pub queues: &'a QueueViews,
    /// Whether outbound release is suppressed by a full final checkpoint
    pub backpressure: bool,
}

/// Mutable state shared by all vehicles during the per-car pass
pub struct TickShared<'a> {
    pub parking: &'a mut ParkingLot,
    pub intersection: &'a mut SimIntersection,
    /// Running campus occupancy, including admissions made this tick
    pub campus_occupancy: usize,
    /// At most one vehicle per tick may skip the entry queue
    pub bypassed_this_tick: bool,
}

/// A vehicle in the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimCar {
    pub id: CarId,
    pub status: CarStatus,
    /// Distance travelled along `route`
    pub progress: f32,
    pub route: Route,
    pub position: Position,
    /// Countdown used by dwell states
    pub timer: f32,
    pub parking_duration: f32,
    pub wants_to_park: bool,
    pub parking_spot: Option<usize>,
    /// When the vehicle joined the campus exit queue
    pub join_queue_time: Option<f32>,
}

impl SimCar {
    pub fn new(id: CarId, wants_to_park: bool, spawn_point: Position) -> Self {
        Self {
            id,
            status: CarStatus::WaitingToSpawn,
            progress: 0.0,
            route: Route::default(),
            position: spawn_point,
            timer: 0.0,
            parking_duration: 0.0,
            wants_to_park,
            parking_spot: None,
            join_queue_time: None,
        }
    }

    /// Switch to a path-following state on a fresh route
    pub fn assign_route(&mut self, status: CarStatus, route: &Route) {
        self.status = status;
        self.route = route.clone();
        self.progress = 0.0;
    }

    /// Whether the vehicle stands at the front of the campus exit queue
    pub fn is_at_exit_queue_head(&self, layout: &Layout) -> bool {
        self.position.distance(&layout.exit_queue_head()) < POSITION_TOLERANCE
    }

    /// Segment index of the current route, if any
    pub fn segment(&self) -> Option<usize> {
        self.route.segment_at(self.progress)
    }

    /// Advance the vehicle by one tick
    pub fn update(&mut self, ctx: &TickContext, shared: &mut TickShared) -> CarUpdateResult {
        let distance = self.free_distance(ctx);
        let distance = self.limit_by_leader(distance, ctx);

        let mut moved = false;
        match self.status {
            status if status.follows_route() => {
                if distance > 0.0 {
                    self.progress += distance;
                    moved = true;
                }
            }
            CarStatus::DroppingOffAtBottleneck => {
                self.timer -= ctx.delta;
                if self.timer <= 0.0 && !ctx.backpressure {
                    self.assign_route(
                        CarStatus::DrivingToFinalCheckpoint,
                        &ctx.layout.to_final_checkpoint,
                    );
                }
            }
            CarStatus::DroppingOffInCampus => {
                self.timer -= ctx.delta;
                if self.timer <= 0.0 {
                    self.assign_route(
                        CarStatus::ExitingCampus,
                        &ctx.layout.campus_exit_from_dropoff,
                    );
                }
            }
            CarStatus::WaitingAtFinalCheckpoint => {
                self.timer -= ctx.delta;
                if self.timer <= 0.0 {
                    self.assign_route(CarStatus::DrivingToExit, &ctx.layout.final_exit);
                }
            }
            CarStatus::Parking => {
                self.parking_duration += ctx.delta;
                if self.parking_duration >= ctx.config.parking_duration {
                    self.leave_parking_slot(ctx, shared);
                }
            }
            _ => {}
        }

        let mut result = CarUpdateResult::Continue;
        let total_length = self.route.total_length();
        if moved && self.progress >= total_length {
            self.progress = total_length;
            if let Some(end) = self.route.end() {
                self.position = end;
            }
            result = self.complete_route(ctx, shared);
        }

        if self.status == CarStatus::DecidingAtBottleneck {
            self.decide_at_bottleneck(ctx, shared);
        }

        if moved {
            if let Some((position, _)) = self.route.locate(self.progress) {
                self.position = position;
            }
        }

        self.hold_queue_position(ctx);
        result
    }

    /// Distance the vehicle would cover this tick with nothing in its way
    fn free_distance(&self, ctx: &TickContext) -> f32 {
        match self.status {
            CarStatus::MovingToPark | CarStatus::MovingFromPark => CRAWLING_SPEED * ctx.campus_delta,
            CarStatus::EnteringCampus => CAMPUS_ENTRY_SPEED * ctx.campus_delta,
            // Crossing the bottleneck runs on wall-clock time at every speed setting
            CarStatus::DrivingThroughBottleneckOutbound => CAMPUS_EXIT_SPEED * ctx.real_delta,
            CarStatus::DrivingToInternalDropoff | CarStatus::ExitingCampus => {
                PARKING_LOT_SPEED * ctx.campus_delta
            }
            _ => CAR_SPEED * ctx.delta,
        }
    }

    /// Keep a safe gap to the vehicle ahead
    fn limit_by_leader(&self, mut distance: f32, ctx: &TickContext) -> f32 {
        match self.status {
            CarStatus::DrivingToOuterQueue | CarStatus::DrivingToBottleneck => {
                if let Some(leader) = ctx.following.inbound.get(&self.id) {
                    if matches!(
                        leader.status,
                        CarStatus::DrivingToBottleneck | CarStatus::WaitingToEnter
                    ) {
                        distance = distance.min(CAR_SPEED / 1.5 * ctx.delta);
                    }
                    let gap = self.position.distance(&leader.position);
                    distance = distance.min(gap - QUEUE_SPACING).max(0.0);
                }
            }
            CarStatus::EnteringCampus => {
                if let Some(leader) = ctx.following.campus_entry.get(&self.id) {
                    if leader.progress - self.progress < QUEUE_SPACING + 1.0 {
                        distance = 0.0;
                    }
                }
            }
            CarStatus::DrivingToInternalDropoff => {
                if let Some(leader) = ctx.following.entry_aisle.get(&self.id) {
                    let gap = (leader.position.x - self.position.x).abs();
                    distance = distance.min(gap - QUEUE_SPACING).max(0.0);
                }
            }
            CarStatus::MovingFromPark | CarStatus::ExitingCampus => {
                if let Some(leader) = ctx.following.exit_aisle.get(&self.id) {
                    let gap = (leader.position.x - self.position.x).abs();
                    distance = distance.min(gap - QUEUE_SPACING).max(0.0);
                }
            }
            _ => {}
        }
        distance
    }

    /// Transition taken when the vehicle reaches the end of its route
    fn complete_route(&mut self, ctx: &TickContext, shared: &mut TickShared) -> CarUpdateResult {
        let layout = ctx.layout;
        match self.status {
            CarStatus::DrivingToOuterQueue => {
                self.assign_route(CarStatus::DrivingToBottleneck, &layout.approach_road);
            }
            CarStatus::DrivingToBottleneck => {
                self.status = CarStatus::DecidingAtBottleneck;
            }
            CarStatus::EnteringCampus => self.choose_campus_destination(ctx, shared),
            CarStatus::DrivingToInternalDropoff => {
                self.status = CarStatus::DroppingOffInCampus;
                self.timer = CAR_DROP_OFF_TIME;
            }
            CarStatus::MovingToPark => {
                self.status = CarStatus::Parking;
                self.parking_duration = 0.0;
            }
            CarStatus::MovingFromPark | CarStatus::ExitingCampus => {
                self.status = CarStatus::WaitingToExitCampus;
                self.join_queue_time = Some(ctx.time);
            }
            CarStatus::DrivingThroughBottleneckOutbound => {
                self.assign_route(CarStatus::DrivingToFinalCheckpoint, &layout.to_final_checkpoint);
            }
            CarStatus::DrivingToFinalCheckpoint => {
                self.status = CarStatus::WaitingAtFinalCheckpoint;
                self.timer = ctx.config.checkpoint_dwell;
            }
            CarStatus::DrivingToExit => {
                self.status = CarStatus::Exited;
                return CarUpdateResult::Exited;
            }
            _ => {}
        }
        CarUpdateResult::Continue
    }

    /// Park in the lowest free slot, or fall back to the internal drop-off
    fn choose_campus_destination(&mut self, ctx: &TickContext, shared: &mut TickShared) {
        if self.wants_to_park {
            if let Some(index) = shared.parking.acquire(self.id) {
                let slot = shared.parking.position(index).unwrap_or(self.position);
                let maneuver = ctx.layout.route_to_slot(self.position, slot);
                self.assign_route(CarStatus::MovingToPark, &maneuver);
                self.parking_spot = Some(index);
                return;
            }
            debug!("Car {:?} found the lot full, dropping off instead", self.id.0);
        }
        self.assign_route(CarStatus::DrivingToInternalDropoff, &ctx.layout.campus_dropoff);
    }

    fn leave_parking_slot(&mut self, ctx: &TickContext, shared: &mut TickShared) {
        let slot = match self.parking_spot.take() {
            Some(index) => {
                shared.parking.release(index, self.id);
                shared.parking.position(index).unwrap_or(self.position)
            }
            None => {
                warn!("Car {:?} was parked without a slot", self.id.0);
                self.position
            }
        };
        let route = ctx.layout.route_from_slot_to_exit(slot);
        self.assign_route(CarStatus::MovingFromPark, &route);
    }

    /// Drop off at the bottleneck, skip the entry queue, or join it
    fn decide_at_bottleneck(&mut self, ctx: &TickContext, shared: &mut TickShared) {
        let wants_to_park = self.wants_to_park && !ctx.config.diverts_all(&ctx.controls);
        if !wants_to_park {
            self.status = CarStatus::DroppingOffAtBottleneck;
            self.timer = CAR_DROP_OFF_TIME;
            self.position = ctx.layout.bottleneck;
            return;
        }

        let can_bypass = shared.intersection.phase == Phase::AllowingIn
            && ctx.queues.entry.is_empty()
            && shared.intersection.in_counter < ctx.config.release_batch()
            && !shared.bypassed_this_tick
            && shared.campus_occupancy < ctx.config.campus_car_limit;

        if can_bypass {
            shared.bypassed_this_tick = true;
            shared.campus_occupancy += 1;
            shared.intersection.record_bypass();
            self.assign_route(CarStatus::EnteringCampus, &ctx.layout.campus_entry);
            debug!("Car {:?} bypassed the entry queue", self.id.0);
        } else {
            self.status = CarStatus::WaitingToEnter;
        }
    }

    /// Snap or glide queued vehicles to the slot their rank assigns them
    fn hold_queue_position(&mut self, ctx: &TickContext) {
        let layout = ctx.layout;
        match self.status {
            CarStatus::WaitingToEnter => {
                if let Some(rank) = ctx.queues.entry_rank(self.id) {
                    self.position = layout.entry_queue.position(rank);
                }
            }
            CarStatus::WaitingToExitCampus => {
                if let Some(rank) = ctx.queues.exit_rank(self.id) {
                    let target = layout.exit_queue.position(rank);
                    if self.position.distance(&target) > POSITION_TOLERANCE {
                        let step = PARKING_LOT_SPEED * ctx.campus_delta;
                        self.position = self.position.step_toward(&target, step);
                    }
                }
            }
            CarStatus::WaitingAtFinalCheckpoint => {
                if let Some(rank) = ctx.queues.final_rank(self.id) {
                    self.position = layout.final_queue.position(rank);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::car_manager::update_cars;
    use std::collections::BTreeMap;

    /// A campus map with a lot, a bottleneck and a hand-placed population
    struct Bench {
        config: SimConfig,
        layout: Layout,
        parking: ParkingLot,
        intersection: SimIntersection,
        cars: BTreeMap<CarId, SimCar>,
    }

    impl Bench {
        fn new() -> Self {
            let config = SimConfig::default();
            let layout = Layout::campus();
            let parking = ParkingLot::new(layout.parking.slot_positions(config.parking_capacity));
            Self {
                config,
                layout,
                parking,
                intersection: SimIntersection::new(),
                cars: BTreeMap::new(),
            }
        }

        fn add(&mut self, id: u32, status: CarStatus) -> &mut SimCar {
            let mut car = SimCar::new(CarId(id), true, self.layout.bottleneck);
            car.status = status;
            self.cars.entry(CarId(id)).or_insert(car)
        }

        fn place_on(&mut self, id: u32, status: CarStatus, route: Route, progress: f32) {
            let car = self.add(id, status);
            car.route = route;
            car.progress = progress;
            if let Some((position, _)) = car.route.locate(progress) {
                car.position = position;
            }
        }

        /// One per-car pass of `delta` seconds. Returns the campus occupancy afterwards.
        fn step(&mut self, delta: f32, backpressure: bool, campus_occupancy: usize) -> usize {
            let following = FollowingMaps::build(&self.cars);
            let queues = QueueViews::collect(&self.cars);
            let ctx = TickContext {
                real_delta: delta,
                delta,
                campus_delta: delta,
                time: 0.0,
                config: &self.config,
                controls: ManualControls::default(),
                layout: &self.layout,
                following: &following,
                queues: &queues,
                backpressure,
            };
            let mut shared = TickShared {
                parking: &mut self.parking,
                intersection: &mut self.intersection,
                campus_occupancy,
                bypassed_this_tick: false,
            };
            update_cars(&mut self.cars, &ctx, &mut shared);
            shared.campus_occupancy
        }

        fn car(&self, id: u32) -> &SimCar {
            &self.cars[&CarId(id)]
        }
    }

    #[test]
    fn checkpoint_cars_dwell_at_the_same_time() {
        let mut bench = Bench::new();
        for id in 1..=3 {
            bench.add(id, CarStatus::WaitingAtFinalCheckpoint).timer = 3.0;
        }

        bench.step(3.5, false, 0);
        for id in 1..=3 {
            assert_eq!(bench.car(id).status, CarStatus::DrivingToExit);
        }
    }

    #[test]
    fn checkpoint_cars_wait_out_their_dwell() {
        let mut bench = Bench::new();
        bench.add(1, CarStatus::WaitingAtFinalCheckpoint).timer = 3.0;
        bench.add(2, CarStatus::WaitingAtFinalCheckpoint).timer = 1.0;

        bench.step(2.0, false, 0);
        assert_eq!(bench.car(1).status, CarStatus::WaitingAtFinalCheckpoint);
        assert_eq!(bench.car(1).timer, 1.0);
        assert_eq!(bench.car(2).status, CarStatus::DrivingToExit);
    }

    #[test]
    fn only_one_car_skips_the_entry_queue_per_tick() {
        let mut bench = Bench::new();
        bench.intersection.phase = Phase::AllowingIn;
        bench.add(1, CarStatus::DecidingAtBottleneck);
        bench.add(2, CarStatus::DecidingAtBottleneck);

        let occupancy = bench.step(0.1, false, 0);
        assert_eq!(bench.car(1).status, CarStatus::EnteringCampus);
        assert_eq!(bench.car(2).status, CarStatus::WaitingToEnter);
        assert_eq!(bench.intersection.in_counter, 1);
        assert_eq!(occupancy, 1);
    }

    #[test]
    fn no_bypass_once_the_quota_is_spent() {
        let mut bench = Bench::new();
        bench.intersection.phase = Phase::AllowingIn;
        bench.intersection.in_counter = bench.config.release_batch_size;
        bench.add(1, CarStatus::DecidingAtBottleneck);

        bench.step(0.1, false, 0);
        assert_eq!(bench.car(1).status, CarStatus::WaitingToEnter);
    }

    #[test]
    fn no_bypass_into_a_full_campus() {
        let mut bench = Bench::new();
        bench.intersection.phase = Phase::AllowingIn;
        bench.add(1, CarStatus::DecidingAtBottleneck);

        let limit = bench.config.campus_car_limit;
        assert_eq!(bench.step(0.1, false, limit), limit);
        assert_eq!(bench.car(1).status, CarStatus::WaitingToEnter);
        assert_eq!(bench.intersection.in_counter, 0);
    }

    #[test]
    fn no_bypass_past_a_waiting_car() {
        let mut bench = Bench::new();
        bench.intersection.phase = Phase::AllowingIn;
        bench.add(1, CarStatus::WaitingToEnter);
        bench.add(2, CarStatus::DecidingAtBottleneck);

        bench.step(0.1, false, 0);
        assert_eq!(bench.car(2).status, CarStatus::WaitingToEnter);
    }

    #[test]
    fn no_bypass_outside_the_inbound_phase() {
        let mut bench = Bench::new();
        bench.add(1, CarStatus::DecidingAtBottleneck);

        bench.step(0.1, false, 0);
        assert_eq!(bench.intersection.phase, Phase::AllowingOut);
        assert_eq!(bench.car(1).status, CarStatus::WaitingToEnter);
    }

    #[test]
    fn non_parkers_drop_off_at_the_bottleneck() {
        let mut bench = Bench::new();
        bench.intersection.phase = Phase::AllowingIn;
        bench.add(1, CarStatus::DecidingAtBottleneck).wants_to_park = false;

        bench.step(0.1, false, 0);
        assert_eq!(bench.car(1).status, CarStatus::DroppingOffAtBottleneck);
        assert_eq!(bench.car(1).timer, CAR_DROP_OFF_TIME);
    }

    #[test]
    fn follower_stops_one_spacing_behind_its_leader() {
        let mut bench = Bench::new();
        bench.add(1, CarStatus::WaitingToEnter);
        let approach = bench.layout.approach_road.clone();
        // Three units short of the bottleneck
        let progress = approach.total_length() - 3.0;
        bench.place_on(2, CarStatus::DrivingToBottleneck, approach, progress);

        bench.step(1.0, false, 0);
        let follower = bench.car(2);
        assert_eq!(follower.status, CarStatus::DrivingToBottleneck);
        assert!((follower.progress - (progress + 0.5)).abs() < 1e-3);
        let gap = follower.position.distance(&bench.car(1).position);
        assert!((gap - QUEUE_SPACING).abs() < 1e-3);

        // Already at the minimum gap, so it does not move at all
        bench.step(1.0, false, 0);
        assert!((bench.car(2).progress - (progress + 0.5)).abs() < 1e-3);
    }

    #[test]
    fn follower_slows_behind_traffic_near_the_bottleneck() {
        let mut bench = Bench::new();
        let outer = bench.layout.outer_road.clone();
        let approach = bench.layout.approach_road.clone();
        bench.place_on(1, CarStatus::DrivingToBottleneck, approach, 10.0);
        bench.place_on(2, CarStatus::DrivingToOuterQueue, outer.clone(), 0.0);
        bench.place_on(3, CarStatus::DrivingToOuterQueue, outer, 30.0);

        bench.step(0.5, false, 0);
        // Car 2 follows car 3 on the open road at full speed
        assert!((bench.car(2).progress - CAR_SPEED * 0.5).abs() < 1e-3);
        // Car 3 follows a car on the approach road and is held to two thirds
        assert!((bench.car(3).progress - (30.0 + CAR_SPEED / 1.5 * 0.5)).abs() < 1e-3);
    }

    #[test]
    fn bottleneck_dropoff_holds_while_backpressure_is_engaged() {
        let mut bench = Bench::new();
        let car = bench.add(1, CarStatus::DroppingOffAtBottleneck);
        car.wants_to_park = false;
        car.timer = 0.5;

        bench.step(1.0, true, 0);
        assert_eq!(bench.car(1).status, CarStatus::DroppingOffAtBottleneck);
        assert!(bench.car(1).timer <= 0.0);

        bench.step(0.1, false, 0);
        assert_eq!(bench.car(1).status, CarStatus::DrivingToFinalCheckpoint);
    }

    #[test]
    fn outbound_crossing_runs_on_wall_clock_time() {
        let mut bench = Bench::new();
        let outbound = bench.layout.campus_outbound.clone();
        bench.place_on(1, CarStatus::DrivingThroughBottleneckOutbound, outbound, 0.0);

        let following = FollowingMaps::build(&bench.cars);
        let queues = QueueViews::collect(&bench.cars);
        let ctx = TickContext {
            real_delta: 0.1,
            delta: 0.5,
            campus_delta: 0.5,
            time: 0.0,
            config: &bench.config,
            controls: ManualControls::default(),
            layout: &bench.layout,
            following: &following,
            queues: &queues,
            backpressure: false,
        };
        let mut shared = TickShared {
            parking: &mut bench.parking,
            intersection: &mut bench.intersection,
            campus_occupancy: 0,
            bypassed_this_tick: false,
        };
        update_cars(&mut bench.cars, &ctx, &mut shared);
        assert!((bench.cars[&CarId(1)].progress - CAMPUS_EXIT_SPEED * 0.1).abs() < 1e-4);
    }
}
