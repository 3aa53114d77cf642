//! Bottleneck controller for the traffic simulation
//!
//! The junction carries either inbound or outbound traffic, never both. It
//! cycles through four phases; the two steady phases get a duration derived
//! from the length of the queue they serve.

use log::debug;
use serde::Serialize;

use super::config::TrafficOverride;

/// Seconds spent clearing the junction between directions
pub const TRANSITION_TIME: f32 = 2.0;

/// Length of the phase the controller starts in
pub const INITIAL_PHASE_TIME: f32 = 5.0;

/// Minimum seconds between two releases from the bottleneck queues
pub const RELEASE_INTERVAL: f32 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    AllowingIn,
    TransitioningToOut,
    AllowingOut,
    TransitioningToIn,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::AllowingIn => Phase::TransitioningToOut,
            Phase::TransitioningToOut => Phase::AllowingOut,
            Phase::AllowingOut => Phase::TransitioningToIn,
            Phase::TransitioningToIn => Phase::AllowingIn,
        }
    }

    pub fn is_transition(self) -> bool {
        matches!(self, Phase::TransitioningToOut | Phase::TransitioningToIn)
    }
}

/// Outbound green time: 1.5s per queued car on a 5s base, at most 20s
pub fn outbound_phase_duration(exit_queue_len: usize) -> f32 {
    (5.0 + exit_queue_len as f32 * 1.5).clamp(5.0, 20.0)
}

/// Inbound green time: 1s per queued car on a 5s base, at most 15s
pub fn inbound_phase_duration(entry_queue_len: usize) -> f32 {
    (5.0 + entry_queue_len as f32).clamp(5.0, 15.0)
}

/// State of the shared bottleneck
#[derive(Debug, Clone, PartialEq)]
pub struct SimIntersection {
    pub phase: Phase,
    /// Seconds remaining in the current phase
    pub phase_timer: f32,
    /// Vehicles admitted inbound in the current AllowingIn phase
    pub in_counter: u32,
    /// Vehicles released outbound in the current AllowingOut phase
    pub out_counter: u32,
    /// Seconds until the next queue release is allowed
    pub release_timer: f32,
}

impl Default for SimIntersection {
    fn default() -> Self {
        Self::new()
    }
}

impl SimIntersection {
    pub fn new() -> Self {
        Self {
            phase: Phase::AllowingOut,
            phase_timer: INITIAL_PHASE_TIME,
            in_counter: 0,
            out_counter: 0,
            release_timer: 0.0,
        }
    }

    /// Automatic mode: count down, cut idle green phases short, advance on expiry
    pub fn update_auto(&mut self, delta_secs: f32, entry_queue_len: usize, exit_queue_len: usize) {
        self.phase_timer -= delta_secs;

        let idle_green = match self.phase {
            Phase::AllowingOut => exit_queue_len == 0 && entry_queue_len > 0,
            Phase::AllowingIn => entry_queue_len == 0 && exit_queue_len > 0,
            _ => false,
        };
        if idle_green && self.phase_timer > TRANSITION_TIME {
            self.phase_timer = TRANSITION_TIME;
        }

        if self.phase_timer <= 0.0 {
            self.enter_phase(self.phase.next(), entry_queue_len, exit_queue_len);
        }
    }

    /// Manual mode: operator commands trigger transitions, transitions run on their own timer
    pub fn update_manual(&mut self, delta_secs: f32, traffic: TrafficOverride) {
        self.apply_override(traffic);
        if self.phase.is_transition() {
            self.update_auto(delta_secs, 0, 0);
        }
    }

    /// Start a transition toward the requested direction if the opposing flow is active
    pub fn apply_override(&mut self, traffic: TrafficOverride) {
        match (traffic, self.phase) {
            (TrafficOverride::AllowIn, Phase::AllowingOut) => {
                self.enter_phase(Phase::TransitioningToIn, 0, 0)
            }
            (TrafficOverride::AllowOut, Phase::AllowingIn) => {
                self.enter_phase(Phase::TransitioningToOut, 0, 0)
            }
            _ => {}
        }
    }

    fn enter_phase(&mut self, phase: Phase, entry_queue_len: usize, exit_queue_len: usize) {
        self.phase = phase;
        self.phase_timer = match phase {
            Phase::TransitioningToOut => {
                self.in_counter = 0;
                TRANSITION_TIME
            }
            Phase::TransitioningToIn => {
                self.out_counter = 0;
                TRANSITION_TIME
            }
            Phase::AllowingOut => outbound_phase_duration(exit_queue_len),
            Phase::AllowingIn => inbound_phase_duration(entry_queue_len),
        };
        debug!("Bottleneck entered {:?} for {:.1}s", phase, self.phase_timer);
    }

    /// Count down the release stagger. Returns true when a release may happen.
    pub fn release_ready(&mut self, delta_secs: f32) -> bool {
        self.release_timer -= delta_secs;
        self.release_timer <= 0.0
    }

    pub fn admits_inbound(&self, batch: u32) -> bool {
        self.phase == Phase::AllowingIn && self.in_counter < batch
    }

    pub fn admits_outbound(&self, batch: u32) -> bool {
        self.phase == Phase::AllowingOut && self.out_counter < batch
    }

    /// A queued vehicle was released into the campus
    pub fn record_inbound_release(&mut self) {
        self.in_counter += 1;
        self.release_timer = RELEASE_INTERVAL;
    }

    /// A queued vehicle was released out of the campus
    pub fn record_outbound_release(&mut self) {
        self.out_counter += 1;
        self.release_timer = RELEASE_INTERVAL;
    }

    /// A vehicle skipped the entry queue. Counts toward the quota, leaves the stagger alone.
    pub fn record_bypass(&mut self) {
        self.in_counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_durations_are_clamped() {
        assert_eq!(outbound_phase_duration(0), 5.0);
        assert_eq!(outbound_phase_duration(4), 11.0);
        assert_eq!(outbound_phase_duration(50), 20.0);
        assert_eq!(inbound_phase_duration(3), 8.0);
        assert_eq!(inbound_phase_duration(40), 15.0);
    }

    #[test]
    fn cycles_through_all_phases() {
        let mut intersection = SimIntersection::new();
        let mut seen = vec![intersection.phase];
        for _ in 0..4 {
            let remaining = intersection.phase_timer;
            intersection.update_auto(remaining, 0, 0);
            seen.push(intersection.phase);
        }
        assert_eq!(
            seen,
            vec![
                Phase::AllowingOut,
                Phase::TransitioningToIn,
                Phase::AllowingIn,
                Phase::TransitioningToOut,
                Phase::AllowingOut,
            ]
        );
    }

    #[test]
    fn green_time_depends_on_queue_at_entry() {
        let mut intersection = SimIntersection::new();
        intersection.update_auto(5.0, 0, 0);
        assert_eq!(intersection.phase, Phase::TransitioningToIn);
        intersection.update_auto(2.0, 7, 0);
        assert_eq!(intersection.phase, Phase::AllowingIn);
        assert_eq!(intersection.phase_timer, 12.0);
    }

    #[test]
    fn idle_green_is_cut_to_transition_time() {
        let mut intersection = SimIntersection::new();
        intersection.phase_timer = 18.0;
        intersection.update_auto(0.5, 3, 0);
        assert_eq!(intersection.phase, Phase::AllowingOut);
        assert_eq!(intersection.phase_timer, TRANSITION_TIME);
    }

    #[test]
    fn transition_resets_the_counter_of_the_closing_direction() {
        let mut intersection = SimIntersection::new();
        intersection.record_outbound_release();
        intersection.record_outbound_release();
        assert_eq!(intersection.out_counter, 2);
        intersection.update_auto(5.0, 0, 0);
        assert_eq!(intersection.phase, Phase::TransitioningToIn);
        assert_eq!(intersection.out_counter, 0);
    }

    #[test]
    fn manual_override_only_flips_the_opposing_steady_phase() {
        let mut intersection = SimIntersection::new();
        intersection.update_manual(0.1, TrafficOverride::AllowOut);
        assert_eq!(intersection.phase, Phase::AllowingOut);

        intersection.update_manual(0.0, TrafficOverride::AllowIn);
        assert_eq!(intersection.phase, Phase::TransitioningToIn);
        assert_eq!(intersection.phase_timer, TRANSITION_TIME);

        // Without a command the steady phase never times out
        intersection.update_manual(TRANSITION_TIME, TrafficOverride::None);
        assert_eq!(intersection.phase, Phase::AllowingIn);
        intersection.update_manual(1000.0, TrafficOverride::None);
        assert_eq!(intersection.phase, Phase::AllowingIn);
    }

    #[test]
    fn release_stagger() {
        let mut intersection = SimIntersection::new();
        assert!(intersection.release_ready(0.1));
        intersection.record_inbound_release();
        assert!(!intersection.release_ready(1.0));
        assert!(intersection.release_ready(1.5));
    }
}
