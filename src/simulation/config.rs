//! Simulation configuration and manual-mode control signals

use anyhow::{ensure, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the bottleneck controller is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Dynamic phase durations with a capped release batch
    #[default]
    Auto,
    /// Phase changes only on operator command, unbounded release batch
    Manual,
}

/// Directional override requested by the operator in manual mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrafficOverride {
    #[default]
    None,
    AllowIn,
    AllowOut,
}

/// What undecided vehicles at the bottleneck do in manual mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    #[default]
    UseParkProbability,
    DivertAllToDropoff,
}

/// Manual-mode control signals. Ignored in automatic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManualControls {
    pub traffic: TrafficOverride,
    pub decision: DecisionPolicy,
}

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulated seconds per real second
    pub speed_multiplier: f32,
    /// Simulated seconds between spawns
    pub spawn_interval: f32,
    /// Number of vehicles spawned over the whole run
    pub total_cars: u32,
    /// Number of parking slots
    pub parking_capacity: usize,
    /// Probability that a new vehicle wants to park
    pub park_probability: f64,
    /// Vehicles released per phase and direction in automatic mode
    pub release_batch_size: u32,
    /// Seconds each vehicle yields at the final checkpoint before leaving
    pub checkpoint_dwell: f32,
    /// Maximum vehicles inside the campus
    pub campus_car_limit: usize,
    /// Simulated seconds a vehicle stays parked
    pub parking_duration: f32,
    pub mode: OperatingMode,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 5.0,
            spawn_interval: 3.0,
            total_cars: 500,
            parking_capacity: 60,
            park_probability: 0.5,
            release_batch_size: 5,
            checkpoint_dwell: 3.0,
            campus_car_limit: 80,
            parking_duration: 120.0,
            mode: OperatingMode::Auto,
        }
    }
}

impl SimConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Check the invariants the engine assumes but never verifies itself
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.speed_multiplier.is_finite() && self.speed_multiplier > 0.0,
            "speed multiplier must be positive, got {}",
            self.speed_multiplier
        );
        ensure!(
            self.spawn_interval.is_finite() && self.spawn_interval > 0.0,
            "spawn interval must be positive, got {}",
            self.spawn_interval
        );
        ensure!(
            (0.0..=1.0).contains(&self.park_probability),
            "park probability must be within [0, 1], got {}",
            self.park_probability
        );
        ensure!(
            self.release_batch_size >= 1,
            "release batch size must be at least 1"
        );
        ensure!(
            self.checkpoint_dwell.is_finite() && self.checkpoint_dwell >= 0.0,
            "checkpoint dwell must be non-negative, got {}",
            self.checkpoint_dwell
        );
        ensure!(
            self.parking_duration.is_finite() && self.parking_duration >= 0.0,
            "parking duration must be non-negative, got {}",
            self.parking_duration
        );
        Ok(())
    }

    /// Per-phase release quota for the current mode
    pub fn release_batch(&self) -> u32 {
        match self.mode {
            OperatingMode::Auto => self.release_batch_size,
            OperatingMode::Manual => u32::MAX,
        }
    }

    /// Whether undecided vehicles are forced to the bottleneck drop-off
    pub fn diverts_all(&self, controls: &ManualControls) -> bool {
        self.mode == OperatingMode::Manual && controls.decision == DecisionPolicy::DivertAllToDropoff
    }
}
