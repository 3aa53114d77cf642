//! Campus Traffic Simulation Library
//!
//! A tick-driven simulation of vehicles competing for a single shared
//! bottleneck between a public road network and a campus parking lot.

pub mod simulation;
