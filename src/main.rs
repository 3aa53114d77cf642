use anyhow::{ensure, Context, Result};
use campus_traffic::simulation::{
    format_clock, format_optional_clock, DecisionPolicy, ManualControls, OperatingMode, SimConfig,
    SimWorld, TickOutcome, TrafficOverride, MAX_FRAME_DELTA,
};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "campus_traffic")]
#[command(about = "Headless campus traffic simulation")]
struct Cli {
    /// JSON file with simulation settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated seconds per real second
    #[arg(long)]
    speed_multiplier: Option<f32>,

    /// Simulated seconds between spawns
    #[arg(long)]
    spawn_interval: Option<f32>,

    /// Number of cars to spawn over the run
    #[arg(long)]
    total_cars: Option<u32>,

    /// Number of parking slots
    #[arg(long)]
    parking_capacity: Option<usize>,

    /// Probability that a car wants to park
    #[arg(long)]
    park_probability: Option<f64>,

    /// Cars released per phase and direction in auto mode
    #[arg(long)]
    release_batch_size: Option<u32>,

    /// Seconds each car waits at the final checkpoint
    #[arg(long)]
    checkpoint_dwell: Option<f32>,

    /// Maximum cars inside the campus
    #[arg(long)]
    campus_car_limit: Option<usize>,

    /// Simulated seconds a car stays parked
    #[arg(long)]
    parking_duration: Option<f32>,

    #[arg(long, value_enum)]
    mode: Option<OperatingMode>,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Real seconds per tick
    #[arg(long, default_value_t = 1.0 / 60.0)]
    frame_delta: f32,

    /// Stop after this many ticks even if cars remain
    #[arg(long, default_value_t = 2_000_000)]
    max_ticks: u64,

    /// Simulated seconds between progress reports
    #[arg(long, default_value_t = 300.0)]
    report_every: f32,

    /// Print the final snapshot as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Manual mode: direction to switch the bottleneck to
    #[arg(long = "override", value_enum, default_value_t = TrafficOverride::None)]
    traffic_override: TrafficOverride,

    /// Manual mode: what undecided cars do at the bottleneck
    #[arg(long, value_enum, default_value_t = DecisionPolicy::UseParkProbability)]
    decision: DecisionPolicy,
}

impl Cli {
    fn build_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)?,
            None => SimConfig::default(),
        };

        if let Some(v) = self.speed_multiplier {
            config.speed_multiplier = v;
        }
        if let Some(v) = self.spawn_interval {
            config.spawn_interval = v;
        }
        if let Some(v) = self.total_cars {
            config.total_cars = v;
        }
        if let Some(v) = self.parking_capacity {
            config.parking_capacity = v;
        }
        if let Some(v) = self.park_probability {
            config.park_probability = v;
        }
        if let Some(v) = self.release_batch_size {
            config.release_batch_size = v;
        }
        if let Some(v) = self.checkpoint_dwell {
            config.checkpoint_dwell = v;
        }
        if let Some(v) = self.campus_car_limit {
            config.campus_car_limit = v;
        }
        if let Some(v) = self.parking_duration {
            config.parking_duration = v;
        }
        if let Some(v) = self.mode {
            config.mode = v;
        }

        config.validate().context("Invalid simulation configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,campus_traffic=info"),
    )
    .init();

    let cli = Cli::parse();
    ensure!(
        cli.frame_delta > 0.0 && cli.frame_delta <= MAX_FRAME_DELTA,
        "frame delta must be in (0, {}], got {}",
        MAX_FRAME_DELTA,
        cli.frame_delta
    );

    let config = cli.build_config()?;
    info!(
        "Starting simulation: {} cars, {} parking slots, {:?} mode",
        config.total_cars, config.parking_capacity, config.mode
    );

    let mut world = match cli.seed {
        Some(seed) => SimWorld::new_with_seed(config, seed),
        None => SimWorld::new(config),
    };
    world.set_manual_controls(ManualControls {
        traffic: cli.traffic_override,
        decision: cli.decision,
    });

    run_headless(&mut world, &cli);
    log_completion(&world);

    if cli.json {
        let json = serde_json::to_string_pretty(&world.snapshot())
            .context("Failed to serialize the final snapshot")?;
        println!("{}", json);
    } else {
        world.print_summary();
    }
    Ok(())
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(world: &mut SimWorld, cli: &Cli) {
    let mut next_report = cli.report_every;
    for _ in 0..cli.max_ticks {
        if world.tick(cli.frame_delta) == TickOutcome::Finished {
            return;
        }

        if cli.report_every > 0.0 && world.time >= next_report {
            next_report += cli.report_every;
            let metrics = &world.metrics;
            info!(
                "[{}] active={} parked={}/{} spawn_queue={} in={} out={} final={} flow={}",
                format_clock(world.time),
                metrics.active,
                world.parking.occupied(),
                world.parking.capacity(),
                metrics.spawn_queue,
                metrics.waiting_inbound,
                metrics.waiting_outbound,
                metrics.final_checkpoint,
                metrics.flow
            );
        }
    }
    if !world.is_finished() {
        warn!(
            "Stopped after {} ticks with {} cars still active",
            cli.max_ticks,
            world.cars.len()
        );
    }
}

fn log_completion(world: &SimWorld) {
    let summary = &world.summary;
    info!("=== SIMULATION COMPLETE ===");
    info!("Elapsed time: {} ({:.2}s)", format_clock(world.time), world.time);
    info!("Total cars spawned: {}", world.spawned);
    info!("Total cars exited: {}", world.exited);
    info!("Active cars: {}", world.cars.len());
    info!(
        "Parking occupancy: {}/{}",
        world.parking.occupied(),
        world.parking.capacity()
    );
    info!(
        "First time parking was full: {}",
        format_optional_clock(summary.first_parking_full_time)
    );
    info!(
        "First congestion: {}",
        format_optional_clock(summary.first_congestion_time)
    );
    info!(
        "Last congestion: {}",
        format_optional_clock(summary.last_congestion_time)
    );
    info!(
        "Total congestion time: {}",
        format_clock(summary.total_congestion_time)
    );
}
