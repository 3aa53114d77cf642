use std::process::{Command, Output};

fn run_simulation(extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_campus_traffic"))
        .args([
            "--total-cars",
            "6",
            "--spawn-interval",
            "2",
            "--parking-duration",
            "20",
            "--seed",
            "7",
            "--frame-delta",
            "0.05",
        ])
        .args(extra)
        .env("RUST_LOG", "warn,campus_traffic=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Test that the simulation runs in headless mode without crashing
#[test]
fn test_headless_simulation_runs() {
    let output = run_simulation(&[]);

    assert!(
        output.status.success(),
        "Simulation failed to run in headless mode. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );
}

/// Test that simulation statistics are logged
#[test]
fn test_simulation_statistics_logged() {
    let output = run_simulation(&[]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    for key in [
        "Total cars spawned:",
        "Total cars exited:",
        "Active cars:",
        "Parking occupancy:",
        "First congestion:",
        "Total congestion time:",
    ] {
        assert!(stderr.contains(key), "Missing '{}' statistic", key);
    }

    // Parse the number - handle log format with timestamp
    let exited_line = stderr
        .lines()
        .find(|line| line.contains("Total cars exited:"))
        .expect("Could not find 'Total cars exited' line");
    let exited: u32 = exited_line
        .split("Total cars exited:")
        .nth(1)
        .and_then(|s| s.trim().parse().ok())
        .expect("Could not parse exited count");
    assert_eq!(exited, 6, "Not every car left the map");
}

/// Test that the final snapshot can be requested as JSON
#[test]
fn test_json_snapshot_output() {
    let output = run_simulation(&["--json"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let snapshot: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be a JSON snapshot");
    assert_eq!(snapshot["finished"], true);
    assert_eq!(snapshot["metrics"]["total_spawned"], 6);
    assert!(snapshot["vehicles"].as_array().is_some_and(|v| v.is_empty()));
}

/// Test that invalid settings are rejected before the run starts
#[test]
fn test_invalid_config_is_rejected() {
    let output = run_simulation(&["--park-probability", "2"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid simulation configuration"),
        "Unexpected error output: {}",
        stderr
    );
}
