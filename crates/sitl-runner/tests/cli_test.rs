//! End-to-end tests of the `sitl` binary.
//!
//! These run the binary as a subprocess so the process-wide Ctrl+C handler
//! and tracing subscriber are installed fresh for each run. They use
//! #[serial] to keep wall-clock timings from interfering.

use serde_json::Value;
use serial_test::serial;
use std::process::Command;

fn sitl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sitl"))
}

fn run_json(args: &[&str]) -> Value {
    let output = sitl().arg("run").args(args).output().unwrap();
    assert!(
        output.status.success(),
        "sitl run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
#[serial]
fn test_run_reaches_duration() {
    let stats = run_json(&["--speedup", "0", "--duration", "1"]);
    assert_eq!(stats["steps"], 400);
    assert_eq!(stats["sim_time_s"], 1.0);
    assert_eq!(stats["multicast_states_sent"], 0);
    assert!(stats.get("metrics").is_none());
}

#[test]
#[serial]
fn test_run_reports_recorded_metrics() {
    let stats = run_json(&["--speedup", "0", "--duration", "1", "--metrics-output"]);
    let metrics = &stats["metrics"];
    assert_eq!(metrics["counters"]["sitl.step.ticks"], 400);
    assert_eq!(metrics["histograms"]["sitl.step.duration_us"]["count"], 400);
    assert!(metrics["gauges"]["sitl.actuator.throttle"].is_number());
}

#[test]
#[serial]
fn test_run_with_fixed_throttle_climbs() {
    let stats = run_json(&[
        "--speedup",
        "0",
        "--duration",
        "2s",
        "--throttle-pwm",
        "1700",
    ]);
    let throttle = stats["throttle"].as_f64().unwrap();
    assert!((throttle - 0.7).abs() < 1e-4);
    assert!(stats["state"]["altitude"].as_f64().unwrap() > 584.0);
    assert_eq!(stats["home_alt"], 584.0);
}

#[test]
#[serial]
fn test_run_rejects_unknown_default() {
    let output = sitl()
        .args(["run", "--speedup", "0", "--duration", "1", "--defaults", "SIM_NOPE=1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
#[serial]
fn test_params_lists_registry() {
    let output = sitl().arg("params").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for name in ["SIM_WIND_SPD", "SIM_ENGINE_FAIL", "SIM_CAN_SRV_MSK", "SIM_TERRAIN"] {
        assert!(text.contains(name), "missing {}", name);
    }
}
