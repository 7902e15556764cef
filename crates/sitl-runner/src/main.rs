//! # sitl
//!
//! Command line entry point for the SITL bridge.
//!
//! Runs the built-in hover model against the bridge so the network outputs
//! can be exercised without firmware, lists the simulator parameters and
//! decodes the multicast state stream.

use clap::{Parser, Subcommand};
use sitl_metrics::InstanceLabels;
use sitl_params::{ParamStore, ALL_PARAMS, SIM_SPEEDUP};
use sitl_runner::{
    FlightGearView, HoverModel, InMemoryRecorder, MulticastChannel, OutboundQueue, ParentWatch, RealTimeConfig,
    Scheduler, Serial0Bridge, SimTime, Simulation, SimulationStats, SitlConfig, SitlError,
    StepDriver, StepWatchdog, VehicleType,
};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Duration Parsing
// ============================================================================

/// Parse a duration string with units into seconds.
///
/// Supported formats:
/// - Plain number: `60` (interpreted as seconds)
/// - With unit suffix: `60s`, `10m`, `2h`, `1d`
/// - Combined units: `1h30m`, `2d12h`, `1d2h30m45s`
fn parse_duration(s: &str) -> Result<f64, String> {
    let s = s.trim();

    if let Ok(secs) = s.parse::<f64>() {
        return Ok(secs);
    }

    let mut total_seconds: f64 = 0.0;
    let mut current_number = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() || c == '.' {
            current_number.push(c);
            continue;
        }
        if current_number.is_empty() {
            return Err(format!("Invalid duration format: unexpected '{}' in '{}'", c, s));
        }
        let value: f64 = current_number
            .parse()
            .map_err(|_| format!("Invalid number '{}' in duration '{}'", current_number, s))?;
        let multiplier = match c {
            's' => 1.0,
            'm' => 60.0,
            'h' => 3600.0,
            'd' => 86400.0,
            _ => return Err(format!("Unknown duration unit '{}' in '{}'. Use s, m, h, or d.", c, s)),
        };
        total_seconds += value * multiplier;
        current_number.clear();
    }

    // trailing number without unit is seconds
    if !current_number.is_empty() {
        let value: f64 = current_number
            .parse()
            .map_err(|_| format!("Invalid number '{}' in duration '{}'", current_number, s))?;
        total_seconds += value;
    }

    if total_seconds == 0.0 && !s.is_empty() {
        return Err(format!("Invalid duration format: '{}'", s));
    }

    Ok(total_seconds)
}

// ============================================================================
// CLI Configuration
// ============================================================================

/// SITL bridge - simulation clock and IO for flight firmware
#[derive(Parser, Debug)]
#[command(name = "sitl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge with the built-in hover model
    Run(RunConfig),
    /// List all simulator parameters with defaults and units
    Params,
    /// List all metrics with descriptions
    Metrics,
    /// Listen on the state multicast group and print decoded states as JSON
    DecodeState(DecodeStateConfig),
}

/// Configuration for a bridge run
#[derive(Parser, Debug)]
pub struct RunConfig {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Vehicle type (copter, plane, rover, sub)
    #[arg(long)]
    pub vehicle: Option<VehicleType>,

    /// Ratio of simulated to wall-clock time (0 = as fast as possible)
    #[arg(long)]
    pub speedup: Option<f64>,

    /// Parameter default as NAME=VALUE (repeatable)
    #[arg(long = "defaults", value_name = "NAME=VALUE")]
    pub defaults: Vec<String>,

    /// Simulated duration to run (e.g., 60, 10m, 1h30m). Runs until Ctrl+C if omitted
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<f64>,

    /// FlightGear viewer address
    #[arg(long, value_name = "ADDR:PORT")]
    pub fg_view: Option<SocketAddr>,

    /// Instance number
    #[arg(short = 'I', long)]
    pub instance: Option<u16>,

    /// TCP port for serial 0, offset by the instance number
    #[arg(long)]
    pub serial0_port: Option<u16>,

    /// Publish state and accept overrides on the multicast group
    #[arg(long)]
    pub multicast: bool,

    /// Drive the motor channels at this fixed value after the first step
    #[arg(long, value_name = "PWM")]
    pub throttle_pwm: Option<u16>,

    /// Record metrics and include them in the JSON summary
    #[arg(long)]
    pub metrics_output: bool,
}

/// Configuration for the state decoder
#[derive(Parser, Debug)]
pub struct DecodeStateConfig {
    /// YAML configuration file providing the multicast group
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stop after this many states
    #[arg(short = 'n', long)]
    pub count: Option<u64>,
}

// ============================================================================
// Run
// ============================================================================

fn install_stop_handler() -> Result<Arc<AtomicBool>, SitlError> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| SitlError::Config(format!("Error setting Ctrl+C handler: {}", e)))?;
    Ok(stop_flag)
}

fn load_config(path: Option<&PathBuf>) -> Result<SitlConfig, SitlError> {
    match path {
        Some(path) => SitlConfig::load(path),
        None => Ok(SitlConfig::default()),
    }
}

/// Resolve parameters: built-in defaults, the config file, then `--defaults`.
fn resolve_params(sitl_config: &SitlConfig, defaults: &[String]) -> Result<ParamStore, SitlError> {
    let mut params = sitl_config.param_store()?;
    params.set(&SIM_SPEEDUP, sitl_config.speedup as f32);
    for assignment in defaults {
        let (def, value) = params.apply_default(assignment)?;
        info!(param = def.name, %value, "parameter default set");
    }
    Ok(params)
}

pub fn run_sitl(config: RunConfig) -> Result<SimulationStats, SitlError> {
    let mut sitl_config = load_config(config.config.as_ref())?;
    if let Some(vehicle) = config.vehicle {
        sitl_config.vehicle = vehicle;
    }
    if let Some(speedup) = config.speedup {
        sitl_config.speedup = speedup;
    }
    if let Some(instance) = config.instance {
        sitl_config.instance = instance;
    }
    if config.fg_view.is_some() {
        sitl_config.flightgear = config.fg_view;
    }
    if config.serial0_port.is_some() {
        sitl_config.serial0_port = config.serial0_port;
    }
    if config.multicast {
        sitl_config.multicast.enabled = true;
    }

    let params = resolve_params(&sitl_config, &config.defaults)?;
    let metrics_recorder = if config.metrics_output {
        install_metrics_recorder()
    } else {
        None
    };
    let vehicle = sitl_config.vehicle;
    let labels = InstanceLabels::new(sitl_config.instance, vehicle.as_str());

    let pacing = RealTimeConfig::with_speedup(f64::from(params.get(&SIM_SPEEDUP)))
        .with_periodic_stats_interval(sitl_config.periodic_stats_interval_s);
    let model = HoverModel::new(vehicle, sitl_config.hover.clone(), pacing);
    let dt_us = model.dt_us();

    let mut driver = StepDriver::new(vehicle, Box::new(model), labels.clone());
    if sitl_config.multicast.enabled {
        driver = driver.with_multicast(MulticastChannel::new(
            sitl_config.multicast.clone(),
            sitl_config.instance,
            labels.clone(),
        ));
    }
    if let Some(addr) = sitl_config.flightgear {
        driver = driver.with_flightgear(FlightGearView::connect(addr)?);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let scheduler = Arc::new(Scheduler::new());
    let watchdog = (sitl_config.step_watchdog_timeout_s > 0)
        .then(|| StepWatchdog::new(Duration::from_secs(sitl_config.step_watchdog_timeout_s)));

    let mut sim = Simulation::new(
        Arc::clone(&scheduler),
        driver,
        Arc::new(parking_lot::RwLock::new(params)),
        sitl_config.clock.clone(),
        labels,
    );
    if !sitl_config.watch_parent {
        sim = sim.with_parent_watch(ParentWatch::disabled());
    }
    if let Some(watchdog) = &watchdog {
        sim = sim.with_watchdog(Arc::clone(watchdog.state()));
    }
    if let Some(port) = sitl_config.serial0_port_for_instance() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let bridge = Serial0Bridge::start(addr, runtime.handle()).map_err(|source| {
            SitlError::SocketSetup {
                what: "serial0 listen",
                addr: addr.to_string(),
                source,
            }
        })?;
        let queue: Arc<dyn OutboundQueue> = Arc::new(bridge);
        sim = sim.with_serial0(queue);
    }

    if let Some(pwm) = config.throttle_pwm {
        let outputs = Arc::clone(sim.outputs());
        scheduler.set_armed(true);
        scheduler.register_timer_process(Box::new(move || {
            outputs.write_outputs(0, &[pwm; 8]);
            outputs.set_output_ready(true);
        }));
    }

    let stop_flag = install_stop_handler()?;
    let end_time = config.duration.map(SimTime::from_secs);

    info!(
        %vehicle,
        instance = sitl_config.instance,
        speedup = sitl_config.speedup,
        "starting simulation"
    );

    while !stop_flag.load(Ordering::Relaxed) {
        if end_time.is_some_and(|end| scheduler.now() >= end) {
            break;
        }
        if let Err(e) = sim.delay_us(dt_us) {
            if e.is_fatal() {
                error!(error = %e, "fatal simulation error");
            }
            return Err(e);
        }
    }

    if let Some(watchdog) = watchdog {
        watchdog.stop();
    }
    sim.log_summary();
    let mut stats = sim.stats();
    stats.metrics = metrics_recorder.map(|recorder| recorder.snapshot());
    Ok(stats)
}

/// Install the in-memory recorder as the process-wide metrics sink.
fn install_metrics_recorder() -> Option<InMemoryRecorder> {
    let recorder = InMemoryRecorder::new();
    if let Err(e) = metrics::set_global_recorder(recorder.clone()) {
        warn!(error = %e, "failed to install metrics recorder");
        return None;
    }
    sitl_metrics::describe_metrics();
    Some(recorder)
}

// ============================================================================
// Decode State
// ============================================================================

fn decode_state_command(config: DecodeStateConfig) -> Result<(), SitlError> {
    let sitl_config = load_config(config.config.as_ref())?;
    let multicast = &sitl_config.multicast;

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, multicast.state_port));
    let socket = UdpSocket::bind(bind_addr).map_err(|source| SitlError::SocketSetup {
        what: "state listen",
        addr: bind_addr.to_string(),
        source,
    })?;
    socket
        .join_multicast_v4(&multicast.group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|source| SitlError::SocketSetup {
            what: "multicast join",
            addr: multicast.group.to_string(),
            source,
        })?;
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;

    let stop_flag = install_stop_handler()?;
    let mut buf = [0u8; 1024];
    let mut decoded = 0u64;

    while !stop_flag.load(Ordering::Relaxed) && config.count.map_or(true, |n| decoded < n) {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(e) => return Err(e.into()),
        };
        match sitl_wire::decode_state(&buf[..len]) {
            Ok(state) => {
                println!("{}", serde_json::to_string(&state)?);
                decoded += 1;
            }
            Err(e) => tracing::debug!(error = %e, len, "ignoring datagram"),
        }
    }
    Ok(())
}

// ============================================================================
// Listings
// ============================================================================

/// Print information about all simulator parameters
fn print_params_info() {
    println!("SITL Parameters");
    println!("===============\n");

    println!("Parameters resolve in order:");
    println!("  1. Built-in defaults (shown below)");
    println!("  2. The `params` map of the YAML config file");
    println!("  3. --defaults NAME=VALUE flags, in order given\n");

    for def in ALL_PARAMS {
        println!("  {}", def.name);
        println!("    {}", def.description);
        print!("    Type: {}  Default: {}", def.param_type, def.default_value());
        if let Some(unit) = def.unit {
            print!(" {}", unit);
        }
        println!("\n");
    }

    println!("## Usage Examples\n");
    println!("  # Strong gusty wind from the west:");
    println!("  sitl run --defaults SIM_WIND_SPD=10 --defaults SIM_WIND_DIR=270 --defaults SIM_WIND_TURB=2\n");
    println!("  # Fail motor 3 at half power:");
    println!("  sitl run --defaults SIM_ENGINE_FAIL=4 --defaults SIM_ENGINE_MUL=0.5\n");
}

/// Print information about all available metrics
fn print_metrics_info() {
    use sitl_metrics::metric_defs;

    println!("SITL Available Metrics");
    println!("======================\n");

    println!("All metrics carry the following labels:");
    println!("  - instance: Simulator instance number");
    println!("  - vehicle: Vehicle type");
    println!();

    for metric in metric_defs::ALL {
        println!("  {}", metric.name);
        println!("    Type: {}", metric.kind);
        let unit_str = metric.unit_str();
        if !unit_str.is_empty() {
            println!("    Unit: {}", unit_str);
        }
        if !metric.description.is_empty() {
            println!("    Description: {}", metric.description);
        }
        println!();
    }
}

fn main() -> Result<(), SitlError> {
    // Default to "warn" level if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(config) => {
            let stats = run_sitl(config)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Params => {
            print_params_info();
        }
        Commands::Metrics => {
            print_metrics_info();
        }
        Commands::DecodeState(config) => {
            decode_state_command(config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60"), Ok(60.0));
        assert_eq!(parse_duration("10m"), Ok(600.0));
        assert_eq!(parse_duration("1h30m"), Ok(5400.0));
        assert_eq!(parse_duration("1d2h30m45s"), Ok(95445.0));
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_resolve_params_order() {
        let mut sitl_config = SitlConfig::default();
        sitl_config.speedup = 3.0;
        sitl_config.params.insert("SIM_WIND_SPD".to_string(), 4.0);

        let params = resolve_params(
            &sitl_config,
            &["SIM_WIND_SPD=9".to_string(), "SIM_SPEEDUP=8".to_string()],
        )
        .unwrap();
        assert_eq!(params.get(&sitl_params::SIM_WIND_SPD), 9.0);
        assert_eq!(params.get(&SIM_SPEEDUP), 8.0);

        let params = resolve_params(&sitl_config, &[]).unwrap();
        assert_eq!(params.get(&sitl_params::SIM_WIND_SPD), 4.0);
        assert_eq!(params.get(&SIM_SPEEDUP), 3.0);
    }

    #[test]
    fn test_resolve_params_rejects_bad_default() {
        let sitl_config = SitlConfig::default();
        assert!(matches!(
            resolve_params(&sitl_config, &["SIM_WIND_SPD".to_string()]),
            Err(SitlError::Param(_))
        ));
        assert!(matches!(
            resolve_params(&sitl_config, &["SIM_WIND_SPD=fast".to_string()]),
            Err(SitlError::Param(_))
        ));
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "sitl",
            "run",
            "--vehicle",
            "plane",
            "--speedup",
            "2",
            "--defaults",
            "SIM_WIND_SPD=5",
            "--duration",
            "1m",
            "--fg-view",
            "127.0.0.1:5503",
        ])
        .unwrap();
        let Commands::Run(config) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(config.vehicle, Some(VehicleType::Plane));
        assert_eq!(config.duration, Some(60.0));
        assert_eq!(config.defaults, vec!["SIM_WIND_SPD=5".to_string()]);
        assert!(!config.metrics_output);
    }
}
