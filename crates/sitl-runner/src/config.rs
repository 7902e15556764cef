//! Bridge configuration file.
//!
//! ```yaml
//! vehicle: plane
//! instance: 1
//! speedup: 5
//! hover:
//!   rate_hz: 400
//!   home: { latitude: -35.36, longitude: 149.16, altitude: 584 }
//! multicast:
//!   enabled: true
//! flightgear: 127.0.0.1:5503
//! serial0_port: 5760
//! params:
//!   SIM_WIND_SPD: 5
//!   SIM_ENGINE_FAIL: 1
//! ```

use crate::clock::ClockConfig;
use crate::error::{Result, SitlError};
use crate::hover::{HoverConfig, MAX_RATE_HZ};
use crate::multicast::MulticastConfig;
use serde::{Deserialize, Serialize};
use sitl_common::VehicleType;
use sitl_params::ParamStore;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

/// Default step watchdog timeout in seconds.
pub const DEFAULT_STEP_WATCHDOG_TIMEOUT_S: u64 = 10;

/// Everything needed to start a simulator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitlConfig {
    /// Vehicle type.
    pub vehicle: VehicleType,
    /// Instance number, used to offset ports.
    pub instance: u16,
    /// Ratio of simulated to wall-clock time. 0 runs unpaced.
    pub speedup: f64,
    /// Built-in model settings.
    pub hover: HoverConfig,
    /// Multicast settings.
    pub multicast: MulticastConfig,
    /// FlightGear viewer address.
    pub flightgear: Option<SocketAddr>,
    /// TCP port for serial 0. Offset by the instance number.
    pub serial0_port: Option<u16>,
    /// Parameter overrides applied on top of the built-in defaults.
    pub params: BTreeMap<String, f64>,
    /// Clock wait tuning.
    pub clock: ClockConfig,
    /// Interval for periodic stats in seconds. `None` disables them.
    pub periodic_stats_interval_s: Option<u64>,
    /// Warn when one physics step takes longer than this, in seconds.
    pub step_watchdog_timeout_s: u64,
    /// Exit if the launching process goes away.
    pub watch_parent: bool,
}

impl Default for SitlConfig {
    fn default() -> Self {
        SitlConfig {
            vehicle: VehicleType::Copter,
            instance: 0,
            speedup: 1.0,
            hover: HoverConfig::default(),
            multicast: MulticastConfig::default(),
            flightgear: None,
            serial0_port: None,
            params: BTreeMap::new(),
            clock: ClockConfig::default(),
            periodic_stats_interval_s: Some(10),
            step_watchdog_timeout_s: DEFAULT_STEP_WATCHDOG_TIMEOUT_S,
            watch_parent: true,
        }
    }
}

impl SitlConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot constrain.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RATE_HZ).contains(&self.hover.rate_hz) {
            return Err(SitlError::Config(format!(
                "hover.rate_hz must be between 1 and {}, got {}",
                MAX_RATE_HZ, self.hover.rate_hz
            )));
        }
        Ok(())
    }

    /// Load a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SitlError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Build the parameter store: built-in defaults, then the `params` map.
    pub fn param_store(&self) -> Result<ParamStore> {
        let mut store = ParamStore::new();
        store.apply_map(&self.params)?;
        Ok(store)
    }

    /// TCP port for serial 0 after the instance offset.
    pub fn serial0_port_for_instance(&self) -> Option<u16> {
        self.serial0_port.map(|p| p.wrapping_add(self.instance))
    }
}
