//! Height above ground.

use crate::model::TerrainProvider;
use sitl_common::SimulatedState;
use tracing::info;

/// Computes height above ground from terrain data, or from the home
/// altitude when no terrain sample is available.
#[derive(Debug, Clone, Default)]
pub struct HeightAgl {
    home_alt: Option<f64>,
}

impl HeightAgl {
    /// Create with no home altitude latched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Home altitude, once latched.
    pub fn home_alt(&self) -> Option<f64> {
        self.home_alt
    }

    /// Height above ground for `state`.
    ///
    /// The first strictly positive altitude is latched as home and never
    /// changes afterwards. Before that, the flat-earth fallback measures from
    /// zero.
    pub fn update(
        &mut self,
        state: &SimulatedState,
        terrain: Option<&dyn TerrainProvider>,
        terrain_enabled: bool,
    ) -> f32 {
        if self.home_alt.is_none() && state.altitude > 0.0 {
            info!(home_alt = state.altitude, "home altitude latched");
            self.home_alt = Some(state.altitude);
        }

        if terrain_enabled {
            if let Some(ground) = terrain.and_then(|t| t.height_amsl(state.latitude, state.longitude)) {
                return (state.altitude - ground as f64) as f32;
            }
        }

        // unlatched home is sea level, not a -1 m sentinel
        (state.altitude - self.home_alt.unwrap_or(0.0)) as f32
    }
}
