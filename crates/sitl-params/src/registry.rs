//! Parameter registry and the runtime parameter store.
//!
//! This module provides:
//! - [`ALL_PARAMS`] - Array of all registered parameter definitions
//! - Lookup functions for finding parameters by name
//! - [`ParamStore`] - Current values for every registered parameter

use super::definitions::*;
use super::error::{ParamError, Result};
use super::types::{Param, ParamDef};
use super::value::{FromParamValue, ParamValue, ToParamValue};
use std::collections::HashMap;

// ============================================================================
// All Params Array (for runtime lookup)
// ============================================================================

/// All registered parameter definitions.
pub const ALL_PARAMS: &[&ParamDef] = &[
    // Wind
    &SIM_WIND_SPD.def,
    &SIM_WIND_DIR.def,
    &SIM_WIND_DIR_Z.def,
    &SIM_WIND_TURB.def,
    &SIM_WIND_TC.def,
    &SIM_WIND_T.def,
    &SIM_WIND_T_ALT.def,
    &SIM_WIND_T_COEF.def,
    // Actuators
    &SIM_ENGINE_MUL.def,
    &SIM_ENGINE_FAIL.def,
    &SIM_CAN_SRV_MSK.def,
    // Environment
    &SIM_TERRAIN.def,
    &SIM_SPEEDUP.def,
];

// ============================================================================
// Lookup Functions
// ============================================================================

/// Check if a parameter name is registered.
pub fn is_known_param(name: &str) -> bool {
    get_param_def(name).is_some()
}

/// Get a parameter definition by name.
pub fn get_param_def(name: &str) -> Option<&'static ParamDef> {
    ALL_PARAMS.iter().find(|p| p.name == name).copied()
}

// ============================================================================
// Param Store
// ============================================================================

/// Current values for every registered parameter.
#[derive(Debug, Clone)]
pub struct ParamStore {
    values: HashMap<&'static ParamDef, ParamValue>,
}

impl ParamStore {
    /// Create a store holding the default of every registered parameter.
    pub fn new() -> Self {
        let values = ALL_PARAMS.iter().map(|p| (*p, p.default_value())).collect();
        Self { values }
    }

    /// Get a parameter value with compile-time type safety.
    pub fn get<T: FromParamValue>(&self, param: &Param<T>) -> T {
        T::from_param_value(&self.get_raw(&param.def))
    }

    /// Get the stored value for a definition, or its default.
    pub fn get_raw(&self, def: &ParamDef) -> ParamValue {
        self.values
            .get(def)
            .copied()
            .unwrap_or_else(|| def.default_value())
    }

    /// Set a parameter value.
    pub fn set<T: ToParamValue>(&mut self, param: &'static Param<T>, value: T) {
        let coerced = param
            .def
            .param_type
            .coerce(value.to_param_value().as_f64());
        self.values.insert(&param.def, coerced);
    }

    /// Set a parameter by name, coercing the value to its storage type.
    pub fn set_by_name(&mut self, name: &str, value: f64) -> Result<ParamValue> {
        let def = get_param_def(name).ok_or_else(|| ParamError::UnknownParam(name.to_string()))?;
        let coerced = def.param_type.coerce(value);
        self.values.insert(def, coerced);
        Ok(coerced)
    }

    /// Apply a `NAME=VALUE` default, as given on the command line.
    ///
    /// Returns the definition that was changed and its new stored value.
    pub fn apply_default(&mut self, assignment: &str) -> Result<(&'static ParamDef, ParamValue)> {
        let (name, raw) = assignment
            .split_once('=')
            .ok_or_else(|| ParamError::MissingSeparator(assignment.to_string()))?;
        let name = name.trim();
        let def = get_param_def(name).ok_or_else(|| ParamError::UnknownParam(name.to_string()))?;
        let value: f64 = raw.trim().parse().map_err(|_| ParamError::InvalidValue {
            name: name.to_string(),
            value: raw.to_string(),
        })?;
        let stored = self.set_by_name(def.name, value)?;
        Ok((def, stored))
    }

    /// Apply a set of named values, such as the `params` map of a config file.
    ///
    /// Stops at the first unknown name.
    pub fn apply_map<'a, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        for (name, value) in entries {
            self.set_by_name(name, *value)?;
        }
        Ok(())
    }

    /// Iterate over all parameters in registration order with their values.
    pub fn iter(&self) -> impl Iterator<Item = (&'static ParamDef, ParamValue)> + '_ {
        ALL_PARAMS.iter().map(move |def| (*def, self.get_raw(def)))
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}
