//! Parameter definitions and metadata.
//!
//! This module provides:
//! - [`ParamType`] - The storage type of a parameter
//! - [`ParamDef`] - Parameter metadata for runtime lookup
//! - [`Param<T>`] - Type-safe parameter definition with compile-time type info

use super::value::ParamValue;
use std::marker::PhantomData;

// ============================================================================
// Param Storage Type
// ============================================================================

/// The storage type of a parameter.
///
/// Values written to integer parameters are truncated towards zero and
/// saturated to the type's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 32-bit float.
    Float,
}

impl ParamType {
    /// Convert a float into a value of this storage type.
    pub fn coerce(&self, value: f64) -> ParamValue {
        match self {
            ParamType::Int8 => ParamValue::Integer(value as i8 as i64),
            ParamType::Int16 => ParamValue::Integer(value as i16 as i64),
            ParamType::Int32 => ParamValue::Integer(value as i32 as i64),
            ParamType::Float => ParamValue::Float(value as f32 as f64),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::Int8 => write!(f, "int8"),
            ParamType::Int16 => write!(f, "int16"),
            ParamType::Int32 => write!(f, "int32"),
            ParamType::Float => write!(f, "float"),
        }
    }
}

// ============================================================================
// Param Definition (Runtime Metadata)
// ============================================================================

/// Parameter metadata without type information.
///
/// Used as the storage key in [`ParamStore`](crate::ParamStore) and by the
/// registry for lookup by name.
#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    /// Parameter name (e.g., "SIM_WIND_SPD").
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Storage type.
    pub param_type: ParamType,
    /// Default value.
    pub default: f64,
    /// Optional unit string (e.g., "m/s", "deg").
    pub unit: Option<&'static str>,
}

impl PartialEq for ParamDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ParamDef {}

impl std::hash::Hash for ParamDef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl ParamDef {
    /// Get the default value coerced to the storage type.
    pub fn default_value(&self) -> ParamValue {
        self.param_type.coerce(self.default)
    }
}

// ============================================================================
// Type-Safe Param Definition
// ============================================================================

/// A type-safe parameter definition.
///
/// ```
/// use sitl_params::{ParamStore, SIM_WIND_TC};
///
/// let params = ParamStore::new();
/// let tc: f32 = params.get(&SIM_WIND_TC);
/// assert_eq!(tc, 5.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Param<T> {
    pub(crate) def: ParamDef,
    _value_type: PhantomData<T>,
}

impl<T> Param<T> {
    /// Create a new parameter definition.
    pub const fn new(
        name: &'static str,
        description: &'static str,
        param_type: ParamType,
        default: f64,
    ) -> Self {
        Self {
            def: ParamDef {
                name,
                description,
                param_type,
                default,
                unit: None,
            },
            _value_type: PhantomData,
        }
    }

    /// Set the unit for this parameter (const-compatible).
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.def.unit = Some(unit);
        self
    }

    /// Get the parameter name.
    pub const fn name(&self) -> &'static str {
        self.def.name
    }

    /// Get the internal parameter definition.
    pub const fn def(&self) -> &ParamDef {
        &self.def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_truncates_and_saturates() {
        assert_eq!(ParamType::Int8.coerce(3.7), ParamValue::Integer(3));
        assert_eq!(ParamType::Int8.coerce(1000.0), ParamValue::Integer(127));
        assert_eq!(ParamType::Int16.coerce(-2.5), ParamValue::Integer(-2));
        assert_eq!(ParamType::Float.coerce(0.5), ParamValue::Float(0.5));
    }
}
