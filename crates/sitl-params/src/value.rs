//! Parameter value types and conversion traits.
//!
//! This module provides:
//! - [`ParamValue`] - The dynamic value stored for each parameter
//! - [`FromParamValue`] - Trait for extracting typed values from a ParamValue
//! - [`ToParamValue`] - Trait for converting typed values to a ParamValue

use serde::{Deserialize, Serialize};

// ============================================================================
// Param Value Enum
// ============================================================================

/// The value held by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
}

impl ParamValue {
    /// Convert to i64, truncating floats.
    pub fn as_i64(&self) -> i64 {
        match self {
            ParamValue::Integer(v) => *v,
            ParamValue::Float(v) => *v as i64,
        }
    }

    /// Convert to f64.
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Integer(v) => *v as f64,
            ParamValue::Float(v) => *v,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

// ============================================================================
// Type-Safe Extraction
// ============================================================================

/// Trait for types that can be extracted from a ParamValue.
pub trait FromParamValue: Sized {
    /// Extract a typed value.
    fn from_param_value(value: &ParamValue) -> Self;
}

impl FromParamValue for f32 {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_f64() as f32
    }
}

impl FromParamValue for f64 {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_f64()
    }
}

impl FromParamValue for i8 {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_i64() as i8
    }
}

impl FromParamValue for i16 {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_i64() as i16
    }
}

impl FromParamValue for i32 {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_i64() as i32
    }
}

/// Bitmask parameters are stored as 32-bit signed integers and read back
/// with their bit pattern intact.
impl FromParamValue for u32 {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_i64() as i32 as u32
    }
}

impl FromParamValue for bool {
    fn from_param_value(value: &ParamValue) -> Self {
        value.as_i64() != 0
    }
}

// ============================================================================
// Type-Safe Conversion
// ============================================================================

/// Trait for types that can be stored as a ParamValue.
pub trait ToParamValue {
    /// Convert to a ParamValue.
    fn to_param_value(&self) -> ParamValue;
}

impl ToParamValue for f32 {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Float(*self as f64)
    }
}

impl ToParamValue for f64 {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Float(*self)
    }
}

impl ToParamValue for i8 {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Integer(*self as i64)
    }
}

impl ToParamValue for i16 {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Integer(*self as i64)
    }
}

impl ToParamValue for i32 {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Integer(*self as i64)
    }
}

impl ToParamValue for u32 {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Integer(*self as i32 as i64)
    }
}

impl ToParamValue for bool {
    fn to_param_value(&self) -> ParamValue {
        ParamValue::Integer(*self as i64)
    }
}
