//! # sitl-params
//!
//! Typed parameter store for the SITL bridge.
//!
//! Parameters are compile-time constants ([`Param<T>`]) carrying their name,
//! storage type, default and unit. A [`ParamStore`] holds the current values,
//! starting from the defaults and overridden from configuration files or
//! `NAME=VALUE` strings given on the command line.
//!
//! ## Example
//!
//! ```
//! use sitl_params::{ParamStore, SIM_WIND_SPD};
//!
//! let mut params = ParamStore::new();
//! params.apply_default("SIM_WIND_SPD=7.5").unwrap();
//! assert_eq!(params.get(&SIM_WIND_SPD), 7.5);
//! ```

mod definitions;
mod error;
mod registry;
mod types;
mod value;

pub use definitions::*;
pub use error::{ParamError, Result};
pub use registry::{get_param_def, is_known_param, ParamStore, ALL_PARAMS};
pub use types::{Param, ParamDef, ParamType};
pub use value::{FromParamValue, ParamValue, ToParamValue};
