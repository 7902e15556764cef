//! # sitl-wire
//!
//! Datagram codecs used by the SITL bridge.
//!
//! - [`state`] - Vehicle state published to the multicast group
//! - [`servo`] - Actuator override packets received from peers
//! - [`fgfdm`] - FlightGear `FGNetFDM` visualization packets
//!
//! All codecs are fixed-size. Decoders reject datagrams of the wrong length
//! rather than guessing at partial content.

pub mod fgfdm;
pub mod servo;
pub mod state;

mod error;

pub use error::{Result, WireError};
pub use fgfdm::{FlightGearFrame, FG_NET_FDM_SIZE, FG_NET_FDM_VERSION};
pub use servo::{decode_overrides, encode_overrides, OVERRIDE_PACKET_SIZE};
pub use state::{decode_state, encode_state, STATE_MAGIC, STATE_PACKET_SIZE};
