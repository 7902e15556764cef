//! Multicast state publication and servo override collection.
//!
//! Each simulator instance publishes its full state to a shared multicast
//! group and listens on a per-instance UDP port for servo override packets
//! from peer nodes. Delivery is best-effort: lost, duplicated or reordered
//! packets are tolerated, and a failed send is logged and forgotten.

use crate::error::{Result, SitlError};
use serde::{Deserialize, Serialize};
use sitl_common::{ChannelMask, SimulatedState, NUM_CHANNELS};
use sitl_metrics::{metric_defs, InstanceLabels};
use sitl_wire::{decode_overrides, encode_state, OVERRIDE_PACKET_SIZE};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use tracing::{debug, info, warn};

/// Default multicast group for state publication.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 145, 50);

/// Default state publication port.
pub const DEFAULT_STATE_PORT: u16 = 20721;

/// Default base port for servo overrides. Instance `n` listens on base + n.
pub const DEFAULT_SERVO_PORT_BASE: u16 = 20722;

// ============================================================================
// Configuration
// ============================================================================

/// Multicast addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    /// Publish state and accept overrides.
    pub enabled: bool,
    /// Group address state is published to.
    pub group: Ipv4Addr,
    /// Port state is published to.
    pub state_port: u16,
    /// Base port for override reception.
    pub servo_port_base: u16,
    /// Local address the override socket binds to.
    pub bind_address: Ipv4Addr,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        MulticastConfig {
            enabled: false,
            group: DEFAULT_GROUP,
            state_port: DEFAULT_STATE_PORT,
            servo_port_base: DEFAULT_SERVO_PORT_BASE,
            bind_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl MulticastConfig {
    /// Address the state is sent to.
    pub fn state_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.state_port)
    }

    /// Address the override socket binds to for an instance.
    pub fn servo_addr(&self, instance: u16) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind_address, self.servo_port_base.wrapping_add(instance))
    }
}

// ============================================================================
// Override Table
// ============================================================================

/// Last received override value for each channel.
///
/// Entries are never cleared. A channel keeps its value until a newer packet
/// supplies a different one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideTable([u16; NUM_CHANNELS]);

impl OverrideTable {
    /// A table with every channel at zero.
    pub fn new() -> Self {
        OverrideTable([0; NUM_CHANNELS])
    }

    /// Stored override for a channel. Out-of-range channels read as zero.
    pub fn get(&self, channel: usize) -> u16 {
        self.0.get(channel).copied().unwrap_or(0)
    }

    /// Merge one override packet. NaN leaves a channel untouched.
    ///
    /// Returns the channels that were written.
    pub fn apply(&mut self, values: &[f32; NUM_CHANNELS]) -> ChannelMask {
        let mut updated = ChannelMask::EMPTY;
        for (channel, &value) in values.iter().enumerate() {
            if !value.is_nan() {
                self.0[channel] = value as u16;
                updated.insert(channel);
            }
        }
        updated
    }

    /// All stored values.
    pub fn values(&self) -> &[u16; NUM_CHANNELS] {
        &self.0
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Channel
// ============================================================================

struct Sockets {
    state_out: UdpSocket,
    servo_in: UdpSocket,
}

/// The pair of sockets used to exchange state and overrides with peers.
///
/// Sockets are opened on first use and never block. Failing to open or
/// bind them is fatal.
pub struct MulticastChannel {
    config: MulticastConfig,
    instance: u16,
    sockets: Option<Sockets>,
    overrides: OverrideTable,
    labels: InstanceLabels,
    states_sent: u64,
    override_packets: u64,
}

impl MulticastChannel {
    /// Create a channel for a simulator instance. No sockets are opened yet.
    pub fn new(config: MulticastConfig, instance: u16, labels: InstanceLabels) -> Self {
        MulticastChannel {
            config,
            instance,
            sockets: None,
            overrides: OverrideTable::new(),
            labels,
            states_sent: 0,
            override_packets: 0,
        }
    }

    /// Current override table.
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Whether the sockets have been opened.
    pub fn is_open(&self) -> bool {
        self.sockets.is_some()
    }

    /// Local address of the override socket, once open.
    pub fn servo_local_addr(&self) -> Option<std::net::SocketAddr> {
        self.sockets.as_ref().and_then(|s| s.servo_in.local_addr().ok())
    }

    /// Number of state datagrams handed to the socket.
    pub fn states_sent(&self) -> u64 {
        self.states_sent
    }

    /// Number of override datagrams accepted.
    pub fn override_packets(&self) -> u64 {
        self.override_packets
    }

    /// Open both sockets if they are not open yet.
    pub fn open(&mut self) -> Result<()> {
        if self.sockets.is_some() {
            return Ok(());
        }

        let state_addr = self.config.state_addr();
        let state_out = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|source| {
            SitlError::SocketSetup {
                what: "state socket bind",
                addr: "0.0.0.0:0".to_string(),
                source,
            }
        })?;
        state_out
            .set_nonblocking(true)
            .map_err(|source| SitlError::SocketSetup {
                what: "state socket nonblocking",
                addr: state_addr.to_string(),
                source,
            })?;
        if let Err(e) = state_out.set_broadcast(true) {
            warn!(error = %e, "could not enable broadcast on state socket");
        }
        state_out
            .connect(state_addr)
            .map_err(|source| SitlError::SocketSetup {
                what: "state socket connect",
                addr: state_addr.to_string(),
                source,
            })?;

        let servo_addr = self.config.servo_addr(self.instance);
        let servo_in = UdpSocket::bind(servo_addr).map_err(|source| SitlError::SocketSetup {
            what: "servo socket bind",
            addr: servo_addr.to_string(),
            source,
        })?;
        servo_in
            .set_nonblocking(true)
            .map_err(|source| SitlError::SocketSetup {
                what: "servo socket nonblocking",
                addr: servo_addr.to_string(),
                source,
            })?;

        info!(
            instance = self.instance,
            state = %state_addr,
            servo = %servo_addr,
            "multicast initialised"
        );
        self.sockets = Some(Sockets { state_out, servo_in });
        Ok(())
    }

    /// Send the state to the group. A datagram the socket cannot take
    /// immediately is dropped.
    pub fn publish(&mut self, state: &SimulatedState) -> Result<()> {
        self.open()?;
        let Some(sockets) = self.sockets.as_ref() else {
            return Ok(());
        };
        match sockets.state_out.send(&encode_state(state)) {
            Ok(_) => {
                self.states_sent += 1;
                metrics::counter!(metric_defs::MULTICAST_STATE_SENT.name, &self.labels.to_labels())
                    .increment(1);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                debug!("state socket busy, datagram dropped")
            }
            Err(e) => debug!(error = %e, "state send failed"),
        }
        Ok(())
    }

    /// Consume every queued override packet without blocking.
    ///
    /// Returns the channels written by at least one packet.
    pub fn drain_overrides(&mut self) -> Result<ChannelMask> {
        self.open()?;
        let Some(sockets) = self.sockets.as_ref() else {
            return Ok(ChannelMask::EMPTY);
        };

        let mut updated = ChannelMask::EMPTY;
        let mut buf = [0u8; OVERRIDE_PACKET_SIZE + 1];
        loop {
            match sockets.servo_in.recv(&mut buf) {
                Ok(len) => match decode_overrides(&buf[..len]) {
                    Ok(values) => {
                        updated |= self.overrides.apply(&values);
                        self.override_packets += 1;
                        metrics::counter!(
                            metric_defs::MULTICAST_OVERRIDE_PACKETS.name,
                            &self.labels.to_labels()
                        )
                        .increment(1);
                    }
                    Err(e) => debug!(error = %e, "ignoring override packet"),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // ICMP errors from a previous send surface here on some platforms.
                    debug!(error = %e, "override receive failed");
                    break;
                }
            }
        }
        Ok(updated)
    }
}

impl std::fmt::Debug for MulticastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulticastChannel")
            .field("config", &self.config)
            .field("instance", &self.instance)
            .field("open", &self.is_open())
            .finish()
    }
}
