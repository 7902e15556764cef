//! FlightGear visualization output.

use crate::error::{Result, SitlError};
use sitl_common::{SimulatedState, VehicleType, NUM_CHANNELS};
use sitl_wire::FlightGearFrame;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, info};

/// Sends `FGNetFDM` frames to a FlightGear instance acting as a viewer.
///
/// The viewer is optional; if nothing is listening the sends fail and are
/// ignored.
#[derive(Debug)]
pub struct FlightGearView {
    socket: UdpSocket,
    peer: SocketAddr,
    frames_sent: u64,
}

impl FlightGearView {
    /// Connect a UDP socket to the viewer address.
    pub fn connect(peer: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(|source| SitlError::SocketSetup {
            what: "flightgear bind",
            addr: local.to_string(),
            source,
        })?;
        socket.connect(peer).map_err(|source| SitlError::SocketSetup {
            what: "flightgear connect",
            addr: peer.to_string(),
            source,
        })?;
        info!(%peer, "flightgear view enabled");
        Ok(FlightGearView {
            socket,
            peer,
            frames_sent: 0,
        })
    }

    /// Viewer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Frames handed to the socket so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Send one frame built from the state and the raw firmware outputs.
    pub fn send(
        &mut self,
        state: &SimulatedState,
        vehicle: VehicleType,
        pwm_output: &[u16; NUM_CHANNELS],
    ) {
        let frame = FlightGearFrame::from_state(state, vehicle, pwm_output);
        match self.socket.send(&frame.encode()) {
            Ok(_) => self.frames_sent += 1,
            Err(e) => debug!(peer = %self.peer, error = %e, "flightgear send failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitl_wire::FG_NET_FDM_SIZE;
    use std::time::Duration;

    #[test]
    fn test_frame_reaches_viewer() {
        let viewer = UdpSocket::bind("127.0.0.1:0").unwrap();
        viewer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let mut view = FlightGearView::connect(viewer.local_addr().unwrap()).unwrap();
        let state = SimulatedState {
            latitude: -35.36,
            longitude: 149.16,
            altitude: 584.0,
            ..Default::default()
        };
        view.send(&state, VehicleType::Copter, &[1500; NUM_CHANNELS]);

        let mut buf = [0u8; 1024];
        let len = viewer.recv(&mut buf).unwrap();
        assert_eq!(len, FG_NET_FDM_SIZE);
        assert_eq!(&buf[..4], &[0, 0, 0, 0x18]);
        assert_eq!(view.frames_sent(), 1);
    }

    #[test]
    fn test_missing_viewer_tolerated() {
        // Reserve a port then close it so nothing is listening.
        let addr = UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let mut view = FlightGearView::connect(addr).unwrap();
        for _ in 0..3 {
            view.send(&SimulatedState::default(), VehicleType::Plane, &[1000; NUM_CHANNELS]);
        }
    }
}
