//! Integration tests for state publication and servo overrides.
//!
//! The channel is pointed at loopback so no multicast routing is needed:
//! the "group" is a plain unicast listener owned by the test, and the
//! override socket binds an ephemeral port.

use parking_lot::Mutex;
use serial_test::serial;
use sitl_common::{ActuatorInput, ChannelMask, SimulatedState, VehicleType, NUM_CHANNELS};
use sitl_metrics::InstanceLabels;
use sitl_params::{ParamStore, SIM_CAN_SRV_MSK};
use sitl_runner::{FlightModel, MulticastChannel, MulticastConfig, Scheduler, ServoOutputs, StepDriver};
use sitl_wire::{decode_state, encode_overrides, STATE_PACKET_SIZE};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

fn labels() -> InstanceLabels {
    InstanceLabels::new(0, "copter")
}

/// A listener standing in for the group, and a channel publishing to it.
fn loopback_channel() -> (UdpSocket, MulticastChannel) {
    let listener = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let config = MulticastConfig {
        enabled: true,
        group: Ipv4Addr::LOCALHOST,
        state_port: listener.local_addr().unwrap().port(),
        servo_port_base: 0,
        bind_address: Ipv4Addr::LOCALHOST,
    };
    (listener, MulticastChannel::new(config, 0, labels()))
}

fn send_overrides(to: SocketAddr, values: &[f32; NUM_CHANNELS]) {
    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    sender.send_to(&encode_overrides(values), to).unwrap();
}

/// Poll until at least one override packet has been consumed.
fn drain_until_received(channel: &mut MulticastChannel) -> ChannelMask {
    let mut mask = ChannelMask::EMPTY;
    for _ in 0..200 {
        mask |= channel.drain_overrides().unwrap();
        if channel.override_packets() > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    mask
}

#[test]
#[serial]
fn test_state_published_to_group() {
    let (listener, mut channel) = loopback_channel();
    let state = SimulatedState {
        timestamp_us: 123_456,
        latitude: -35.36,
        longitude: 149.16,
        altitude: 584.5,
        yaw_deg: 90.0,
        ..Default::default()
    };

    channel.publish(&state).unwrap();
    assert!(channel.is_open());
    assert_eq!(channel.states_sent(), 1);

    let mut buf = [0u8; 256];
    let len = listener.recv(&mut buf).unwrap();
    assert_eq!(len, STATE_PACKET_SIZE);
    let decoded = decode_state(&buf[..len]).unwrap();
    assert_eq!(decoded.timestamp_us, 123_456);
    assert_eq!(decoded.altitude, 584.5);
}

#[test]
#[serial]
fn test_overrides_merge_and_skip_bad_packets() {
    let (_listener, mut channel) = loopback_channel();
    channel.open().unwrap();
    let servo_addr = channel.servo_local_addr().unwrap();

    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    sender.send_to(&[0u8; 10], servo_addr).unwrap();

    let mut first = [f32::NAN; NUM_CHANNELS];
    first[0] = 1234.0;
    send_overrides(servo_addr, &first);

    let mut mask = drain_until_received(&mut channel);

    let mut second = [f32::NAN; NUM_CHANNELS];
    second[1] = 1600.0;
    send_overrides(servo_addr, &second);
    for _ in 0..200 {
        mask |= channel.drain_overrides().unwrap();
        if channel.override_packets() >= 2 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(channel.override_packets(), 2);
    assert_eq!(mask.bits(), 0b11);
    assert_eq!(channel.overrides().get(0), 1234);
    assert_eq!(channel.overrides().get(1), 1600);
    assert_eq!(channel.overrides().get(2), 0);
}

#[test]
#[serial]
fn test_no_packets_is_not_an_error() {
    let (_listener, mut channel) = loopback_channel();
    assert_eq!(channel.drain_overrides().unwrap(), ChannelMask::EMPTY);
    assert_eq!(channel.override_packets(), 0);
}

/// Model that records every input it receives.
struct Recorder {
    time_us: u64,
    inputs: Arc<Mutex<Vec<ActuatorInput>>>,
}

impl FlightModel for Recorder {
    fn update(&mut self, input: &ActuatorInput) -> SimulatedState {
        self.inputs.lock().push(*input);
        self.time_us += 2500;
        SimulatedState {
            timestamp_us: self.time_us,
            altitude: 50.0,
            ..Default::default()
        }
    }

    fn speedup(&self) -> f64 {
        1.0
    }
}

#[test]
#[serial]
fn test_override_reaches_model_on_masked_channel() {
    let (_listener, channel) = loopback_channel();
    let inputs = Arc::new(Mutex::new(Vec::new()));
    let model = Recorder {
        time_us: 0,
        inputs: Arc::clone(&inputs),
    };
    let mut driver =
        StepDriver::new(VehicleType::Copter, Box::new(model), labels()).with_multicast(channel);

    let scheduler = Scheduler::new();
    let outputs = ServoOutputs::new();
    let mut params = ParamStore::new();
    params.set(&SIM_CAN_SRV_MSK, 0b0001);

    // first step opens the sockets
    driver.step(&scheduler, &outputs, &params).unwrap();
    let servo_addr = driver.multicast().and_then(|m| m.servo_local_addr()).unwrap();

    let mut values = [f32::NAN; NUM_CHANNELS];
    values[0] = 1750.0;
    values[3] = 1800.0;
    send_overrides(servo_addr, &values);

    // packets are drained after the model update, so they apply one step later
    for _ in 0..200 {
        driver.step(&scheduler, &outputs, &params).unwrap();
        if driver.multicast().is_some_and(|m| m.override_packets() > 0) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    driver.step(&scheduler, &outputs, &params).unwrap();

    let inputs = inputs.lock();
    // a masked channel reads the table even before any packet arrives
    assert_eq!(inputs[0].servos[0], 0);
    let last = inputs.last().unwrap();
    assert_eq!(last.servos[0], 1750);
    // unmasked channels keep the firmware value
    assert_eq!(last.servos[3], 1000);
}

/// Model that climbs one meter per tick from a home of 100 m.
struct Climber {
    ticks: u64,
}

impl FlightModel for Climber {
    fn update(&mut self, _input: &ActuatorInput) -> SimulatedState {
        self.ticks += 1;
        SimulatedState {
            timestamp_us: self.ticks * 2500,
            altitude: 100.0 + self.ticks as f64,
            ..Default::default()
        }
    }

    fn speedup(&self) -> f64 {
        1.0
    }
}

#[test]
#[serial]
fn test_published_state_carries_height() {
    let (listener, channel) = loopback_channel();
    let mut driver = StepDriver::new(VehicleType::Copter, Box::new(Climber { ticks: 0 }), labels())
        .with_multicast(channel);
    let scheduler = Scheduler::new();
    let outputs = ServoOutputs::new();
    let params = ParamStore::new();

    let mut published = Vec::new();
    let mut buf = [0u8; 256];
    for _ in 0..4 {
        driver.step(&scheduler, &outputs, &params).unwrap();
        let len = listener.recv(&mut buf).unwrap();
        published.push(decode_state(&buf[..len]).unwrap().height_agl);
    }

    // home latches at 101 m; each datagram carries the previous tick's height
    assert_eq!(published, vec![0.0, 0.0, 1.0, 2.0]);
    assert_eq!(driver.state().height_agl, 3.0);
}

#[test]
#[serial]
fn test_publish_to_stalled_group_never_blocks() {
    // the listener is never read, so its receive buffer fills up
    let (_listener, mut channel) = loopback_channel();
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let state = SimulatedState::default();
        for _ in 0..20_000 {
            channel.publish(&state).unwrap();
        }
        let _ = done_tx.send(channel.states_sent());
    });

    let sent = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("publish blocked");
    assert!(sent > 0);
}
