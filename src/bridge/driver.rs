// Capability adapters on top of the bridge bus
//
// Motors, sensor and LED all live on the same board and share one serial
// port through Rc<RefCell<..>>; everything runs on the control loop thread.

use std::cell::RefCell;
use std::rc::Rc;

use serialport::SerialPort;
use tracing::{info, warn};

use super::protocol::{BOARD_ID, BridgeBus, BridgeError, BusPort};
use crate::hal::{DistanceSensor, Motors, Side, StatusLed, clamp_echo};

pub type SharedBus<P = Box<dyn SerialPort>> = Rc<RefCell<BridgeBus<P>>>;

/// Open the bridge and check that it answers
pub fn connect(port: &str, baudrate: u32) -> Result<SharedBus, BridgeError> {
    info!("Opening bridge bus on {} @ {} baud", port, baudrate);
    let mut bus = BridgeBus::open_with_baudrate(port, baudrate)?;
    if !bus.ping(BOARD_ID)? {
        return Err(BridgeError::Timeout { id: BOARD_ID });
    }
    info!("Bridge board responding");
    Ok(Rc::new(RefCell::new(bus)))
}

/// Left and right drive motors on two motor shield channels
pub struct BridgeMotors<P: BusPort = Box<dyn SerialPort>> {
    bus: SharedBus<P>,
    channels: [u8; 2], // [left, right]
    speeds: [i16; 2],
}

impl<P: BusPort> BridgeMotors<P> {
    pub fn new(bus: SharedBus<P>, left_channel: u8, right_channel: u8) -> Self {
        Self {
            bus,
            channels: [left_channel, right_channel],
            speeds: [0; 2],
        }
    }

    fn index(side: Side) -> usize {
        match side {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// Last speed commanded on a side
    pub fn speed(&self, side: Side) -> i16 {
        self.speeds[Self::index(side)]
    }

    /// Release both motors immediately
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        info!("Stopping both motors");
        self.speeds = [0; 2];
        self.bus.borrow_mut().release_all(&self.channels)
    }
}

impl<P: BusPort> Motors for BridgeMotors<P> {
    fn set_speed(&mut self, side: Side, speed: i16) {
        let i = Self::index(side);
        self.speeds[i] = speed;
        if let Err(e) = self.bus.borrow_mut().set_motor_speed(self.channels[i], speed) {
            warn!("Failed to set {:?} motor speed to {}: {}", side, speed, e);
        }
    }
}

impl<P: BusPort> Drop for BridgeMotors<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

/// Ultrasonic sensor on the bridge.
///
/// No echo comes back as `ceiling`; a failed read repeats the last good reading.
pub struct BridgeDistanceSensor<P: BusPort = Box<dyn SerialPort>> {
    bus: SharedBus<P>,
    ceiling: u32,
    last: u32,
}

impl<P: BusPort> BridgeDistanceSensor<P> {
    pub fn new(bus: SharedBus<P>, ceiling: u32) -> Self {
        Self {
            bus,
            ceiling,
            last: ceiling,
        }
    }

    /// Tell the board to stop listening for echoes beyond the ceiling
    pub fn configure(&mut self) -> Result<(), BridgeError> {
        let cm = u16::try_from(self.ceiling).unwrap_or(u16::MAX);
        self.bus.borrow_mut().set_max_distance(cm)
    }
}

impl<P: BusPort> DistanceSensor for BridgeDistanceSensor<P> {
    fn read_distance(&mut self) -> u32 {
        match self.bus.borrow_mut().read_distance() {
            Ok(raw) => self.last = clamp_echo(u32::from(raw), self.ceiling),
            Err(e) => warn!("Distance read failed, reusing {} cm: {}", self.last, e),
        }
        self.last
    }
}

pub struct BridgeLed<P: BusPort = Box<dyn SerialPort>> {
    bus: SharedBus<P>,
}

impl<P: BusPort> BridgeLed<P> {
    pub fn new(bus: SharedBus<P>) -> Self {
        Self { bus }
    }
}

impl<P: BusPort> StatusLed for BridgeLed<P> {
    fn set(&mut self, on: bool) {
        if let Err(e) = self.bus.borrow_mut().set_led(on) {
            warn!("Failed to switch LED: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::SENSOR_ID;
    use crate::bridge::protocol::tests::MockPort;

    fn shared(port: MockPort) -> SharedBus<MockPort> {
        Rc::new(RefCell::new(BridgeBus::from_port(port)))
    }

    #[test]
    fn test_sensor_clamps_no_echo() {
        let mut port = MockPort::default();
        port.respond(SENSOR_ID, 0, &0u16.to_le_bytes());
        port.respond(SENSOR_ID, 0, &42u16.to_le_bytes());
        let mut sensor = BridgeDistanceSensor::new(shared(port), 600);
        assert_eq!(sensor.read_distance(), 600);
        assert_eq!(sensor.read_distance(), 42);
    }

    #[test]
    fn test_sensor_reuses_last_reading_on_failure() {
        let mut port = MockPort::default();
        port.respond(SENSOR_ID, 0, &25u16.to_le_bytes());
        let mut sensor = BridgeDistanceSensor::new(shared(port), 600);
        assert_eq!(sensor.read_distance(), 25);
        // no response queued: timeout
        assert_eq!(sensor.read_distance(), 25);
    }

    #[test]
    fn test_motor_failure_is_logged_not_fatal() {
        let bus = shared(MockPort::default());
        let mut motors = BridgeMotors::new(bus.clone(), 1, 4);
        motors.set_speed(Side::Left, -255);
        assert_eq!(motors.speed(Side::Left), -255);
        assert_eq!(motors.speed(Side::Right), 0);
    }

    #[test]
    fn test_motors_release_on_drop() {
        let bus = shared(MockPort::default());
        drop(BridgeMotors::new(bus.clone(), 1, 4));
        let port = Rc::try_unwrap(bus)
            .ok()
            .expect("motors released the bus")
            .into_inner()
            .into_inner();
        // one broadcast sync write: addr, data_length, id1, mag, run, id2, mag, run
        assert_eq!(port.written.len(), 14);
        assert_eq!(&port.written[5..13], &[0x20, 2, 1, 0, 4, 4, 0, 4]);
    }
}
