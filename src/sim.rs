// Simulated hardware for running the controller without the bridge board
//
// A crude single-beam world: driving forward closes in on whatever is ahead,
// spinning in place eventually faces a new direction with a new distance.

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;
use rand::rngs::ThreadRng;
use tracing::{debug, trace};

use crate::config::MAX_SPEED;
use crate::hal::{DistanceSensor, Motors, Side, StatusLed, clamp_echo};

// Distance covered per tick at full forward speed
const CM_PER_TICK_AT_FULL_SPEED: f32 = 1.5;
// Rotation per tick when spinning at full speed
const DEGREES_PER_TICK_AT_FULL_SPIN: f32 = 9.0;
// A new obstacle distance is rolled every time the heading crosses this many degrees
const SECTOR_DEGREES: f32 = 45.0;
const SENSOR_NOISE_CM: f32 = 2.0;
// Closest obstacle a new sector can put in front of the robot
const NEAREST_SECTOR_CM: f32 = 5.0;

struct World {
    left_speed: i16,
    right_speed: i16,
    distance_cm: f32,
    heading_deg: f32,
    ceiling_cm: u32,
    rng: ThreadRng,
}

impl World {
    fn advance(&mut self) {
        let max = f32::from(MAX_SPEED);
        let forward = (f32::from(self.left_speed) + f32::from(self.right_speed)) / (2.0 * max);
        let spin = (f32::from(self.left_speed) - f32::from(self.right_speed)) / (2.0 * max);

        self.distance_cm = (self.distance_cm - forward * CM_PER_TICK_AT_FULL_SPEED).max(0.0);

        let sector_before = (self.heading_deg / SECTOR_DEGREES).floor();
        self.heading_deg = (self.heading_deg + spin * DEGREES_PER_TICK_AT_FULL_SPIN).rem_euclid(360.0);
        if (self.heading_deg / SECTOR_DEGREES).floor() != sector_before {
            let ceiling = self.ceiling_cm as f32;
            self.distance_cm = self.rng.random_range(NEAREST_SECTOR_CM.min(ceiling)..=ceiling);
            debug!(
                heading_deg = self.heading_deg,
                distance_cm = self.distance_cm,
                "Simulated robot faces a new sector"
            );
        }
    }
}

/// Shared handle to one simulated world; hand out motors and sensor from it
#[derive(Clone)]
pub struct Simulation {
    world: Rc<RefCell<World>>,
}

impl Simulation {
    pub fn new(initial_distance_cm: f32, ceiling_cm: u32) -> Self {
        Self {
            world: Rc::new(RefCell::new(World {
                left_speed: 0,
                right_speed: 0,
                distance_cm: initial_distance_cm,
                heading_deg: 0.0,
                ceiling_cm,
                rng: rand::rng(),
            })),
        }
    }

    pub fn motors(&self) -> SimulatedMotors {
        SimulatedMotors {
            world: self.world.clone(),
        }
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor {
            world: self.world.clone(),
        }
    }

    pub fn distance_cm(&self) -> f32 {
        self.world.borrow().distance_cm
    }
}

pub struct SimulatedMotors {
    world: Rc<RefCell<World>>,
}

impl Motors for SimulatedMotors {
    fn set_speed(&mut self, side: Side, speed: i16) {
        trace!(?side, speed, "Simulated motor");
        let mut world = self.world.borrow_mut();
        match side {
            Side::Left => world.left_speed = speed,
            Side::Right => world.right_speed = speed,
        }
    }
}

/// Moves the world forward by one tick per reading
pub struct SimulatedSensor {
    world: Rc<RefCell<World>>,
}

impl DistanceSensor for SimulatedSensor {
    fn read_distance(&mut self) -> u32 {
        let mut world = self.world.borrow_mut();
        world.advance();
        let noise = world.rng.random_range(-SENSOR_NOISE_CM..=SENSOR_NOISE_CM);
        let reading = (world.distance_cm + noise).max(0.0).round() as u32;
        // a reading that rounds to zero looks like no echo, as on the real sensor
        clamp_echo(reading, world.ceiling_cm)
    }
}

#[derive(Debug, Default)]
pub struct SimulatedLed {
    on: bool,
}

impl SimulatedLed {
    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl StatusLed for SimulatedLed {
    fn set(&mut self, on: bool) {
        debug!(on, "Status LED");
        self.on = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_closes_distance() {
        let sim = Simulation::new(100.0, 600);
        let mut motors = sim.motors();
        let mut sensor = sim.sensor();
        motors.set_speed(Side::Left, 255);
        motors.set_speed(Side::Right, 255);
        for _ in 0..10 {
            sensor.read_distance();
        }
        assert!((sim.distance_cm() - 85.0).abs() < 1e-3);
    }

    #[test]
    fn test_stationary_readings_stay_near_truth() {
        let sim = Simulation::new(50.0, 600);
        let mut sensor = sim.sensor();
        for _ in 0..50 {
            let reading = sensor.read_distance();
            assert!((48..=52).contains(&reading), "reading {}", reading);
        }
    }

    #[test]
    fn test_spinning_changes_sector() {
        let sim = Simulation::new(3.0, 600);
        let mut motors = sim.motors();
        let mut sensor = sim.sensor();
        motors.set_speed(Side::Left, 255);
        motors.set_speed(Side::Right, -255);
        // 45 degrees at 9 degrees per tick
        for _ in 0..5 {
            sensor.read_distance();
        }
        assert!(sim.distance_cm() >= 5.0);
    }

    #[test]
    fn test_new_sector_with_ceiling_below_nearest_obstacle() {
        let config = crate::config::RuntimeConfig {
            obstacle_threshold_cm: 1,
            max_tracked_distance_cm: 4,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let sim = Simulation::new(3.0, config.max_tracked_distance_cm);
        let mut motors = sim.motors();
        let mut sensor = sim.sensor();
        motors.set_speed(Side::Left, 255);
        motors.set_speed(Side::Right, -255);
        for _ in 0..5 {
            assert!(sensor.read_distance() <= 4);
        }
        assert!(sim.distance_cm() <= 4.0);
    }

    #[test]
    fn test_led() {
        let mut led = SimulatedLed::default();
        led.set(true);
        assert!(led.is_on());
    }
}
