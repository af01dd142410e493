// Mode arbitration and obstacle avoidance
//
// One call to `step` is one loop tick: read the distance sensor, smooth it,
// poll the remote, then either follow the operator or run the autonomous
// policy. Nothing in a step blocks.

use tracing::{debug, info};

use crate::config::{
    AUTO_RUN_TIME, DISTANCE_DEFAULT_CM, DISTANCE_WINDOW, MAX_SPEED, OBSTACLE_THRESHOLD_CM,
    RuntimeConfig, TURN_MAX_MS, TURN_MIN_MS,
};
use crate::filter::SpeedFilter;
use crate::hal::{DistanceSensor, Motors, RandomSource, Side, TurnDirection};
use crate::messages::{CommandMode, DriveCommand, TickReport, VehicleState};
use crate::remote::{RemoteControl, SymbolSource};

/// Tunables of the autonomous policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub obstacle_threshold_cm: i32,
    pub auto_run_ms: u64,
    pub turn_min_ms: u64,
    pub turn_max_ms: u64,
    pub distance_window: usize,
    pub distance_default_cm: i32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: OBSTACLE_THRESHOLD_CM as i32,
            auto_run_ms: AUTO_RUN_TIME.as_millis() as u64,
            turn_min_ms: TURN_MIN_MS,
            turn_max_ms: TURN_MAX_MS,
            distance_window: DISTANCE_WINDOW,
            distance_default_cm: DISTANCE_DEFAULT_CM,
        }
    }
}

impl From<&RuntimeConfig> for ControllerSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            obstacle_threshold_cm: i32::try_from(config.obstacle_threshold_cm).unwrap_or(i32::MAX),
            auto_run_ms: config.auto_run_time().as_millis() as u64,
            turn_min_ms: config.turn_min_ms,
            turn_max_ms: config.turn_max_ms,
            distance_window: config.distance_window,
            distance_default_cm: config.distance_default_cm,
        }
    }
}

/// The vehicle's control core. Owns both motors, the distance filter and
/// the remote; the run loop owns the controller.
pub struct VehicleController<D, M, S, R> {
    sensor: D,
    motors: M,
    remote: RemoteControl<S>,
    random: R,
    settings: ControllerSettings,
    filter: SpeedFilter,
    state: VehicleState,
    left_speed: i16,
    right_speed: i16,
    smoothed_distance: i32,
    turn_end_ms: u64,
    auto_run_end_ms: u64,
}

impl<D, M, S, R> VehicleController<D, M, S, R>
where
    D: DistanceSensor,
    M: Motors,
    S: SymbolSource,
    R: RandomSource,
{
    /// Stops both motors and starts under remote control
    pub fn new(
        sensor: D,
        motors: M,
        remote: RemoteControl<S>,
        random: R,
        settings: ControllerSettings,
    ) -> Self {
        let filter = SpeedFilter::new(settings.distance_default_cm, settings.distance_window);
        let mut controller = Self {
            sensor,
            motors,
            remote,
            random,
            settings,
            smoothed_distance: filter.average(),
            filter,
            state: VehicleState::RemoteControlled,
            left_speed: 0,
            right_speed: 0,
            turn_end_ms: 0,
            auto_run_end_ms: 0,
        };
        controller.drive(0, 0);
        controller
    }

    /// Run one tick. `now_ms` is sampled once by the caller and must not
    /// go backwards between calls.
    pub fn step(&mut self, now_ms: u64) -> TickReport {
        let raw_distance = self.sensor.read_distance();
        self.smoothed_distance = self
            .filter
            .add(i32::try_from(raw_distance).unwrap_or(i32::MAX));

        let mut command = self.remote.try_receive();
        if let Some(cmd) = command.as_mut() {
            self.process_command(cmd, now_ms);
            info!(
                state = ?self.state,
                time_ms = now_ms,
                raw_distance_cm = raw_distance,
                distance_cm = self.smoothed_distance,
                mode = ?cmd.mode(),
                "Command received"
            );
        }

        if self.state.is_autonomous() {
            self.run_autonomous(now_ms);
        } else if let Some(cmd) = command.as_ref() {
            info!(
                mode = ?cmd.mode(),
                left = cmd.left_speed(),
                right = cmd.right_speed(),
                "Motor command"
            );
            self.drive(cmd.left_speed(), cmd.right_speed());
        }

        TickReport {
            time_ms: now_ms,
            state: self.state,
            raw_distance_cm: raw_distance,
            distance_cm: self.smoothed_distance,
            left_speed: self.left_speed,
            right_speed: self.right_speed,
            command,
        }
    }

    fn process_command(&mut self, command: &mut DriveCommand, now_ms: u64) {
        match command.mode() {
            CommandMode::ManualControl => {
                self.control_by_remote();
                // Resume from the current speeds so taking over is seamless
                command.set_left_speed(self.left_speed);
                command.set_right_speed(self.right_speed);
                self.remote.sync_speeds(self.left_speed, self.right_speed);
            }
            CommandMode::AutoControl => self.switch_to_auto(now_ms),
            CommandMode::Move => {}
        }
    }

    fn run_autonomous(&mut self, now_ms: u64) {
        match self.state {
            VehicleState::Stopped | VehicleState::RemoteControlled => {}
            _ if self.done_running(now_ms) => self.stop(),
            VehicleState::MovingForward => {
                if self.obstacle_ahead() {
                    self.turn(now_ms);
                }
            }
            VehicleState::Turning => {
                if self.done_turning(now_ms) {
                    self.move_forward();
                }
            }
        }
    }

    fn control_by_remote(&mut self) {
        if self.state != VehicleState::RemoteControlled {
            info!(from = ?self.state, "Operator took control");
        }
        self.state = VehicleState::RemoteControlled;
    }

    fn switch_to_auto(&mut self, now_ms: u64) {
        self.auto_run_end_ms = now_ms.saturating_add(self.settings.auto_run_ms);
        info!(until_ms = self.auto_run_end_ms, "Autonomous run engaged");
        self.move_forward();
    }

    fn move_forward(&mut self) {
        debug!("Moving forward");
        self.drive(MAX_SPEED, MAX_SPEED);
        self.state = VehicleState::MovingForward;
    }

    fn stop(&mut self) {
        info!("Autonomous run finished, stopping");
        self.drive(0, 0);
        self.state = VehicleState::Stopped;
    }

    /// Spin in place in a random direction for a random time
    fn turn(&mut self, now_ms: u64) {
        let direction = self.random.turn_direction();
        match direction {
            TurnDirection::Left => self.drive(-MAX_SPEED, MAX_SPEED),
            TurnDirection::Right => self.drive(MAX_SPEED, -MAX_SPEED),
        }
        let duration = self
            .random
            .turn_duration_ms(self.settings.turn_min_ms, self.settings.turn_max_ms);
        self.turn_end_ms = now_ms.saturating_add(duration);
        self.state = VehicleState::Turning;
        info!(
            ?direction,
            duration_ms = duration,
            distance_cm = self.smoothed_distance,
            "Obstacle ahead, turning"
        );
    }

    fn obstacle_ahead(&self) -> bool {
        self.smoothed_distance <= self.settings.obstacle_threshold_cm
    }

    // Keeps turning the same way past the deadline until the path is clear
    fn done_turning(&self, now_ms: u64) -> bool {
        now_ms >= self.turn_end_ms && !self.obstacle_ahead()
    }

    fn done_running(&self, now_ms: u64) -> bool {
        now_ms >= self.auto_run_end_ms
    }

    fn drive(&mut self, left: i16, right: i16) {
        self.left_speed = left;
        self.right_speed = right;
        self.motors.set_speed(Side::Left, left);
        self.motors.set_speed(Side::Right, right);
    }

    /// Stop the motors and leave autonomous mode for good, used on shutdown
    pub fn halt(&mut self) {
        self.drive(0, 0);
        self.state = VehicleState::Stopped;
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    /// Current (left, right) motor speeds
    pub fn motor_speeds(&self) -> (i16, i16) {
        (self.left_speed, self.right_speed)
    }

    pub fn smoothed_distance(&self) -> i32 {
        self.smoothed_distance
    }

    pub fn turn_end_ms(&self) -> u64 {
        self.turn_end_ms
    }

    pub fn auto_run_end_ms(&self) -> u64 {
        self.auto_run_end_ms
    }

    pub fn sensor_mut(&mut self) -> &mut D {
        &mut self.sensor
    }

    pub fn motors(&self) -> &M {
        &self.motors
    }

    pub fn remote(&self) -> &RemoteControl<S> {
        &self.remote
    }
}
