// Message types exchanged between the operator, the controller and telemetry

use serde::Serialize;

use crate::config::{MAX_SPEED, SPEED_INCREMENT};

/// How an incoming command should be treated by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    /// Operator takes (back) control
    ManualControl,
    /// Hand over to obstacle avoidance
    AutoControl,
    /// Directional key press, carries speeds
    Move,
}

/// Differential drive command accumulated from operator key presses.
///
/// Both speeds stay within `[-MAX_SPEED, MAX_SPEED]` after every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriveCommand {
    left_speed: i16,
    right_speed: i16,
    mode: CommandMode,
    #[serde(skip)]
    increment: i16,
}

impl Default for DriveCommand {
    fn default() -> Self {
        Self::with_increment(SPEED_INCREMENT)
    }
}

fn clamp_speed(speed: i16) -> i16 {
    speed.clamp(-MAX_SPEED, MAX_SPEED)
}

impl DriveCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stopped, manual-control command that steps by `increment` per key press
    pub fn with_increment(increment: i16) -> Self {
        Self {
            left_speed: 0,
            right_speed: 0,
            mode: CommandMode::ManualControl,
            increment: increment.clamp(1, MAX_SPEED),
        }
    }

    /// Equalize both sides to the faster one, then speed up.
    /// A turn followed by forward drives straight instead of curving.
    pub fn increment_forward(&mut self) {
        let speed = self.left_speed.max(self.right_speed);
        let speed = clamp_speed(speed.saturating_add(self.increment));
        self.left_speed = speed;
        self.right_speed = speed;
    }

    /// Equalize both sides to the slower (more negative) one, then slow down
    pub fn increment_backward(&mut self) {
        let speed = self.left_speed.min(self.right_speed);
        let speed = clamp_speed(speed.saturating_sub(self.increment));
        self.left_speed = speed;
        self.right_speed = speed;
    }

    /// Spin in place from rest, curve left otherwise
    pub fn increment_left(&mut self) {
        self.left_speed = clamp_speed(self.left_speed.saturating_sub(self.increment));
        self.right_speed = clamp_speed(self.right_speed.saturating_add(self.increment));
    }

    /// Spin in place from rest, curve right otherwise
    pub fn increment_right(&mut self) {
        self.left_speed = clamp_speed(self.left_speed.saturating_add(self.increment));
        self.right_speed = clamp_speed(self.right_speed.saturating_sub(self.increment));
    }

    pub fn stop(&mut self) {
        self.left_speed = 0;
        self.right_speed = 0;
    }

    pub fn left_speed(&self) -> i16 {
        self.left_speed
    }

    pub fn right_speed(&self) -> i16 {
        self.right_speed
    }

    pub fn set_left_speed(&mut self, speed: i16) {
        self.left_speed = clamp_speed(speed);
    }

    pub fn set_right_speed(&mut self, speed: i16) {
        self.right_speed = clamp_speed(speed);
    }

    pub fn mode(&self) -> CommandMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CommandMode) {
        self.mode = mode;
    }
}

/// Controller state. `RemoteControlled` is the manual state, the other
/// three make up autonomous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Stopped,
    MovingForward,
    Turning,
    RemoteControlled,
}

impl VehicleState {
    pub fn is_autonomous(self) -> bool {
        self != VehicleState::RemoteControlled
    }
}

/// Snapshot of one controller step, emitted as telemetry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub time_ms: u64,
    pub state: VehicleState,
    pub raw_distance_cm: u32,
    pub distance_cm: i32,
    pub left_speed: i16,
    pub right_speed: i16,
    /// Present only on ticks where a symbol arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<DriveCommand>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_at(left: i16, right: i16) -> DriveCommand {
        let mut cmd = DriveCommand::new();
        cmd.set_left_speed(left);
        cmd.set_right_speed(right);
        cmd
    }

    #[test]
    fn test_defaults() {
        let cmd = DriveCommand::new();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (0, 0));
        assert_eq!(cmd.mode(), CommandMode::ManualControl);
    }

    #[test]
    fn test_forward_twice_clamps() {
        let mut cmd = DriveCommand::new();
        cmd.increment_forward();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (255, 255));
        cmd.increment_forward();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (255, 255));
    }

    #[test]
    fn test_forward_equalizes_to_faster_side() {
        let mut cmd = command_at(-255, 255);
        cmd.increment_forward();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (255, 255));

        let mut slow = DriveCommand::with_increment(50);
        slow.set_left_speed(100);
        slow.set_right_speed(-20);
        slow.increment_forward();
        assert_eq!((slow.left_speed(), slow.right_speed()), (150, 150));
    }

    #[test]
    fn test_backward_equalizes_to_slower_side() {
        let mut cmd = command_at(255, 0);
        cmd.increment_backward();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (-255, -255));

        let mut slow = DriveCommand::with_increment(50);
        slow.set_left_speed(100);
        slow.set_right_speed(-20);
        slow.increment_backward();
        assert_eq!((slow.left_speed(), slow.right_speed()), (-70, -70));
    }

    #[test]
    fn test_left_from_full_forward() {
        let mut cmd = command_at(255, 255);
        cmd.increment_left();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (0, 255));
    }

    #[test]
    fn test_right_from_full_forward() {
        let mut cmd = command_at(255, 255);
        cmd.increment_right();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (255, 0));
    }

    #[test]
    fn test_left_then_right_from_rest_is_identity() {
        let mut cmd = DriveCommand::new();
        cmd.increment_left();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (-255, 255));
        cmd.increment_right();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (0, 0));
    }

    #[test]
    fn test_stop() {
        let mut cmd = command_at(-255, 120);
        cmd.stop();
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (0, 0));
    }

    #[test]
    fn test_setters_clamp() {
        let cmd = command_at(1000, -1000);
        assert_eq!((cmd.left_speed(), cmd.right_speed()), (255, -255));
    }

    #[test]
    fn test_mode_is_independent_of_speeds() {
        let mut cmd = command_at(255, 255);
        cmd.set_mode(CommandMode::AutoControl);
        assert_eq!(cmd.mode(), CommandMode::AutoControl);
        assert_eq!(cmd.left_speed(), 255);
    }

    #[test]
    fn test_tick_report_json() {
        let report = TickReport {
            time_ms: 40,
            state: VehicleState::Turning,
            raw_distance_cm: 8,
            distance_cm: 9,
            left_speed: -255,
            right_speed: 255,
            command: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "turning");
        assert!(json.get("command").is_none());
    }
}
