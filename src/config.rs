// Timing, thresholds, pins and runtime configuration
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Obstacle avoidance
pub const OBSTACLE_THRESHOLD_CM: u32 = 10; // turn when the smoothed distance is at or below this
pub const MAX_TRACKED_DISTANCE_CM: u32 = OBSTACLE_THRESHOLD_CM * 60; // sensor ceiling, also "no echo"
pub const DISTANCE_WINDOW: usize = 10;
pub const DISTANCE_DEFAULT_CM: i32 = (OBSTACLE_THRESHOLD_CM * 10) as i32;

// Autonomous run length once engaged
pub const AUTO_RUN_TIME: Duration = Duration::from_secs(30);

// Random turn length, half-open [min, max)
pub const TURN_MIN_MS: u64 = 500;
pub const TURN_MAX_MS: u64 = 1000;

// Status LED blink interval
pub const BLINK_INTERVAL: Duration = Duration::from_secs(2);

// Motor output range
pub const MAX_SPEED: i16 = 255;
// Low-torque motors stall at partial duty, so one key press is a full-range step
pub const SPEED_INCREMENT: i16 = 255;

// Motor shield channels on the bridge board
pub const LEFT_MOTOR_CHANNEL: u8 = 1;
pub const RIGHT_MOTOR_CHANNEL: u8 = 4;

// Serial ports
pub const BRIDGE_PORT: &str = "/dev/ttyACM0";
pub const BRIDGE_BAUDRATE: u32 = 115_200;
pub const REMOTE_PORT: &str = "/dev/rfcomm0"; // Bluetooth SPP link to the operator
pub const REMOTE_BAUDRATE: u32 = 9_600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one run of the vehicle.
///
/// Every field falls back to the constant above when it is missing from the
/// JSON file, so an empty object `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub loop_hz: u64,
    pub obstacle_threshold_cm: u32,
    pub max_tracked_distance_cm: u32,
    pub distance_window: usize,
    pub distance_default_cm: i32,
    pub auto_run_secs: u64,
    pub turn_min_ms: u64,
    pub turn_max_ms: u64,
    pub speed_increment: i16,
    pub blink_interval_ms: u64,
    pub left_motor_channel: u8,
    pub right_motor_channel: u8,
    pub bridge_port: String,
    pub bridge_baudrate: u32,
    pub remote_port: String,
    pub remote_baudrate: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_hz: LOOP_HZ,
            obstacle_threshold_cm: OBSTACLE_THRESHOLD_CM,
            max_tracked_distance_cm: MAX_TRACKED_DISTANCE_CM,
            distance_window: DISTANCE_WINDOW,
            distance_default_cm: DISTANCE_DEFAULT_CM,
            auto_run_secs: AUTO_RUN_TIME.as_secs(),
            turn_min_ms: TURN_MIN_MS,
            turn_max_ms: TURN_MAX_MS,
            speed_increment: SPEED_INCREMENT,
            blink_interval_ms: BLINK_INTERVAL.as_millis() as u64,
            left_motor_channel: LEFT_MOTOR_CHANNEL,
            right_motor_channel: RIGHT_MOTOR_CHANNEL,
            bridge_port: BRIDGE_PORT.to_string(),
            bridge_baudrate: BRIDGE_BAUDRATE,
            remote_port: REMOTE_PORT.to_string(),
            remote_baudrate: REMOTE_BAUDRATE,
        }
    }
}

impl RuntimeConfig {
    /// Load a config from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_hz == 0 || self.loop_hz > 1000 {
            return Err(ConfigError::Invalid(format!(
                "loop_hz must be in 1..=1000, got {}",
                self.loop_hz
            )));
        }
        if self.distance_window == 0 {
            return Err(ConfigError::Invalid("distance_window must be positive".into()));
        }
        if self.turn_min_ms >= self.turn_max_ms {
            return Err(ConfigError::Invalid(format!(
                "turn window [{}, {}) is empty",
                self.turn_min_ms, self.turn_max_ms
            )));
        }
        if !(1..=MAX_SPEED).contains(&self.speed_increment) {
            return Err(ConfigError::Invalid(format!(
                "speed_increment must be in 1..={}, got {}",
                MAX_SPEED, self.speed_increment
            )));
        }
        if self.max_tracked_distance_cm <= self.obstacle_threshold_cm {
            return Err(ConfigError::Invalid(
                "max_tracked_distance_cm must exceed obstacle_threshold_cm".into(),
            ));
        }
        if self.left_motor_channel == self.right_motor_channel {
            return Err(ConfigError::Invalid(
                "left and right motors share a channel".into(),
            ));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(1000 / self.loop_hz)
    }

    pub fn auto_run_time(&self) -> Duration {
        Duration::from_secs(self.auto_run_secs)
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }
}
