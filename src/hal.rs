// Hardware capabilities consumed by the controller
//
// The controller never touches a port or a pin. It only calls these traits,
// which are implemented by the bridge board adapters, the simulator and tests.

use std::collections::VecDeque;

use rand::Rng;
use rand::rngs::ThreadRng;

/// Source of raw forward distance readings in centimeters.
///
/// Implementations report "no echo" as the tracked ceiling, never as zero,
/// so an empty room reads as a very large safe distance rather than a
/// collision. See [`clamp_echo`].
pub trait DistanceSensor {
    fn read_distance(&mut self) -> u32;
}

/// Map a raw echo reading onto the tracked range.
/// Zero means the ping timed out and is reported as `ceiling`.
pub fn clamp_echo(raw: u32, ceiling: u32) -> u32 {
    if raw == 0 { ceiling } else { raw.min(ceiling) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Two independently driven wheels
pub trait Motors {
    /// Set a signed speed in `[-255, 255]`; positive drives forward
    fn set_speed(&mut self, side: Side, speed: i16);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

/// Randomness used when picking an escape turn
pub trait RandomSource {
    /// Uniform choice between left and right
    fn turn_direction(&mut self) -> TurnDirection;

    /// Uniform duration in `[min_ms, max_ms)`
    fn turn_duration_ms(&mut self, min_ms: u64, max_ms: u64) -> u64;
}

pub trait StatusLed {
    fn set(&mut self, on: bool);
}

/// Thread-local RNG from `rand`
pub struct ThreadRandom {
    rng: ThreadRng,
}

impl ThreadRandom {
    pub fn new() -> Self {
        Self { rng: rand::rng() }
    }
}

impl Default for ThreadRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for ThreadRandom {
    fn turn_direction(&mut self) -> TurnDirection {
        if self.rng.random_bool(0.5) {
            TurnDirection::Left
        } else {
            TurnDirection::Right
        }
    }

    fn turn_duration_ms(&mut self, min_ms: u64, max_ms: u64) -> u64 {
        if min_ms >= max_ms {
            return min_ms;
        }
        self.rng.random_range(min_ms..max_ms)
    }
}

/// Deterministic random source that replays queued values.
/// When a queue runs dry it answers `Left` and `min_ms`.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRandom {
    directions: VecDeque<TurnDirection>,
    durations: VecDeque<u64>,
}

impl ScriptedRandom {
    pub fn new(
        directions: impl IntoIterator<Item = TurnDirection>,
        durations: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            directions: directions.into_iter().collect(),
            durations: durations.into_iter().collect(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn turn_direction(&mut self) -> TurnDirection {
        self.directions.pop_front().unwrap_or(TurnDirection::Left)
    }

    fn turn_duration_ms(&mut self, min_ms: u64, _max_ms: u64) -> u64 {
        self.durations.pop_front().unwrap_or(min_ms)
    }
}
