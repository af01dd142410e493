// Status LED blink showing the loop is alive

use std::time::Duration;

use crate::hal::StatusLed;

pub struct Heartbeat<L> {
    led: L,
    interval_ms: u64,
    next_toggle_ms: u64,
    on: bool,
}

impl<L: StatusLed> Heartbeat<L> {
    pub fn new(led: L, interval: Duration) -> Self {
        Self {
            led,
            interval_ms: interval.as_millis() as u64,
            next_toggle_ms: 0,
            on: false,
        }
    }

    /// Toggle the LED once `now_ms` passes the next deadline
    pub fn tick(&mut self, now_ms: u64) {
        if now_ms > self.next_toggle_ms {
            self.next_toggle_ms = now_ms.saturating_add(self.interval_ms);
            self.on = !self.on;
            self.led.set(self.on);
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Switch the LED off, used on shutdown
    pub fn off(&mut self) {
        self.on = false;
        self.led.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLed;

    #[test]
    fn test_toggles_every_interval() {
        let mut heartbeat = Heartbeat::new(SimulatedLed::default(), Duration::from_secs(2));
        heartbeat.tick(1);
        assert!(heartbeat.is_on());
        heartbeat.tick(2_000);
        assert!(heartbeat.is_on());
        heartbeat.tick(2_002);
        assert!(!heartbeat.is_on());
        heartbeat.tick(4_003);
        assert!(heartbeat.is_on());
    }

    #[test]
    fn test_off() {
        let mut heartbeat = Heartbeat::new(SimulatedLed::default(), Duration::from_secs(2));
        heartbeat.tick(1);
        heartbeat.off();
        assert!(!heartbeat.is_on());
    }
}
