// Fixed-rate control loop
// Each tick samples the clock once, runs one controller step, blinks the
// heartbeat LED and optionally emits a telemetry line.

use std::io::Write;
use std::time::Instant;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

// local imports
use crate::bridge::{self, BridgeDistanceSensor, BridgeLed, BridgeMotors};
use crate::config::RuntimeConfig;
use crate::controller::{ControllerSettings, VehicleController};
use crate::hal::{DistanceSensor, Motors, RandomSource, StatusLed, ThreadRandom};
use crate::heartbeat::Heartbeat;
use crate::messages::{DriveCommand, TickReport};
use crate::remote::{KeyboardSymbolSource, RemoteControl, SerialSymbolSource, SymbolSource};
use crate::sim::{SimulatedLed, Simulation};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How the binary was asked to run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: RuntimeConfig,
    /// Use the simulator instead of the bridge board
    pub simulate: bool,
    /// Read operator keys from the local terminal instead of the Bluetooth link
    pub keyboard: bool,
    /// Print one JSON TickReport per tick on stdout
    pub telemetry: bool,
}

/// Where operator symbols come from
pub enum OperatorLink {
    Serial(SerialSymbolSource),
    Keyboard(KeyboardSymbolSource),
}

impl OperatorLink {
    fn quit_requested(&self) -> bool {
        match self {
            OperatorLink::Serial(_) => false,
            OperatorLink::Keyboard(keyboard) => keyboard.quit_requested(),
        }
    }
}

impl SymbolSource for OperatorLink {
    fn try_read_symbol(&mut self) -> Option<u8> {
        match self {
            OperatorLink::Serial(serial) => serial.try_read_symbol(),
            OperatorLink::Keyboard(keyboard) => keyboard.try_read_symbol(),
        }
    }
}

/// Leaves raw mode again however the loop exits
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Controller plus the bits of the loop that are not part of the control core
pub struct Runtime<D, M, S, R, L> {
    controller: VehicleController<D, M, S, R>,
    heartbeat: Heartbeat<L>,
    started_at: Instant,
    telemetry: Option<Box<dyn Write>>,
}

impl<D, M, S, R, L> Runtime<D, M, S, R, L>
where
    D: DistanceSensor,
    M: Motors,
    S: SymbolSource,
    R: RandomSource,
    L: StatusLed,
{
    pub fn new(controller: VehicleController<D, M, S, R>, heartbeat: Heartbeat<L>) -> Self {
        Self {
            controller,
            heartbeat,
            started_at: Instant::now(),
            telemetry: None,
        }
    }

    /// Emit one JSON line per tick to `sink`
    pub fn with_telemetry(mut self, sink: Box<dyn Write>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Run a single tick at the current time
    pub fn tick(&mut self) -> TickReport {
        let now = self.now_ms();
        self.tick_at(now)
    }

    /// Run a single tick at an explicit time
    pub fn tick_at(&mut self, now_ms: u64) -> TickReport {
        let report = self.controller.step(now_ms);
        self.heartbeat.tick(now_ms);

        if let Some(sink) = self.telemetry.as_mut() {
            let written = serde_json::to_writer(&mut *sink, &report)
                .map_err(std::io::Error::from)
                .and_then(|()| sink.write_all(b"\n"));
            if let Err(e) = written {
                warn!("Telemetry write failed, disabling telemetry: {}", e);
                self.telemetry = None;
            }
        }

        report
    }

    /// Stop the motors and switch the LED off
    pub fn shutdown(&mut self) {
        info!("Shutting down, stopping motors");
        self.controller.halt();
        self.heartbeat.off();
    }

    pub fn controller(&self) -> &VehicleController<D, M, S, R> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut VehicleController<D, M, S, R> {
        &mut self.controller
    }
}

pub async fn run(options: RunOptions) -> Result<(), BoxError> {
    let config = options.config.clone();
    config.validate()?;

    let link = if options.keyboard {
        info!("Operator keys from this terminal: w/a/s/d/x move, A auto, R take control, Esc quit");
        OperatorLink::Keyboard(KeyboardSymbolSource::new())
    } else {
        info!(
            "Opening operator link on {} @ {} baud",
            config.remote_port, config.remote_baudrate
        );
        OperatorLink::Serial(SerialSymbolSource::open(
            &config.remote_port,
            config.remote_baudrate,
        )?)
    };
    let remote = RemoteControl::with_command(link, DriveCommand::with_increment(config.speed_increment));
    let settings = ControllerSettings::from(&config);

    if options.simulate {
        info!("Running against the simulator");
        let sim = Simulation::new(200.0, config.max_tracked_distance_cm);
        let controller =
            VehicleController::new(sim.sensor(), sim.motors(), remote, ThreadRandom::new(), settings);
        let heartbeat = Heartbeat::new(SimulatedLed::default(), config.blink_interval());
        drive(Runtime::new(controller, heartbeat), &options).await
    } else {
        let bus = bridge::connect(&config.bridge_port, config.bridge_baudrate)?;
        let mut sensor = BridgeDistanceSensor::new(bus.clone(), config.max_tracked_distance_cm);
        sensor.configure()?;
        let motors = BridgeMotors::new(
            bus.clone(),
            config.left_motor_channel,
            config.right_motor_channel,
        );
        let controller = VehicleController::new(sensor, motors, remote, ThreadRandom::new(), settings);
        let heartbeat = Heartbeat::new(BridgeLed::new(bus), config.blink_interval());
        drive(Runtime::new(controller, heartbeat), &options).await
    }
}

async fn drive<D, M, R, L>(
    runtime: Runtime<D, M, OperatorLink, R, L>,
    options: &RunOptions,
) -> Result<(), BoxError>
where
    D: DistanceSensor,
    M: Motors,
    R: RandomSource,
    L: StatusLed,
{
    let mut runtime = if options.telemetry {
        runtime.with_telemetry(Box::new(std::io::stdout()))
    } else {
        runtime
    };
    let _raw_mode = if options.keyboard {
        Some(RawModeGuard::enable()?)
    } else {
        None
    };

    let mut tick = interval(options.config.tick_period());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, {}s autonomous run, obstacle at {}cm",
        options.config.loop_hz, options.config.auto_run_secs, options.config.obstacle_threshold_cm
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                runtime.tick();
                if runtime.controller().remote().source().quit_requested() {
                    break;
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    runtime.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{ScriptedRandom, TurnDirection};
    use crate::messages::VehicleState;
    use crate::remote::ScriptedSymbols;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Telemetry sink the test can inspect afterwards
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sim_runtime(
        symbols: ScriptedSymbols,
    ) -> Runtime<
        crate::sim::SimulatedSensor,
        crate::sim::SimulatedMotors,
        ScriptedSymbols,
        ScriptedRandom,
        SimulatedLed,
    > {
        let sim = Simulation::new(300.0, 600);
        let controller = VehicleController::new(
            sim.sensor(),
            sim.motors(),
            RemoteControl::new(symbols),
            ScriptedRandom::new([TurnDirection::Left], [600]),
            ControllerSettings::default(),
        );
        Runtime::new(
            controller,
            Heartbeat::new(SimulatedLed::default(), std::time::Duration::from_secs(2)),
        )
    }

    #[test]
    fn test_telemetry_lines() {
        let buffer = SharedBuffer::default();
        let mut runtime = sim_runtime(ScriptedSymbols::new([Some(b'w'), None]))
            .with_telemetry(Box::new(buffer.clone()));
        runtime.tick_at(0);
        runtime.tick_at(20);

        let text = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["state"], "remote_controlled");
        assert_eq!(lines[0]["command"]["mode"], "move");
        assert_eq!(lines[0]["left_speed"], 255);
        assert!(lines[1].get("command").is_none());
    }

    #[test]
    fn test_autonomous_run_ends_stopped() {
        let mut runtime = sim_runtime(ScriptedSymbols::new([Some(b'A')]));
        let mut t = 0;
        while t <= 31_000 {
            runtime.tick_at(t);
            t += 20;
        }
        assert_eq!(runtime.controller().state(), VehicleState::Stopped);
        assert_eq!(runtime.controller().motor_speeds(), (0, 0));
    }

    #[test]
    fn test_shutdown_halts() {
        let mut runtime = sim_runtime(ScriptedSymbols::new([Some(b'A')]));
        runtime.tick_at(0);
        runtime.shutdown();
        assert_eq!(runtime.controller().state(), VehicleState::Stopped);
        assert_eq!(runtime.controller().motor_speeds(), (0, 0));
    }
}
