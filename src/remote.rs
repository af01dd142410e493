// Operator remote control
//
// One byte per key press arrives over a Bluetooth serial link (or the local
// keyboard when bench testing). Each byte mutates a persistent DriveCommand.

use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::messages::{CommandMode, DriveCommand};

/// Non-blocking source of single-byte symbols
pub trait SymbolSource {
    /// Next byte if one is already waiting, `None` otherwise. Never blocks.
    fn try_read_symbol(&mut self) -> Option<u8>;
}

/// Operator keys understood by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Left,
    Right,
    Forward,
    Backward,
    Stop,
    Auto,
    Manual,
    Unknown(u8),
}

impl From<u8> for Symbol {
    fn from(byte: u8) -> Self {
        match byte {
            b'a' => Symbol::Left,
            b'd' => Symbol::Right,
            b'w' => Symbol::Forward,
            b'x' => Symbol::Backward,
            b's' => Symbol::Stop,
            b'A' => Symbol::Auto,
            b'R' => Symbol::Manual,
            other => Symbol::Unknown(other),
        }
    }
}

/// Maps received symbols onto an accumulated [`DriveCommand`]
pub struct RemoteControl<S> {
    source: S,
    command: DriveCommand,
}

impl<S: SymbolSource> RemoteControl<S> {
    pub fn new(source: S) -> Self {
        Self::with_command(source, DriveCommand::new())
    }

    /// Start from a preconfigured command, e.g. one with a custom increment
    pub fn with_command(source: S, command: DriveCommand) -> Self {
        Self { source, command }
    }

    /// Poll for one symbol and apply it.
    ///
    /// Returns a copy of the accumulated command whenever a byte arrived,
    /// including bytes that map to no action.
    pub fn try_receive(&mut self) -> Option<DriveCommand> {
        let byte = self.source.try_read_symbol()?;
        let symbol = Symbol::from(byte);
        debug!(?symbol, byte, "Remote symbol");
        self.apply(symbol);
        Some(self.command)
    }

    fn apply(&mut self, symbol: Symbol) {
        let command = &mut self.command;
        match symbol {
            Symbol::Left => {
                command.set_mode(CommandMode::Move);
                command.increment_left();
            }
            Symbol::Right => {
                command.set_mode(CommandMode::Move);
                command.increment_right();
            }
            Symbol::Forward => {
                command.set_mode(CommandMode::Move);
                command.increment_forward();
            }
            Symbol::Backward => {
                command.set_mode(CommandMode::Move);
                command.increment_backward();
            }
            Symbol::Stop => {
                command.set_mode(CommandMode::Move);
                command.stop();
            }
            Symbol::Auto => command.set_mode(CommandMode::AutoControl),
            Symbol::Manual => command.set_mode(CommandMode::ManualControl),
            Symbol::Unknown(_) => {}
        }
    }

    /// Latest accumulated command
    pub fn command(&self) -> DriveCommand {
        self.command
    }

    /// Overwrite the accumulated speeds, used when the operator takes over
    /// so the next key press continues from what the motors are doing.
    pub fn sync_speeds(&mut self, left: i16, right: i16) {
        self.command.set_left_speed(left);
        self.command.set_right_speed(right);
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Errors opening a remote link
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Up/down state of the operator link; logs only when it changes
#[derive(Debug, Default)]
struct LinkMonitor {
    down: bool,
}

impl LinkMonitor {
    /// Returns true when the link just went down
    fn failed(&mut self, error: &dyn std::fmt::Display) -> bool {
        if self.down {
            return false;
        }
        warn!("Remote link unavailable: {}", error);
        self.down = true;
        true
    }

    /// Returns true when the link just came back
    fn recovered(&mut self) -> bool {
        if !self.down {
            return false;
        }
        info!("Remote link restored");
        self.down = false;
        true
    }
}

/// Bluetooth SPP (or any serial) link delivering one byte per key press
pub struct SerialSymbolSource {
    port: Box<dyn SerialPort>,
    link: LinkMonitor,
}

impl SerialSymbolSource {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self, RemoteError> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(10))
            .open()?;
        Ok(Self {
            port,
            link: LinkMonitor::default(),
        })
    }
}

impl SymbolSource for SerialSymbolSource {
    fn try_read_symbol(&mut self) -> Option<u8> {
        let waiting = match self.port.bytes_to_read() {
            Ok(n) => n,
            Err(e) => {
                self.link.failed(&e);
                return None;
            }
        };
        self.link.recovered();
        if waiting == 0 {
            return None;
        }

        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Some(byte[0]),
            Err(e) => {
                self.link.failed(&e);
                None
            }
        }
    }
}

/// Local keyboard as a stand-in for the Bluetooth remote.
/// Expects the terminal to be in raw mode; Esc or Ctrl-C request shutdown.
#[derive(Debug, Default)]
pub struct KeyboardSymbolSource {
    quit_requested: bool,
}

impl KeyboardSymbolSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}

impl SymbolSource for KeyboardSymbolSource {
    fn try_read_symbol(&mut self) -> Option<u8> {
        // Drain non-key events until a usable key shows up or the queue is empty
        loop {
            match event::poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    warn!("Keyboard poll failed: {}", e);
                    return None;
                }
            }

            let KeyEvent {
                code,
                modifiers,
                kind,
                ..
            } = match event::read() {
                Ok(Event::Key(key)) => key,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Keyboard read failed: {}", e);
                    return None;
                }
            };
            if kind != KeyEventKind::Press {
                continue;
            }

            match code {
                KeyCode::Esc => {
                    self.quit_requested = true;
                    return None;
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.quit_requested = true;
                    return None;
                }
                KeyCode::Char(c) if c.is_ascii() => return Some(c as u8),
                _ => continue,
            }
        }
    }
}

/// Replays a fixed script, one entry per poll. `None` entries are ticks
/// where nothing arrives.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSymbols {
    script: VecDeque<Option<u8>>,
}

impl ScriptedSymbols {
    pub fn new(script: impl IntoIterator<Item = Option<u8>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl SymbolSource for ScriptedSymbols {
    fn try_read_symbol(&mut self) -> Option<u8> {
        self.script.pop_front().flatten()
    }
}
