// Serial protocol of the motor shield bridge board
//
// The bridge is a small microcontroller that owns the motor shield, the
// ultrasonic sensor and the status LED, and exposes them as registers.
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Response:      [0xFF, 0xFF, ID, Length, Status, Data..., Checksum]

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Reply timeout on the bridge port
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Device IDs other than the motor channels (1..=4)
pub const SENSOR_ID: u8 = 0x10;
pub const BOARD_ID: u8 = 0x20;
pub const BROADCAST_ID: u8 = 0xFE;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // Motor channels
    Speed = 0x20, // 1 byte: duty magnitude 0-255
    Run = 0x21,   // 1 byte: RunMode, follows Speed so both can be written at once

    // Ultrasonic sensor
    Distance = 0x30,    // 2 bytes, read-only, cm; 0 = no echo
    MaxDistance = 0x32, // 2 bytes, cm; pings beyond this report no echo

    // Board
    Led = 0x40, // 1 byte: 0=off, 1=on
}

/// Motor shield drive modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Forward = 1,
    Backward = 2,
    Brake = 3,
    Release = 4,
}

impl RunMode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(RunMode::Forward),
            2 => Some(RunMode::Backward),
            3 => Some(RunMode::Brake),
            4 => Some(RunMode::Release),
            _ => None,
        }
    }
}

/// Error types for bridge communication
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from device {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for device {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Device {id} returned error status: 0x{status:02X}")]
    DeviceError { id: u8, status: u8 },

    #[error("Timeout waiting for response from device {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Byte stream the bus runs over
pub trait BusPort: Read + Write {
    /// Throw away whatever is waiting in the receive buffer
    fn discard_input(&mut self) -> io::Result<()>;
}

impl BusPort for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Split a signed speed into the shield's magnitude and direction
pub fn encode_speed(speed: i16) -> (u8, RunMode) {
    let magnitude = speed.unsigned_abs().min(255) as u8;
    let mode = match speed {
        s if s > 0 => RunMode::Forward,
        s if s < 0 => RunMode::Backward,
        _ => RunMode::Release,
    };
    (magnitude, mode)
}

/// Inverse of [`encode_speed`]; brake and release both read as zero
pub fn decode_speed(magnitude: u8, mode: RunMode) -> i16 {
    match mode {
        RunMode::Forward => i16::from(magnitude),
        RunMode::Backward => -i16::from(magnitude),
        RunMode::Brake | RunMode::Release => 0,
    }
}

/// Bridge bus - handles serial communication with the board
pub struct BridgeBus<P = Box<dyn SerialPort>> {
    port: P,
}

impl BridgeBus {
    /// Open a connection to the bridge
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<P: BusPort> BridgeBus<P> {
    /// Wrap an already open byte stream
    pub fn from_port(port: P) -> Self {
        Self { port }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        // a late or partial reply to an earlier request would shift every later frame
        self.port.discard_input()?;
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn map_timeout(e: io::Error, id: u8) -> BridgeError {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof => {
                BridgeError::Timeout { id }
            }
            _ => BridgeError::Io(e),
        }
    }

    /// Read a response packet, returning its data bytes
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port
            .read_exact(&mut header)
            .map_err(|e| Self::map_timeout(e, expected_id))?;

        if header != HEADER {
            return Err(BridgeError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port
            .read_exact(&mut id_length)
            .map_err(|e| Self::map_timeout(e, expected_id))?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(BridgeError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(BridgeError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // status + data + checksum = length bytes
        let mut remaining = vec![0u8; length];
        self.port
            .read_exact(&mut remaining)
            .map_err(|e| Self::map_timeout(e, expected_id))?;

        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..length - 1]);
        if Self::checksum(&checksum_data) != remaining[length - 1] {
            return Err(BridgeError::ChecksumMismatch { id });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(BridgeError::DeviceError { id, status });
        }

        Ok(remaining[1..length - 1].to_vec())
    }

    /// Ping a device to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(BridgeError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write consecutive registers starting at `register`
    pub fn write_bytes(&mut self, id: u8, register: Register, data: &[u8]) -> Result<()> {
        let mut params = Vec::with_capacity(1 + data.len());
        params.push(register as u8);
        params.extend_from_slice(data);
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write to device {}: reg={:?}, data={:02X?}", id, register, data);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        self.write_bytes(id, register, &[value])
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        self.write_bytes(id, register, &value.to_le_bytes())
    }

    /// Read `len` consecutive registers
    pub fn read_bytes(&mut self, id: u8, register: Register, len: u8) -> Result<Vec<u8>> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, len]);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < len as usize {
            return Err(BridgeError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", len, response.len()),
            });
        }
        Ok(response)
    }

    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        Ok(self.read_bytes(id, register, 1)?[0])
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let response = self.read_bytes(id, register, 2)?;
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Sync write: write the same registers on several devices in one packet.
    /// data: [(id, bytes), ...], every entry the same length
    pub fn sync_write(&mut self, register: Register, data: &[(u8, &[u8])]) -> Result<()> {
        let Some(&(_, first)) = data.first() else {
            return Ok(());
        };
        let data_length = first.len();
        if data.iter().any(|(_, bytes)| bytes.len() != data_length) {
            return Err(BridgeError::InvalidResponse {
                id: BROADCAST_ID,
                reason: "Sync write entries differ in length".to_string(),
            });
        }

        // [start_addr, data_length, id1, data1..., id2, data2..., ...]
        let mut params = vec![register as u8, data_length as u8];
        for &(id, bytes) in data {
            params.push(id);
            params.extend_from_slice(bytes);
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} devices: reg={:?}", data.len(), register);
        self.send_packet(&packet)?;

        // Sync write has no response
        Ok(())
    }

    // === High-level convenience methods ===

    /// Drive a motor channel at a signed speed
    pub fn set_motor_speed(&mut self, channel: u8, speed: i16) -> Result<()> {
        let (magnitude, mode) = encode_speed(speed);
        self.write_bytes(channel, Register::Speed, &[magnitude, mode as u8])
    }

    /// Read back the speed a motor channel is running at
    pub fn get_motor_speed(&mut self, channel: u8) -> Result<i16> {
        let raw = self.read_bytes(channel, Register::Speed, 2)?;
        let mode = RunMode::from_u8(raw[1]).ok_or_else(|| BridgeError::InvalidResponse {
            id: channel,
            reason: format!("Unknown run mode {}", raw[1]),
        })?;
        Ok(decode_speed(raw[0], mode))
    }

    /// Release several motor channels in one packet
    pub fn release_all(&mut self, channels: &[u8]) -> Result<()> {
        let released = [0u8, RunMode::Release as u8];
        let data: Vec<(u8, &[u8])> = channels.iter().map(|&id| (id, &released[..])).collect();
        self.sync_write(Register::Speed, &data)
    }

    /// Raw sensor distance in cm, 0 when the ping got no echo
    pub fn read_distance(&mut self) -> Result<u16> {
        self.read_u16(SENSOR_ID, Register::Distance)
    }

    pub fn set_max_distance(&mut self, cm: u16) -> Result<()> {
        self.write_u16(SENSOR_ID, Register::MaxDistance, cm)
    }

    pub fn set_led(&mut self, on: bool) -> Result<()> {
        self.write_u8(BOARD_ID, Register::Led, u8::from(on))
    }
}
