// Bridge diagnostic: READ-ONLY check of the motor shield bridge board
//
// Nothing is written to the motors, so the wheels will not move.
// Run this first when bringing up a new board.
//
// Usage: cargo run --example bridge_diagnostic -- [port]
// Example: cargo run --example bridge_diagnostic -- /dev/ttyACM0

use rover_runtime::bridge::protocol::{BOARD_ID, BridgeBus, Register, RunMode, SENSOR_ID};
use rover_runtime::config::{BRIDGE_BAUDRATE, BRIDGE_PORT, LEFT_MOTOR_CHANNEL, RIGHT_MOTOR_CHANNEL};
use std::thread::sleep;
use std::time::Duration;

const MOTOR_CHANNELS: [u8; 2] = [LEFT_MOTOR_CHANNEL, RIGHT_MOTOR_CHANNEL];
const MOTOR_NAMES: [&str; 2] = ["Left", "Right"];
const DISTANCE_SAMPLES: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| BRIDGE_PORT.to_string());

    println!("Rover bridge diagnostic (read-only)");
    println!("Serial port: {} @ {} baud", port, BRIDGE_BAUDRATE);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match BridgeBus::open_with_baudrate(&port, BRIDGE_BAUDRATE) {
        Ok(bus) => {
            println!("  ✓ Serial port opened");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Make sure your user may access the port (dialout group)");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging board...");
    match bus.ping(BOARD_ID) {
        Ok(true) => println!("  ✓ Board responding"),
        Ok(false) => {
            println!("  ✗ No response, check the bridge firmware and baud rate");
            return Ok(());
        }
        Err(e) => {
            println!("  ✗ ERROR: {}", e);
            return Err(e.into());
        }
    }
    println!();

    println!("Step 3: Reading motor channels...");
    for (name, &channel) in MOTOR_NAMES.iter().zip(MOTOR_CHANNELS.iter()) {
        println!("  === {} motor (channel {}) ===", name, channel);
        match bus.read_u8(channel, Register::Run) {
            Ok(raw) => match RunMode::from_u8(raw) {
                Some(mode) => println!("    Run mode: {:?}", mode),
                None => println!("    Run mode: {} (unknown)", raw),
            },
            Err(e) => println!("    Run mode: ERROR - {}", e),
        }
        match bus.get_motor_speed(channel) {
            Ok(speed) => println!("    Speed:    {}", speed),
            Err(e) => println!("    Speed:    ERROR - {}", e),
        }
    }
    println!();

    println!("Step 4: Sampling distance sensor...");
    match bus.read_u16(SENSOR_ID, Register::MaxDistance) {
        Ok(cm) => println!("  Max distance: {} cm", cm),
        Err(e) => println!("  Max distance: ERROR - {}", e),
    }
    for i in 0..DISTANCE_SAMPLES {
        match bus.read_distance() {
            Ok(0) => println!("  Sample {}: no echo", i + 1),
            Ok(cm) => println!("  Sample {}: {} cm", i + 1, cm),
            Err(e) => println!("  Sample {}: ERROR - {}", i + 1, e),
        }
        sleep(Duration::from_millis(100));
    }
    println!();

    println!("Diagnostic complete.");
    println!("Motors should read Release / 0 when idle, and distances should track");
    println!("your hand moving in front of the sensor.");

    Ok(())
}
