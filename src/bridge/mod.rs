// Bridge board support
//
// Provides:
// - Serial protocol for the motor shield bridge (motors, ultrasonic sensor, LED)
// - Capability adapters used by the controller

mod driver;
pub mod protocol;

pub use driver::{BridgeDistanceSensor, BridgeLed, BridgeMotors, SharedBus, connect};
pub use protocol::{BridgeBus, BridgeError, RunMode};
