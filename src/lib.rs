// Control core and runtime for a two-wheeled rover that is either driven
// by an operator over Bluetooth or avoids obstacles on its own.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod filter;
pub mod hal;
pub mod heartbeat;
pub mod messages;
pub mod remote;
pub mod runtime;
pub mod sim;
