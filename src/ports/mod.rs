//! Port traits the engine's callers implement.

pub mod config_port;
pub mod data_port;
