//! Device command codecs
//!
//! A [`Protocol`] turns actuation requests into the bytes a device expects and
//! decodes what the device sends back. Codecs are pure: no I/O, no state.

pub mod daky;

pub use daky::DakyProtocol;

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};

/// Protocol-level actuator address
pub type Address = u8;

/// Decoded device-to-host record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// Battery level as reported by the device
    BatteryValue(u16),
}

/// Device command codec
pub trait Protocol: Send + Sync {
    /// Encode an actuation command, `value` in `[0, 1]`
    fn actuation(&self, address: Address, value: f32) -> Vec<u8>;

    /// Encode a battery level request
    fn query_battery(&self) -> Vec<u8>;

    /// Decode one complete inbound payload
    fn parse_incoming(&self, data: &[u8]) -> Result<Incoming>;
}

/// Create a protocol codec based on configuration
pub fn create_protocol(config: &ProtocolConfig) -> Result<Box<dyn Protocol>> {
    match config.kind.to_ascii_lowercase().as_str() {
        "daky" => Ok(Box::new(DakyProtocol)),
        _ => Err(Error::UnknownType {
            kind: "protocol",
            name: config.kind.clone(),
        }),
    }
}
