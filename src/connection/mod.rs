//! Transport layer for controller I/O
//!
//! A [`Connection`] moves opaque payloads to and from one device. Inbound
//! payloads are pushed, one complete message at a time, into the
//! [`FrameSender`] handed over at connect time.

use crate::config::{parse_params, ConnectionConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub mod framing;
mod mock;
mod serial;
mod udp;

pub use framing::{encode_frame, FrameDecoder};
pub use mock::MockConnection;
pub use serial::{SerialConnection, SerialParams};
pub use udp::{UdpConnection, UdpParams};

/// Receives complete inbound payloads
pub type FrameSender = mpsc::UnboundedSender<Bytes>;

/// Bidirectional transport to one device
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open the transport; inbound payloads go to `frames` until disconnect
    async fn connect(&self, frames: FrameSender) -> Result<()>;

    /// Close the transport. Safe to call when not connected.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the transport is open
    fn is_connected(&self) -> bool;

    /// Send one payload
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Human readable endpoint for logs
    fn describe(&self) -> String;
}

/// Create a connection based on configuration
pub fn create_connection(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    match config.kind.to_ascii_lowercase().as_str() {
        "udp" => {
            let params: UdpParams = parse_params("connection", &config.kind, &config.params)?;
            Ok(Box::new(UdpConnection::new(params)))
        }
        "serial" => {
            let params: SerialParams = parse_params("connection", &config.kind, &config.params)?;
            Ok(Box::new(SerialConnection::new(params)))
        }
        _ => Err(Error::UnknownType {
            kind: "connection",
            name: config.kind.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> ConnectionConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_create_udp() {
        let c = create_connection(&config(
            "type = \"udp\"\naddress = \"localhost\"\nport = 1337",
        ))
        .unwrap();
        assert_eq!(c.describe(), "udp://localhost:1337");
        assert!(!c.is_connected());
    }

    #[test]
    fn test_create_serial_defaults() {
        let c = create_connection(&config(
            "type = \"serial\"\nproduct = \"Daky Vest\"\nserial_number = \"A1\"",
        ))
        .unwrap();
        assert_eq!(c.describe(), "serial:Daky Vest#A1@115200");
    }

    #[test]
    fn test_missing_params() {
        let result = create_connection(&config("type = \"udp\"\naddress = \"localhost\""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_kind() {
        let result = create_connection(&config("type = \"ble\""));
        assert!(matches!(
            result,
            Err(Error::UnknownType {
                kind: "connection",
                ..
            })
        ));
    }
}
