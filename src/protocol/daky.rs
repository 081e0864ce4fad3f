//! Daky haptic controller protocol
//!
//! Host to device:
//!
//! ```text
//! Actuation:     ['B' 0x42] [ADDRESS u8] [VALUE u8]     value = round(v * 255)
//! Battery query: ['%' 0x25]
//! ```
//!
//! Device to host:
//!
//! ```text
//! Battery reply: ['%' 0x25] [VALUE u16 little-endian]
//! ```

use super::{Address, Incoming, Protocol};
use crate::error::{Error, Result};
use crate::math::remap_clamp;

/// Actuation command tag
pub const TAG_ACTUATION: u8 = b'B';
/// Battery query / reply tag
pub const TAG_BATTERY: u8 = b'%';

/// Battery reply size: tag + u16
const BATTERY_REPLY_SIZE: usize = 3;

/// Codec for Daky controllers
#[derive(Debug, Clone, Copy, Default)]
pub struct DakyProtocol;

impl Protocol for DakyProtocol {
    fn actuation(&self, address: Address, value: f32) -> Vec<u8> {
        let value = remap_clamp(value, 0.0, 1.0, 0.0, 255.0).round() as u8;
        vec![TAG_ACTUATION, address, value]
    }

    fn query_battery(&self) -> Vec<u8> {
        vec![TAG_BATTERY]
    }

    fn parse_incoming(&self, data: &[u8]) -> Result<Incoming> {
        match data.first() {
            None => Err(Error::EmptyPacket),
            Some(&TAG_BATTERY) if data.len() == BATTERY_REPLY_SIZE => Ok(Incoming::BatteryValue(
                u16::from_le_bytes([data[1], data[2]]),
            )),
            Some(_) => Err(Error::UnsupportedPacket(data.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actuation_bytes() {
        let p = DakyProtocol;
        assert_eq!(p.actuation(2, 1.0), vec![0x42, 0x02, 0xFF]);
        assert_eq!(p.actuation(0, 0.0), vec![0x42, 0x00, 0x00]);
        // 0.5 * 255 = 127.5 rounds up
        assert_eq!(p.actuation(7, 0.5), vec![0x42, 0x07, 128]);
    }

    #[test]
    fn test_actuation_clamps_value() {
        let p = DakyProtocol;
        assert_eq!(p.actuation(1, 1.7)[2], 255);
        assert_eq!(p.actuation(1, -0.2)[2], 0);
    }

    #[test]
    fn test_battery_query() {
        assert_eq!(DakyProtocol.query_battery(), vec![0x25]);
    }

    #[test]
    fn test_parse_battery_full_range() {
        let p = DakyProtocol;
        for value in (0..=u16::MAX).step_by(257).chain([1, u16::MAX - 1, u16::MAX]) {
            let [lo, hi] = value.to_le_bytes();
            let parsed = p.parse_incoming(&[0x25, lo, hi]).unwrap();
            assert_eq!(parsed, Incoming::BatteryValue(value));
        }
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(matches!(
            DakyProtocol.parse_incoming(&[]),
            Err(Error::EmptyPacket)
        ));
    }

    #[test]
    fn test_parse_unknown_tag_fails() {
        match DakyProtocol.parse_incoming(&[0x42, 0x01, 0x02]) {
            Err(Error::UnsupportedPacket(bytes)) => assert_eq!(bytes, vec![0x42, 0x01, 0x02]),
            other => panic!("expected UnsupportedPacket, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncated_battery_fails() {
        assert!(matches!(
            DakyProtocol.parse_incoming(&[0x25, 0x10]),
            Err(Error::UnsupportedPacket(_))
        ));
    }
}
