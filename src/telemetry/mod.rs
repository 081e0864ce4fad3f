//! Game telemetry sources
//!
//! A [`TelemetrySource`] delivers `(path, value)` pairs from a running game
//! to registered callbacks. Callbacks run on the source's receive task and
//! must not block; the manager's callback only enqueues.

use crate::config::{parse_params, GameConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

mod dispatcher;
pub mod oscquery;
mod vrchat;

pub use dispatcher::Dispatcher;
pub use vrchat::{VrChat, VrChatParams};

/// Receives `(path, value)` for every matching parameter change
pub type Callback = Arc<dyn Fn(&str, f32) + Send + Sync>;

/// Source of per-path telemetry values
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Begin receiving; callbacks may fire from now on
    async fn start(&mut self) -> Result<()>;

    /// Stop receiving
    async fn stop(&mut self) -> Result<()> {
        self.disconnect().await
    }

    /// Release sockets
    async fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Call `callback` for `path`, or every path under it when `wildcard`
    fn listen(&mut self, path: &str, callback: Callback, wildcard: bool);

    /// Like [`TelemetrySource::listen`] but values are distances in `[0, 1]`,
    /// 0 meaning contact
    fn listen_distance(&mut self, path: &str, callback: Callback, wildcard: bool);

    /// Push a value back to the game
    async fn send(&self, path: &str, value: f32) -> Result<()>;
}

/// Create a telemetry source based on configuration
pub fn create_source(config: &GameConfig) -> Result<Box<dyn TelemetrySource>> {
    match config.kind.to_ascii_lowercase().as_str() {
        "vrchat" => {
            let params: VrChatParams = parse_params("game", &config.kind, &config.params)?;
            Ok(Box::new(VrChat::new(params)))
        }
        _ => Err(Error::UnknownType {
            kind: "game",
            name: config.kind.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_vrchat() {
        let config: GameConfig = toml::from_str("type = \"VRChat\"\nreceiving_port = 9101").unwrap();
        let source = create_source(&config).unwrap();
        assert!(!source.is_connected());
    }

    #[test]
    fn test_create_unknown() {
        let config: GameConfig = toml::from_str("type = \"resonite\"").unwrap();
        assert!(matches!(
            create_source(&config),
            Err(Error::UnknownType { kind: "game", .. })
        ));
    }
}
