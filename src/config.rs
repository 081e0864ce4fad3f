//! Configuration for the haptic bridge
//!
//! Loads the whole TOML document into typed, immutable structures before any
//! runtime object is built. Capability sections (`game`, `behavior`,
//! `protocol`, `connection`) carry a `type` name plus free-form parameters;
//! the factories in each module resolve the name and deserialize the
//! parameters into the variant's own struct.
//!
//! ```toml
//! [game]
//! type = "vrchat"
//! receiving_port = 9001
//!
//! [router]
//! prefix = "/avatar/parameters/haptX-"
//!
//! [behavior]
//! type = "velocity"
//!
//! [[controllers]]
//! name = "headset"
//! protocol = { type = "daky" }
//! connection = { type = "udp", address = "localhost", port = 1337 }
//!
//! [controllers.actuators.0]
//! name = "headTop"
//! min = 0.0325
//! max = 0.0588
//! ```

use crate::core::{Actuator, Controller, Router, Throttle};
use crate::error::{Error, Result};
use crate::protocol::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Logging options
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Telemetry source selection
    pub game: GameConfig,
    /// Path routing
    pub router: RouterConfig,
    /// Behavior engine selection
    pub behavior: BehaviorConfig,
    /// Hardware controllers
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Telemetry source selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GameConfig {
    /// Source name, e.g. "vrchat"
    #[serde(rename = "type")]
    pub kind: String,
    /// Source-specific parameters
    #[serde(flatten)]
    pub params: toml::Table,
}

/// Router configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Path prefix stripped before actuator name lookup
    pub prefix: String,
}

/// Behavior engine selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BehaviorConfig {
    /// Engine name: "proximity" or "velocity"
    #[serde(rename = "type")]
    pub kind: String,
    /// Engine-specific parameters
    #[serde(flatten)]
    pub params: toml::Table,
}

/// Protocol codec selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Codec name, e.g. "daky"
    #[serde(rename = "type")]
    pub kind: String,
}

/// Connection selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Transport name: "udp" or "serial"
    #[serde(rename = "type")]
    pub kind: String,
    /// Transport-specific parameters
    #[serde(flatten)]
    pub params: toml::Table,
}

/// One hardware controller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Unique controller name
    pub name: String,
    /// Query the battery level right after connecting
    #[serde(default)]
    pub on_battery: bool,
    /// Codec
    pub protocol: ProtocolConfig,
    /// Transport
    pub connection: ConnectionConfig,
    /// Address (as a TOML key) to actuator calibration
    #[serde(default)]
    pub actuators: BTreeMap<String, ActuatorConfig>,
}

/// Calibration for one actuator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActuatorConfig {
    /// Unique actuator name (telemetry path suffix)
    pub name: String,
    /// Output value at the sensitivity floor
    #[serde(default)]
    pub min: f32,
    /// Output value at full intensity
    #[serde(default = "default_max")]
    pub max: f32,
    /// Inputs below this are forced to zero
    #[serde(default)]
    pub min_sensitivity: f32,
    /// Divides raw velocity to normalize it
    #[serde(default = "default_collider_scaler")]
    pub collider_scaler: f32,
    /// Optional rate limit
    #[serde(default)]
    pub throttle: Option<Throttle>,
}

fn default_max() -> f32 {
    1.0
}
fn default_collider_scaler() -> f32 {
    5.0
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.controllers.is_empty() {
            return Err(Error::Config("No controller defined".to_string()));
        }
        let mut names = HashSet::new();
        for controller in &config.controllers {
            if !names.insert(controller.name.as_str()) {
                return Err(Error::DuplicateController(controller.name.clone()));
            }
        }
        Ok(config)
    }

    /// Build the router from the configured prefix
    pub fn build_router(&self) -> Router {
        Router::new(&self.router.prefix)
    }

    /// Build every configured controller (not yet connected)
    pub fn build_controllers(&self) -> Result<Vec<Arc<Controller>>> {
        self.controllers
            .iter()
            .map(|c| c.build().map(Arc::new))
            .collect()
    }
}

impl ControllerConfig {
    /// Build the controller with its codec, transport and actuator table
    pub fn build(&self) -> Result<Controller> {
        let protocol = crate::protocol::create_protocol(&self.protocol)?;
        let connection = crate::connection::create_connection(&self.connection)?;

        let mut actuators = BTreeMap::new();
        for (key, actuator) in &self.actuators {
            let address: Address = key.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "Controller {}: actuator address {:?} is not in 0-255",
                    self.name, key
                ))
            })?;
            actuators.insert(address, actuator.build());
        }

        Ok(Controller::new(&self.name, actuators, protocol, connection)
            .with_battery_query(self.on_battery))
    }
}

impl ActuatorConfig {
    /// Build the immutable actuator
    pub fn build(&self) -> Actuator {
        Actuator {
            name: self.name.clone(),
            min: self.min,
            max: self.max,
            min_sensitivity: self.min_sensitivity,
            collider_scaler: self.collider_scaler,
            throttle: self.throttle,
        }
    }
}

/// Deserialize a variant's parameter table into its typed struct
pub(crate) fn parse_params<T: DeserializeOwned>(
    kind: &'static str,
    name: &str,
    params: &toml::Table,
) -> Result<T> {
    toml::Value::Table(params.clone())
        .try_into::<T>()
        .map_err(|e| Error::Config(format!("Invalid {} {:?} parameters: {}", kind, name, e)))
}
