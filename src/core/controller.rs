//! One physical haptic device: actuator table, codec and transport

use super::Actuator;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::{Address, Incoming, Protocol};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A haptic controller
///
/// Owns its actuators, its protocol codec and its connection. Shared as
/// `Arc<Controller>` between the router, the behavior engine and timers.
pub struct Controller {
    name: String,
    address_to_actuator: BTreeMap<Address, Actuator>,
    name_to_address: HashMap<String, Address>,
    protocol: Box<dyn Protocol>,
    connection: Box<dyn Connection>,
    query_battery_on_connect: bool,
    battery: Mutex<Option<u16>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller; it is not connected until [`Controller::connect`]
    pub fn new(
        name: &str,
        actuators: BTreeMap<Address, Actuator>,
        protocol: Box<dyn Protocol>,
        connection: Box<dyn Connection>,
    ) -> Self {
        let name_to_address = actuators
            .iter()
            .map(|(address, actuator)| (actuator.name.clone(), *address))
            .collect();
        Self {
            name: name.to_string(),
            address_to_actuator: actuators,
            name_to_address,
            protocol,
            connection,
            query_battery_on_connect: false,
            battery: Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    /// Send a battery query right after connecting
    pub fn with_battery_query(mut self, enabled: bool) -> Self {
        self.query_battery_on_connect = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actuators ordered by address
    pub fn actuators(&self) -> impl Iterator<Item = (Address, &Actuator)> {
        self.address_to_actuator.iter().map(|(a, act)| (*a, act))
    }

    /// Address of the actuator with this name
    pub fn actuator_address(&self, name: &str) -> Option<Address> {
        self.name_to_address.get(name).copied()
    }

    /// Actuator bound to this address
    pub fn resolve(&self, address: Address) -> Option<&Actuator> {
        self.address_to_actuator.get(&address)
    }

    /// Last battery level reported by the device
    pub fn battery(&self) -> Option<u16> {
        *self.battery.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Open the transport and start decoding what the device sends back
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        self.connection.connect(tx).await?;

        let controller = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match controller.upgrade() {
                    Some(controller) => controller.handle_incoming(&frame),
                    None => break,
                }
            }
        });
        if let Some(old) = self.receiver.lock().replace(task) {
            old.abort();
        }

        log::info!("{}: connected via {}", self.name, self.connection.describe());

        if self.query_battery_on_connect {
            self.query_battery().await?;
        }
        Ok(())
    }

    /// Close the transport
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self.receiver.lock().take() {
            task.abort();
        }
        self.connection.disconnect().await?;
        log::info!("{}: disconnected", self.name);
        Ok(())
    }

    /// Ask the device for its battery level; the reply arrives asynchronously
    pub async fn query_battery(&self) -> Result<()> {
        self.connection.send(&self.protocol.query_battery()).await
    }

    /// Drive the actuator at `address` with an intensity in `[0, 1]`
    ///
    /// The value goes through the actuator's calibration, then the codec,
    /// then the transport.
    pub async fn actuate(&self, address: Address, value: f32) -> Result<()> {
        let actuator = self
            .address_to_actuator
            .get(&address)
            .ok_or_else(|| Error::ChannelNotFound {
                controller: self.name.clone(),
                address,
            })?;
        let mapped = actuator.map(value);
        let data = self.protocol.actuation(address, mapped);
        log::trace!(
            "{}: {} ({}) <- {:.3} -> {:.4} {:02X?}",
            self.name,
            actuator.name,
            address,
            value,
            mapped,
            data
        );
        self.connection.send(&data).await
    }

    /// Decode one inbound payload
    pub(crate) fn handle_incoming(&self, data: &[u8]) {
        match self.protocol.parse_incoming(data) {
            Ok(Incoming::BatteryValue(value)) => {
                log::info!("{}: battery {}", self.name, value);
                *self.battery.lock() = Some(value);
            }
            Err(e) => {
                log::warn!("{}: dropping inbound {:02X?}: {}", self.name, data, e);
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("actuators", &self.address_to_actuator)
            .finish_non_exhaustive()
    }
}
