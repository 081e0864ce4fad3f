//! Telemetry path to actuator routing
//!
//! ```text
//! "/avatar/parameters/haptX-headTop"
//!  \_________ prefix ________/\_____/
//!                              name ──► (controller "headset", address 2)
//! ```

use super::Controller;
use crate::error::{Error, Result};
use crate::protocol::Address;
use std::collections::HashMap;
use std::sync::Arc;

/// Global actuator name registry
#[derive(Debug, Default)]
pub struct Router {
    prefix: String,
    name_to_controller: HashMap<String, Arc<Controller>>,
}

impl Router {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            name_to_controller: HashMap::new(),
        }
    }

    /// Path prefix stripped before name lookup
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register every actuator name of `controller`
    ///
    /// A name already claimed by a different controller is an error and
    /// leaves the registry unchanged. Registering the same controller again
    /// is a no-op.
    pub fn add_controller(&mut self, controller: &Arc<Controller>) -> Result<()> {
        for (_, actuator) in controller.actuators() {
            if let Some(existing) = self.name_to_controller.get(&actuator.name) {
                if !Arc::ptr_eq(existing, controller) {
                    return Err(Error::DuplicateActuator {
                        name: actuator.name.clone(),
                        existing: existing.name().to_string(),
                        controller: controller.name().to_string(),
                    });
                }
            }
        }

        for (_, actuator) in controller.actuators() {
            self.name_to_controller
                .insert(actuator.name.clone(), Arc::clone(controller));
        }
        log::debug!(
            "Router: registered {} actuator(s) of {}",
            controller.actuators().count(),
            controller.name()
        );
        Ok(())
    }

    /// Look up an actuator by name
    pub fn resolve_name(&self, name: &str) -> Option<(Arc<Controller>, Address)> {
        let controller = self.name_to_controller.get(name)?;
        let address = controller.actuator_address(name)?;
        Some((Arc::clone(controller), address))
    }

    /// Look up an actuator by full telemetry path
    ///
    /// Paths outside the prefix resolve to nothing.
    pub fn resolve_path(&self, path: &str) -> Option<(Arc<Controller>, Address)> {
        path.strip_prefix(self.prefix.as_str())
            .and_then(|name| self.resolve_name(name))
    }

    /// Registered actuator names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.name_to_controller.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
