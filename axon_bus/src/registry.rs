//! Driver registry for bus transport drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving bus
//! driver factories. Constructed at startup and passed by value — no
//! global state, testable in isolation.

use std::collections::HashMap;

use axon_common::driver::{BusDriver, DriverFactory};
use axon_common::error::BusError;

use crate::sim::SimBusDriver;

/// Registry of available bus transport drivers.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("sim", || Box::new(SimBusDriver::new()));
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a driver instance by name.
    ///
    /// # Errors
    /// Returns `BusError::DriverNotFound` if no driver with the given
    /// name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn BusDriver>, BusError> {
        let factory = self
            .factories
            .get(name)
            .copied()
            .ok_or_else(|| BusError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered driver names.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
