//! Device abstraction and registry.
//!
//! Every instrument implements [`Device`]: five command handlers plus a static
//! [`CommandTable`] describing their arguments. Handlers receive arguments that
//! already passed validation against that table (see [`crate::dispatch`]).
//!
//! Devices are created by name through a [`DeviceRegistry`]:
//!
//! ```rust
//! use rust_opi::instrument::{mock::MockInstrument, DeviceRegistry};
//!
//! let mut registry = DeviceRegistry::new();
//! registry.register("mock", |_name| Box::new(MockInstrument::new()));
//! assert!(registry.create("mock").is_some());
//! assert_eq!(registry.list(), vec!["mock".to_string()]);
//! ```

pub mod display;
pub mod mock;
pub mod relay;

use crate::error::OpiResult;
use crate::parameter::CommandTable;
use crate::protocol::{Args, Packet};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One physical or simulated instrument.
#[async_trait]
pub trait Device: Send {
    /// Registered machine name.
    fn name(&self) -> &str;

    /// Argument schemas of the five commands.
    fn commands(&self) -> &'static CommandTable;

    /// Whether INITIALIZE has succeeded and CLOSE has not yet run.
    fn is_initialized(&self) -> bool;

    /// Describe the device and its state.
    async fn query(&mut self) -> OpiResult<Packet>;

    /// Open the device.
    async fn initialize(&mut self, args: &Args) -> OpiResult<Packet>;

    /// Change background and fixation.
    async fn setup(&mut self, args: &Args) -> OpiResult<Packet>;

    /// Present stimuli and report the response.
    async fn present(&mut self, args: &Args) -> OpiResult<Packet>;

    /// Release the device. The reply must carry `close: true`.
    async fn close(&mut self) -> OpiResult<Packet>;

    /// Cancel any wait in progress; called from session teardown.
    fn interrupt(&self) {}
}

type DeviceFactory = Box<dyn Fn(&str) -> Box<dyn Device> + Send + Sync>;

/// Name to constructor map of available devices.
#[derive(Default)]
pub struct DeviceRegistry {
    factories: BTreeMap<String, DeviceFactory>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`, replacing any earlier one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str) -> Box<dyn Device> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build the device registered as `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn Device>> {
        self.factories.get(name).map(|factory| factory(name))
    }

    /// Registered names in alphabetical order.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
