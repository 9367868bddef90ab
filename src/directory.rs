//! Device directory
//!
//! The directory maps devices and applications to the handler that owns them,
//! and can optionally name routers known to reach a device. The production
//! implementation talks to a discovery service; `StaticDirectory` is an
//! in-memory table for embedding and tests.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::RwLock;

use crate::message::{AppEui, DevAddr, HandlerId, RouterId};

/// Error type for directory lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No handler owns this device
    UnknownDevice(DevAddr),
    /// No handler owns this application
    UnknownApplication(AppEui),
    /// The directory could not be reached
    Unavailable(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::UnknownDevice(addr) => write!(f, "Unknown device: {}", addr),
            DirectoryError::UnknownApplication(app) => write!(f, "Unknown application: {}", app),
            DirectoryError::Unavailable(reason) => write!(f, "Directory unavailable: {}", reason),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Resolves devices and applications to their owners
pub trait DeviceDirectory: Send + Sync + 'static {
    /// Handler owning an activated device
    fn resolve_handler(
        &self,
        dev_addr: DevAddr,
    ) -> impl Future<Output = Result<HandlerId, DirectoryError>> + Send;

    /// Handler owning an application, used for join requests
    fn resolve_app_handler(
        &self,
        app_eui: AppEui,
    ) -> impl Future<Output = Result<HandlerId, DirectoryError>> + Send;

    /// Routers statically known to reach a device
    ///
    /// Consulted only when no router has been learned from uplink traffic.
    fn resolve_routers(&self, dev_addr: DevAddr) -> impl Future<Output = Vec<RouterId>> + Send {
        let _ = dev_addr;
        async { Vec::new() }
    }
}

/// In-memory directory
#[derive(Debug, Default)]
pub struct StaticDirectory {
    devices: RwLock<HashMap<DevAddr, HandlerId>>,
    applications: RwLock<HashMap<AppEui, HandlerId>>,
    routers: RwLock<HashMap<DevAddr, Vec<RouterId>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a device to a handler
    pub fn insert_device(&self, dev_addr: DevAddr, handler: HandlerId) {
        self.devices.write().insert(dev_addr, handler);
    }

    /// Remove a device assignment
    pub fn remove_device(&self, dev_addr: DevAddr) -> Option<HandlerId> {
        self.devices.write().remove(&dev_addr)
    }

    /// Assign an application to a handler
    pub fn insert_application(&self, app_eui: AppEui, handler: HandlerId) {
        self.applications.write().insert(app_eui, handler);
    }

    /// Set the routers known to reach a device
    pub fn set_routers(&self, dev_addr: DevAddr, routers: Vec<RouterId>) {
        self.routers.write().insert(dev_addr, routers);
    }

    /// Builder form of `insert_device`
    pub fn with_device(self, dev_addr: DevAddr, handler: impl Into<HandlerId>) -> Self {
        self.insert_device(dev_addr, handler.into());
        self
    }

    /// Builder form of `insert_application`
    pub fn with_application(self, app_eui: AppEui, handler: impl Into<HandlerId>) -> Self {
        self.insert_application(app_eui, handler.into());
        self
    }
}

impl DeviceDirectory for StaticDirectory {
    async fn resolve_handler(&self, dev_addr: DevAddr) -> Result<HandlerId, DirectoryError> {
        self.devices
            .read()
            .get(&dev_addr)
            .cloned()
            .ok_or(DirectoryError::UnknownDevice(dev_addr))
    }

    async fn resolve_app_handler(&self, app_eui: AppEui) -> Result<HandlerId, DirectoryError> {
        self.applications
            .read()
            .get(&app_eui)
            .cloned()
            .ok_or(DirectoryError::UnknownApplication(app_eui))
    }

    async fn resolve_routers(&self, dev_addr: DevAddr) -> Vec<RouterId> {
        self.routers
            .read()
            .get(&dev_addr)
            .cloned()
            .unwrap_or_default()
    }
}
