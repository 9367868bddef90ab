//! Broker configuration

use std::time::Duration;

use crate::activation::{DEFAULT_ACTIVATION_RETENTION, DEFAULT_ACTIVATION_TIMEOUT};
use crate::dedup::DEFAULT_DEDUP_WINDOW;
use crate::registry::RegistryConfig;
use crate::routing::DEFAULT_AFFINITY_FRESHNESS;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Session registry configuration (outbound queue capacity)
    pub registry: RegistryConfig,

    /// How long duplicate receptions of one uplink are collected
    pub dedup_window: Duration,

    /// How long an uplink reception keeps its router a downlink candidate
    pub affinity_freshness: Duration,

    /// Deadline for the handler's answer to a join request
    pub activation_timeout: Duration,

    /// How long a finished activation answers duplicates from cache
    pub activation_retention: Duration,

    /// Housekeeping interval
    pub cleanup_interval: Duration,

    /// Require publishers to own the device they send downlinks to
    pub verify_downlink_owner: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            affinity_freshness: DEFAULT_AFFINITY_FRESHNESS,
            activation_timeout: DEFAULT_ACTIVATION_TIMEOUT,
            activation_retention: DEFAULT_ACTIVATION_RETENTION,
            cleanup_interval: Duration::from_secs(30),
            verify_downlink_owner: true,
        }
    }
}

impl BrokerConfig {
    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Set the outbound queue capacity of every session
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.registry = self.registry.queue_capacity(capacity);
        self
    }

    /// Set the deduplication window
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Set the affinity freshness
    pub fn affinity_freshness(mut self, freshness: Duration) -> Self {
        self.affinity_freshness = freshness;
        self
    }

    /// Set the activation timeout
    pub fn activation_timeout(mut self, timeout: Duration) -> Self {
        self.activation_timeout = timeout;
        self
    }

    /// Set the activation retention window
    pub fn activation_retention(mut self, retention: Duration) -> Self {
        self.activation_retention = retention;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Let any handler publish downlinks for any device
    pub fn skip_downlink_owner_check(mut self) -> Self {
        self.verify_downlink_owner = false;
        self
    }
}
