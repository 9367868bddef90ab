//! Broker service and configuration

pub mod broker;
pub mod config;

pub use broker::Broker;
pub use config::BrokerConfig;
