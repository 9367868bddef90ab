//! Statistics and metrics for the broker

pub mod metrics;

pub use metrics::{BrokerMetrics, BrokerStats};
