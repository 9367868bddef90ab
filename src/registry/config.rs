//! Registry configuration

/// Default outbound queue capacity per session
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Configuration for a session registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum frames pending in a session's outbound queue before the
    /// oldest one is dropped
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Set the outbound queue capacity (at least one frame)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(
            RegistryConfig::default().queue_capacity,
            DEFAULT_QUEUE_CAPACITY
        );
    }

    #[test]
    fn test_queue_capacity_floor() {
        assert_eq!(RegistryConfig::default().queue_capacity(0).queue_capacity, 1);
        assert_eq!(RegistryConfig::default().queue_capacity(8).queue_capacity, 8);
    }
}
