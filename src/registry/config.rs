//! Registry configuration

use crate::protocol::constants::{DEFAULT_GC_THRESHOLD, DEFAULT_MAX_BACKLOG, DEFAULT_PRODUCT};

/// Limits and naming shared by every channel in a registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Reclaimable messages needed before garbage collection runs
    pub gc_threshold: usize,

    /// Undelivered bytes after which a connection is dropped (0 = unlimited)
    pub max_backlog: usize,

    /// Product name announced in greetings
    pub product: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            max_backlog: DEFAULT_MAX_BACKLOG,
            product: DEFAULT_PRODUCT.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Set the garbage collection threshold (at least 1)
    pub fn gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold.max(1);
        self
    }

    /// Set the per-connection backlog limit in bytes
    pub fn max_backlog(mut self, bytes: usize) -> Self {
        self.max_backlog = bytes;
        self
    }

    /// Disable the backlog limit
    pub fn unlimited_backlog(mut self) -> Self {
        self.max_backlog = 0;
        self
    }

    /// Set the product name used in greetings
    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.gc_threshold, 10);
        assert_eq!(config.max_backlog, 4 * 1024 * 1024);
        assert_eq!(config.product, "Chatter");
    }

    #[test]
    fn test_gc_threshold_floor() {
        let config = RegistryConfig::default().gc_threshold(0);

        assert_eq!(config.gc_threshold, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .gc_threshold(32)
            .unlimited_backlog()
            .product("Click");

        assert_eq!(config.gc_threshold, 32);
        assert_eq!(config.max_backlog, 0);
        assert_eq!(config.product, "Click");
    }
}
