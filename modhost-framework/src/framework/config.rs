//! Framework-wide configuration, built fluently and validated once.

use crate::properties::Properties;

use super::errors::FrameworkError;

/// Configuration the framework core is created with. Properties not
/// recognised here are still retained and exposed through
/// `BundleContext::get_property`, matching OSGi-style "configuration
/// is just properties" semantics.
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    pub event_dispatcher_queue_capacity: usize,
    pub properties: Properties,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            event_dispatcher_queue_capacity: 256,
            properties: Properties::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameworkConfigBuilder {
    config: FrameworkConfig,
}

impl FrameworkConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_dispatcher_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.event_dispatcher_queue_capacity = capacity;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<crate::properties::PropertyValue>) -> Self {
        self.config.properties.set(key, value);
        self
    }

    pub fn build(self) -> Result<FrameworkConfig, FrameworkError> {
        if self.config.event_dispatcher_queue_capacity == 0 {
            return Err(FrameworkError::illegal_argument(
                "event_dispatcher_queue_capacity must be greater than zero",
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(FrameworkConfigBuilder::new().build().is_ok());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let err = FrameworkConfigBuilder::new()
            .event_dispatcher_queue_capacity(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, FrameworkError::IllegalArgument(_)));
    }

    #[test]
    fn custom_properties_are_retained() {
        let config = FrameworkConfigBuilder::new()
            .property("org.example.key", "value")
            .build()
            .unwrap();
        assert!(config.properties.contains_key("org.example.key"));
    }
}
