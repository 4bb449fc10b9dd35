//! Registry configuration

use super::message::PayloadFormat;

/// Default number of pending messages a room queue holds
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default number of records buffered per subscriber ahead of the transport
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Configuration for the room registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each room's pending message queue
    ///
    /// Publishes beyond this are rejected until the broadcast task drains.
    pub queue_capacity: usize,

    /// Outbound buffer per subscriber
    pub subscriber_buffer: usize,

    /// How message payloads are rendered into records
    pub payload_format: PayloadFormat,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            payload_format: PayloadFormat::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the per-room queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-subscriber outbound buffer (at least 1)
    pub fn subscriber_buffer(mut self, size: usize) -> Self {
        self.subscriber_buffer = size.max(1);
        self
    }

    /// Set the payload format
    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.subscriber_buffer, DEFAULT_SUBSCRIBER_BUFFER);
        assert_eq!(config.payload_format, PayloadFormat::Structured);
    }

    #[test]
    fn test_builder_queue_capacity() {
        let config = RegistryConfig::default().queue_capacity(8);

        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_builder_zero_sizes_clamped() {
        // A zero-capacity channel cannot be built
        let config = RegistryConfig::default()
            .queue_capacity(0)
            .subscriber_buffer(0);

        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.subscriber_buffer, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .queue_capacity(4)
            .subscriber_buffer(2)
            .payload_format(PayloadFormat::Raw);

        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.subscriber_buffer, 2);
        assert_eq!(config.payload_format, PayloadFormat::Raw);
    }
}
