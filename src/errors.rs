use thiserror::Error;

/// Failures reported by the I2C transport underneath everything else
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("address {address:#04x} not acknowledged")]
    AddressNack { address: u8 },

    #[error("bus busy or not ready")]
    Busy,

    #[error("I2C is not supported on this platform")]
    Unsupported,

    #[error("I2C transport failed: {0}")]
    Io(String),
}

impl TransportError {
    /// Classic transport result code, kept for diagnostics output
    pub fn code(&self) -> u8 {
        match self {
            TransportError::AddressNack { .. } => 2,
            TransportError::Busy => 5,
            TransportError::Unsupported | TransportError::Io(_) => 4,
        }
    }
}

/// Multiplexer controller errors. Every variant is a non-fatal "select failed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    #[error("mux channel {0} out of range, must be 7 or less")]
    InvalidChannel(u8),

    #[error("mux transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("mux did not report its channel-enable register")]
    SettingsUnavailable,

    #[error("mux readback mismatch: wrote {wrote:#010b}, read {read:#010b}")]
    VerifyMismatch { wrote: u8, read: u8 },
}

/// Errors raised by the sensor and button drivers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("{device} transport failed: {source}")]
    Transport {
        device: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{device} timed out waiting for {what}")]
    Timeout { device: &'static str, what: &'static str },

    #[error("{device} not detected (version {version:#04x})")]
    NotDetected { device: &'static str, version: u8 },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Top-level errors surfaced by the hub
#[derive(Error, Debug)]
pub enum HubError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("channel {0} out of range, must be 7 or less")]
    InvalidChannel(u8),

    #[error("no sensor on channel {0}")]
    NoSensor(u8),

    #[error("Failed to publish reading: {reason}")]
    PublishError { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type aliases for convenience
pub type DriverResult<T> = Result<T, DriverError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_result_codes() {
        assert_eq!(TransportError::AddressNack { address: 0x49 }.code(), 2);
        assert_eq!(TransportError::Io("short write".to_string()).code(), 4);
        assert_eq!(TransportError::Unsupported.code(), 4);
        assert_eq!(TransportError::Busy.code(), 5);
    }
}
