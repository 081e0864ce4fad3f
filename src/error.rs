//! Error types for the haptic bridge

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Haptic bridge error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration names a variant that does not exist
    #[error("Unknown {kind} type: {name}")]
    UnknownType {
        /// Capability being built ("protocol", "connection", ...)
        kind: &'static str,
        /// Name found in the configuration
        name: String,
    },

    /// Same actuator name registered by two controllers
    #[error("Conflict: {name} already registered by {existing} (while adding {controller})")]
    DuplicateActuator {
        /// Actuator name
        name: String,
        /// Controller that already owns the name
        existing: String,
        /// Controller being registered
        controller: String,
    },

    /// Two controllers share one name
    #[error("Duplicate controller name: {0}")]
    DuplicateController(String),

    /// Hostname did not resolve to any address
    #[error("Couldn't resolve hostname: {0}")]
    HostResolution(String),

    /// No attached serial device matched the configured identity
    #[error("Couldn't find serial device {product} {serial_number}")]
    DeviceNotFound {
        /// USB product string
        product: String,
        /// USB serial number
        serial_number: String,
    },

    /// Operation needs a live link
    #[error("Connection not established")]
    NotConnected,

    /// Controller has no actuator at this address
    #[error("Actuator #{address} not found on {controller}")]
    ChannelNotFound {
        /// Controller name
        controller: String,
        /// Protocol address
        address: u8,
    },

    /// Incoming payload had no bytes
    #[error("Empty packet")]
    EmptyPacket,

    /// Incoming payload with an unrecognized tag or shape
    #[error("Unsupported packet: {0:02X?}")]
    UnsupportedPacket(Vec<u8>),

    /// Payload does not fit the 1-byte length prefix
    #[error("Frame too large: {0} bytes (max 255)")]
    FrameTooLarge(usize),

    /// OSC encode/decode failure
    #[error("OSC error: {0}")]
    Osc(String),

    /// mDNS / OSCQuery discovery failure
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<rosc::OscError> for Error {
    fn from(e: rosc::OscError) -> Self {
        Error::Osc(format!("{:?}", e))
    }
}

impl From<mdns_sd::Error> for Error {
    fn from(e: mdns_sd::Error) -> Self {
        Error::Discovery(e.to_string())
    }
}
