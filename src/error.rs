use thiserror::Error;

/// Main error type for the gateway client
#[derive(Error, Debug)]
pub enum GatewayError {
    /// `connect` was invoked while a connection already exists
    #[error("cannot connect while a connection already exists")]
    AlreadyConnected,

    /// A gateway command was issued before any successful `connect`
    #[error("not connected: you must connect to the gateway before sending commands")]
    NotConnected,

    /// `emit` was called with a command name the gateway does not know
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    /// Outbound command rejected by the rate limiter
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Gateway URL discovery failed or returned a malformed response
    #[error("endpoint discovery failed: {0}")]
    EndpointDiscoveryFailed(String),

    /// Opening the WebSocket connection failed
    #[error("transport open failed: {0}")]
    TransportOpenFailed(String),

    /// Reading from the WebSocket failed
    #[error("transport read failed: {0}")]
    TransportReadFailed(String),

    /// Writing to the WebSocket failed
    #[error("transport write failed: {0}")]
    TransportWriteFailed(String),

    /// Closing the WebSocket failed
    #[error("transport close failed: {0}")]
    TransportCloseFailed(String),

    /// Malformed inbound frame; logged and skipped, never fatal
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// Serializing an outbound payload failed
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    /// Reconnect attempts were exhausted; terminal for the session
    #[error("too many reconnect attempts")]
    TooManyReconnectAttempts,

    /// No heartbeat round-trip has been measured yet
    #[error("heartbeat latency not determined yet")]
    LatencyUnknown,

    /// An internal channel send failed
    #[error("channel send error: {0}")]
    ChannelSend(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
