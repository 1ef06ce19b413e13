#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),

    #[error("Unhandled message type: {0}")]
    UnhandledMessageType(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("No free addresses left in pool")]
    PoolExhausted,

    #[error("Hint {0} is outside the pool or already allocated")]
    HintUnavailable(ipnet::IpNet),

    #[error("Lease store error: {0}")]
    Store(String),

    #[error("Handler error: {0}")]
    Handler(String),

    /// Terminate the current request without sending a reply.
    ///
    /// Handlers return this to discard a request they are not willing to
    /// answer (e.g. a server-identifier mismatch). The dispatcher drops the
    /// request quietly instead of reporting a chain failure.
    #[error("request dropped without a reply")]
    Drop,
}

pub type Result<T> = std::result::Result<T, Error>;
