use thiserror::Error;

/// Configuration errors. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A valid API key must be provided (config file or INTRINIO_API_KEY)")]
    MissingApiKey,
    #[error("Config must specify a valid provider (got: {0})")]
    UnknownProvider(String),
    #[error("Manual provider requires a non-empty IP address")]
    MissingIpAddress,
    #[error("Could not read config file {path}: {message}")]
    Io { path: String, message: String },
    #[error("Could not parse config file: {0}")]
    Parse(String),
}

/// Wire-level framing errors. Logged and dropped at the worker boundary;
/// never propagated past it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),
    #[error("Truncated record: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("Malformed contract id: {0}")]
    MalformedContractId(String),
}

/// Main SDK error type
#[derive(Error, Debug)]
pub enum Error {
    /// Startup configuration failure
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Authorization request failed (HTTP error, non-200 or empty body)
    #[error("Authorization failure: {0}")]
    Auth(String),

    /// Generic HTTP request error
    #[error("Request error: {0}")]
    Request(String),

    /// Non-success HTTP status
    #[error("HTTP error: status code {status}: {message}")]
    Http { status: u16, message: String },

    /// WebSocket dial or protocol error
    #[error("Websocket error: {0}")]
    Websocket(String),

    /// WebSocket send error
    #[error("WS send error: {0}")]
    WsSend(String),

    /// Frame decoding error
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON parse error
    #[error("Json parse error: {0}")]
    JsonParse(String),

    /// Operation attempted on a stopped client
    #[error("Client is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn request(err: impl std::fmt::Display) -> Self {
        Error::Request(err.to_string())
    }

    pub(crate) fn websocket(err: impl std::fmt::Display) -> Self {
        Error::Websocket(err.to_string())
    }
}
