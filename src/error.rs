//! Error types for the Lark edge server

use thiserror::Error;

/// Result type alias for Lark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Lark edge server
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session error
    #[error("session error: {0}")]
    Session(String),

    /// Device transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// MCP protocol error
    #[error("mcp error: {0}")]
    Mcp(String),

    /// Language model error
    #[error("model error: {0}")]
    Model(String),

    /// Intent resolution error
    #[error("intent error: {0}")]
    Intent(String),

    /// Worker pool / dispatch bridge error
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
