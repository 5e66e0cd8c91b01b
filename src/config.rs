//! Configuration for the Lark edge server
//!
//! Loaded from a TOML file; every section has working defaults so a bare
//! `lark` starts with no config at all (model and MCP integrations simply
//! stay disabled).

use std::path::Path;

use serde::Deserialize;

use crate::Result;
use crate::tools::server_mcp::McpServerConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,

    /// Per-session settings
    pub session: SessionConfig,

    /// Language model endpoint
    pub model: ModelConfig,

    /// Tool subsystem settings
    pub tools: ToolsConfig,
}

/// Listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18760,
        }
    }
}

/// Per-session settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Initial system prompt
    pub system_prompt: Option<String>,

    /// Verbatim utterances that end the session
    pub exit_phrases: Vec<String>,

    /// Wake words consumed before intent detection
    pub wake_words: Vec<String>,

    /// Spoken reply when a wake word is matched
    pub wake_greeting: String,

    /// Concurrent blocking tool calls per session
    pub worker_threads: usize,

    /// Capacity of the dispatch job queue
    pub dispatch_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            exit_phrases: vec!["goodbye".to_string(), "exit".to_string()],
            wake_words: Vec::new(),
            wake_greeting: "I'm here.".to_string(),
            worker_threads: 4,
            dispatch_queue: 16,
        }
    }
}

/// Language model endpoint (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API base URL; empty disables the model entirely
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Whether utterances go through intent analysis before chat
    pub intent_analysis: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            intent_analysis: true,
        }
    }
}

impl ModelConfig {
    /// Whether a usable endpoint is configured
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

/// Tool subsystem settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Remote MCP endpoint URL; empty, `null`, or a `your-…` placeholder
    /// means not configured
    pub mcp_endpoint: String,

    /// Local MCP subprocess launch settings
    pub server_mcp: Option<McpServerConfig>,

    /// Per-call timeout for MCP round trips, in seconds
    pub call_timeout_secs: u64,

    /// Static device-integration notes appended to the system prompt
    pub device_prompt: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mcp_endpoint: String::new(),
            server_mcp: None,
            call_timeout_secs: 30,
            device_prompt: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if a given file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
