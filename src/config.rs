//! Configuration management for Docent
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{DocentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Docent
///
/// Holds the relay server settings, the upstream generator settings, the
/// client-side stream consumer settings, and the thread store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream generator configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Client-side stream consumer configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Thread store and persistence configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the relay binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path to the latest uploaded document text, if any
    ///
    /// Read synchronously before each upstream call to seed the prompt.
    #[serde(default)]
    pub document_path: Option<String>,

    /// Maximum number of document characters folded into the prompt
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_context_char_budget() -> usize {
    100_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            document_path: None,
            context_char_budget: default_context_char_budget(),
        }
    }
}

/// Upstream generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Generator server host
    #[serde(default = "default_upstream_host")]
    pub host: String,

    /// Model to request
    #[serde(default = "default_upstream_model")]
    pub model: String,

    /// Reply language hint folded into the system prompt: "auto", "en", "ar"
    #[serde(default = "default_reply_language")]
    pub reply_language: String,
}

fn default_upstream_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_upstream_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_reply_language() -> String {
    "auto".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            model: default_upstream_model(),
            reply_language: default_reply_language(),
        }
    }
}

/// Client-side stream consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay base URL the chat client talks to
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Deadline for chat sends (seconds); the long bound
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,

    /// Deadline for other operations (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_relay_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_send_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    45
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            send_timeout_seconds: default_send_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Thread store and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the thread snapshot database directory
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Flush interval for the write-coalescing persistence task (milliseconds)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_store_path() -> String {
    ".docent/threads.db".to_string()
}

fn default_flush_interval_ms() -> u64 {
    600
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file with CLI overrides applied
    ///
    /// Missing files are not an error; defaults are used so `docent chat`
    /// works out of the box against a local relay.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed CLI arguments whose options override file values
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>, cli: &crate::cli::Cli) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(DocentError::Io)?;
            serde_yaml::from_str(&raw).map_err(DocentError::Yaml)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Config::default()
        };

        if let Some(store_path) = &cli.store_path {
            config.store.path = store_path.clone();
        }
        if let Some(relay_url) = &cli.relay_url {
            config.client.relay_url = relay_url.clone();
        }

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `DocentError::Config` for values the rest of the system
    /// cannot work with (zero timeouts, empty host, bad language hint).
    pub fn validate(&self) -> Result<()> {
        if self.upstream.host.trim().is_empty() {
            return Err(DocentError::Config("upstream.host must not be empty".to_string()).into());
        }
        if self.client.send_timeout_seconds == 0 || self.client.request_timeout_seconds == 0 {
            return Err(
                DocentError::Config("client timeouts must be greater than zero".to_string()).into(),
            );
        }
        if self.store.flush_interval_ms == 0 {
            return Err(DocentError::Config(
                "store.flush_interval_ms must be greater than zero".to_string(),
            )
            .into());
        }
        match self.upstream.reply_language.as_str() {
            "auto" | "en" | "ar" => {}
            other => {
                return Err(DocentError::Config(format!(
                    "upstream.reply_language must be auto, en, or ar (got {})",
                    other
                ))
                .into());
            }
        }
        Ok(())
    }
}
