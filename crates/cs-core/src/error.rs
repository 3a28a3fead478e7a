//! Core error types for cloudshell

use cs_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the cloudshell ecosystem
#[derive(Error, Debug)]
pub enum CsError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Process error
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Admission error
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionDenied),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a PTY-backed process
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Command or PTY allocation failed
    #[error("Spawn failed: {0}")]
    Spawn(String),

    /// The process has already exited
    #[error("Process is gone")]
    ProcessGone,

    /// The PTY descriptor failed
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport send/receive failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Sending a message failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Receiving a message failed
    #[error("Receive failed: {0}")]
    Receive(String),

    /// The transport was already closed
    #[error("Transport closed")]
    Closed,
}

/// Request rejected by the connection gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Host not allowed: {host}")]
pub struct AdmissionDenied {
    /// The host that failed the allowlist check
    pub host: String,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
