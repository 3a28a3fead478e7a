//! cs-core: Core abstractions and configuration for cloudshell
//!
//! This crate provides shared types, traits, and configuration structures
//! used by the gateway.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{AdmissionDenied, ConfigError, CsError, ProcessError, TransportError};
pub use types::{SessionId, SessionState, SessionStatus};
