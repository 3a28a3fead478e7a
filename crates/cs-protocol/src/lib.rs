//! cs-protocol: Wire protocol for cloudshell
//!
//! This crate defines the binary frames exchanged between the browser
//! terminal and the gateway over the upgraded connection.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE};
pub use message::{Frame, FrameKind, TerminalSize};
