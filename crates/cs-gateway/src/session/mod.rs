//! Session management

mod bridge;
mod keepalive;
mod registry;

pub use bridge::SessionBridge;
pub use keepalive::Keepalive;
pub use registry::{SessionGuard, SessionHandle, SessionRegistry, SessionSnapshot};
