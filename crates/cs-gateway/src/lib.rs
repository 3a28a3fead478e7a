//! cs-gateway: Browser terminal gateway
//!
//! The gateway accepts WebSocket connections from xterm.js, checks them
//! against the host allowlist, and bridges each one to a shell running on
//! its own pseudo-terminal.

pub mod gate;
pub mod pty;
pub mod server;
pub mod session;
pub mod state;

pub use gate::HostAllowlist;
pub use pty::{NativePty, NativeSpawner};
pub use server::{router, GatewayServer};
pub use session::{SessionBridge, SessionRegistry};
pub use state::GatewayState;
