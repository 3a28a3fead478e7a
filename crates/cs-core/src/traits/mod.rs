//! Core trait definitions
//!
//! The bridge only talks to these seams, so tests can drive a session
//! with scripted processes and transports.

mod events;
mod process;
mod transport;

pub use events::{EventSink, SessionEvent, TracingEventSink};
pub use process::{CommandSpec, PtyProcess, Spawner};
pub use transport::{FrameSink, FrameSource};
