//! Boundary traits and helpers shared with external collaborators.

pub mod transport;

pub use transport::{ScriptedReply, ScriptedTransport, Transport};
