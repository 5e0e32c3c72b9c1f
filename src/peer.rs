//! Transport seam.
//!
//! The agent talks to exactly one peer: a duplex, message-framed channel to
//! the external tool. Wire framing and delivery are the peer's concern; the
//! agent only sees ordered sequences of [`Value`]s and treats any failed
//! send as a dropped message.
//!
//! Implementations are polled from multiple threads and must do their own
//! locking.

use thiserror::Error;

use crate::value::Value;

/// Errors surfaced by [`DebugPeer::put_message`]
#[derive(Debug, Clone, Error)]
pub enum PeerError {
    /// The peer is no longer connected
    #[error("peer disconnected")]
    Disconnected,

    /// The peer's outbound queue is full
    #[error("peer outbound queue is full")]
    QueueFull,

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Framed message channel to the debugger tool.
pub trait DebugPeer: Send + Sync {
    /// Service the underlying transport without blocking.
    fn poll(&self);

    /// Whether an inbound frame is ready to be popped.
    fn has_message(&self) -> bool;

    /// Pop the next inbound frame, if any.
    fn get_message(&self) -> Option<Vec<Value>>;

    /// Queue one outbound frame. An error means the frame was dropped.
    fn put_message(&self, frame: &[Value]) -> Result<(), PeerError>;

    /// Whether the remote side is currently attached.
    fn is_peer_connected(&self) -> bool;

    /// Whether the transport tolerates the agent parking a thread in a
    /// synchronous pump. Pipes polled by the same thread cannot.
    fn can_block(&self) -> bool;
}
