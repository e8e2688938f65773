//! Transport errors

use std::time::Duration;

use thiserror::Error;

use super::link::PeerId;
use super::service::Role;

/// Errors surfaced by [`Transport`](super::Transport) operations
///
/// Timeout and peer destruction are distinct variants so callers can tell a
/// slow peer from a dead one.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived within the request window
    #[error("request on '{channel}' to {peer} timed out after {}ms", after.as_millis())]
    Timeout {
        /// Channel the request was sent on
        channel: String,
        /// Target peer
        peer: PeerId,
        /// Window that elapsed
        after: Duration,
    },

    /// The target peer was destroyed before replying
    #[error("{peer} was destroyed while '{channel}' was pending")]
    PeerDestroyed {
        /// Channel the request was sent on
        channel: String,
        /// Destroyed peer
        peer: PeerId,
    },

    /// The remote handler failed and replied with an error message
    #[error("remote error on '{channel}': {message}")]
    Remote {
        /// Channel the request was sent on
        channel: String,
        /// Error message from the remote side
        message: String,
    },

    /// The reply path was dropped without an answer
    #[error("no reply on '{channel}': reply path dropped")]
    NoReply {
        /// Channel the request was sent on
        channel: String,
    },

    /// The operation is not available on this side of the link
    #[error("'{operation}' is not available on the {role} side")]
    WrongRole {
        /// Operation attempted
        operation: &'static str,
        /// Role of the transport it was attempted on
        role: Role,
    },

    /// The peer's inbox is gone
    #[error("inbox of {0} is closed")]
    ChannelClosed(PeerId),

    /// Payload or output failed to (de)serialize
    #[error("serialization error on '{channel}': {source}")]
    Serialization {
        /// Channel being encoded or decoded
        channel: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

impl TransportError {
    /// Whether this error means the peer is gone for good
    #[must_use]
    pub fn is_peer_gone(&self) -> bool {
        matches!(self, Self::PeerDestroyed { .. } | Self::ChannelClosed(_))
    }

    /// Whether this error is a request timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn serialization(channel: &str, source: serde_json::Error) -> Self {
        Self::Serialization {
            channel: channel.to_string(),
            source,
        }
    }
}
