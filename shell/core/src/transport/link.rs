//! In-process link between peers
//!
//! A peer is one side of the transport: the owner holding the surfaces or a
//! controller driving them. Each peer has an inbox of [`Frame`]s and a
//! "destroyed" signal that anyone holding its [`PeerHandle`] can observe.
//!
//! # Usage
//!
//! ```ignore
//! let (handle, inbox, lifetime) = Peer::new(PeerId::new(1)).into_parts();
//!
//! // Give `handle` to whoever needs to talk to this peer,
//! // run a transport over `inbox`, and keep `lifetime` alive
//! // for as long as the peer exists.
//! lifetime.destroy();
//! assert!(handle.is_destroyed());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use super::error::TransportError;

/// Numeric identity of a peer (the web-contents id of the surface behind it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(u32);

impl PeerId {
    /// Wrap a raw id
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Reply to a forward request: the output value or the remote error message
pub type InvokeReply = Result<Value, String>;

/// Unit of delivery between peers
#[derive(Debug)]
pub enum Frame {
    /// One-way message
    Notify {
        /// Wire key
        channel: String,
        /// Origin of the frame
        sender: PeerId,
        /// Serialized payload
        payload: Value,
    },

    /// Controller-to-owner request answered through `reply`
    Invoke {
        /// Wire key
        channel: String,
        /// Origin of the frame
        sender: PeerId,
        /// Serialized payload
        payload: Value,
        /// Reply path
        reply: oneshot::Sender<InvokeReply>,
    },
}

impl Frame {
    /// Wire key of the frame
    #[must_use]
    pub fn channel(&self) -> &str {
        match self {
            Self::Notify { channel, .. } | Self::Invoke { channel, .. } => channel,
        }
    }

    /// Origin of the frame
    #[must_use]
    pub fn sender(&self) -> PeerId {
        match self {
            Self::Notify { sender, .. } | Self::Invoke { sender, .. } => *sender,
        }
    }
}

/// Receiving end of a peer
pub type Inbox = mpsc::UnboundedReceiver<Frame>;

/// Cloneable address of a peer
#[derive(Clone)]
pub struct PeerHandle {
    id: PeerId,
    tx: mpsc::UnboundedSender<Frame>,
    destroyed: watch::Receiver<bool>,
}

impl PeerHandle {
    /// Identity of the peer
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Whether the peer has been destroyed
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    /// Resolves once the peer is destroyed
    pub async fn destroyed(&self) {
        let mut rx = self.destroyed.clone();
        // A dropped sender also means the peer is gone.
        let _ = rx.wait_for(|destroyed| *destroyed).await;
    }

    /// Deliver a frame to the peer's inbox. Never suspends.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::PeerDestroyed {
                channel: frame.channel().to_string(),
                peer: self.id,
            });
        }
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ChannelClosed(self.id))
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

/// Owns the "destroyed" signal of a peer
///
/// Dropping the lifetime destroys the peer.
#[derive(Debug)]
pub struct PeerLifetime {
    id: PeerId,
    destroyed: watch::Sender<bool>,
}

impl PeerLifetime {
    /// Identity of the peer
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Mark the peer destroyed. Idempotent.
    pub fn destroy(&self) {
        let was_destroyed = self.destroyed.send_replace(true);
        if !was_destroyed {
            tracing::debug!(peer = %self.id, "Peer destroyed");
        }
    }

    /// Whether the peer has been destroyed
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }
}

impl Drop for PeerLifetime {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A freshly created peer: its address, its inbox and its lifetime
#[derive(Debug)]
pub struct Peer {
    handle: PeerHandle,
    inbox: Inbox,
    lifetime: PeerLifetime,
}

impl Peer {
    /// Create a peer with the given identity
    #[must_use]
    pub fn new(id: PeerId) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (destroyed_tx, destroyed_rx) = watch::channel(false);

        Self {
            handle: PeerHandle {
                id,
                tx,
                destroyed: destroyed_rx,
            },
            inbox,
            lifetime: PeerLifetime {
                id,
                destroyed: destroyed_tx,
            },
        }
    }

    /// Identity of the peer
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.handle.id
    }

    /// Address of the peer
    #[must_use]
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    /// Split into address, inbox and lifetime
    #[must_use]
    pub fn into_parts(self) -> (PeerHandle, Inbox, PeerLifetime) {
        (self.handle, self.inbox, self.lifetime)
    }
}
