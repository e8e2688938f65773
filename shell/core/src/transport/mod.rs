//! Transport Layer for Controller-Owner IPC
//!
//! Provides typed messaging between the privileged controller UI and the
//! owner process holding the browsing surfaces:
//! - `notify` / `notify_peer`: one-way messages in either direction
//! - `invoke`: controller asks the owner, answered over the link's reply path
//! - `request_from_peer`: owner asks a controller, matched by correlation id
//!
//! # Design Philosophy
//!
//! Both sides run the same [`Transport`] parameterised by [`Role`]. Peers are
//! connected in-process through tokio channels ([`link`]); every peer carries
//! a "destroyed" signal so waiting callers fail fast instead of timing out.
//!
//! # Security
//!
//! The transport only reports who sent a message. Deciding whether that
//! sender is allowed to act is the [`SenderGuard`](crate::guard::SenderGuard)'s job.

pub mod config;
pub mod envelope;
pub mod error;
pub mod link;
pub mod pending;
pub mod service;

// Re-exports for convenience
pub use config::TransportConfig;
pub use envelope::{CorrelationId, PeerRequest, PeerResponse};
pub use error::TransportError;
pub use link::{Frame, Inbox, InvokeReply, Peer, PeerHandle, PeerId, PeerLifetime};
pub use pending::{PendingRequests, Resolution};
pub use service::{ListenerId, RequestContext, Role, Transport};
