//! Correlation-id bookkeeping for reverse requests
//!
//! Each outstanding request owns one entry, keyed by a monotonically
//! increasing id. An entry leaves the map exactly once: when its response
//! arrives, or when the waiting caller gives up (timeout, peer destroyed,
//! cancellation) and its [`PendingGuard`] drops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::oneshot;

use super::envelope::{CorrelationId, PeerResponse};
use super::link::{InvokeReply, PeerId};

/// One outstanding request
#[derive(Debug)]
struct PendingRequest {
    channel: String,
    peer: PeerId,
    created_at: Instant,
    reply: oneshot::Sender<InvokeReply>,
}

/// Outcome of delivering a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The waiting caller received the reply
    Delivered,
    /// No entry with this id (late, duplicate or never issued)
    Unknown,
    /// The entry belongs to a different peer; left untouched
    ForeignPeer,
}

/// Outstanding requests of one transport
#[derive(Debug)]
pub struct PendingRequests {
    next_id: AtomicU64,
    entries: DashMap<CorrelationId, PendingRequest>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    /// Empty map; ids start at 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Allocate the next correlation id. Ids are never reused.
    pub fn next_id(&self) -> CorrelationId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an entry and return the receiver its reply will arrive on
    pub fn register(
        &self,
        id: CorrelationId,
        channel: &str,
        peer: PeerId,
    ) -> oneshot::Receiver<InvokeReply> {
        let (reply, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingRequest {
                channel: channel.to_string(),
                peer,
                created_at: Instant::now(),
                reply,
            },
        );
        rx
    }

    /// Guard that removes the entry when dropped
    #[must_use]
    pub fn guard(&self, id: CorrelationId) -> PendingGuard<'_> {
        PendingGuard { pending: self, id }
    }

    /// Deliver a response that arrived from `from`
    pub fn resolve(&self, from: PeerId, response: PeerResponse) -> Resolution {
        let id = response.id;
        let Some((_, entry)) = self.entries.remove_if(&id, |_, entry| entry.peer == from) else {
            return if self.entries.contains_key(&id) {
                Resolution::ForeignPeer
            } else {
                Resolution::Unknown
            };
        };

        tracing::debug!(
            id,
            channel = %entry.channel,
            peer = %entry.peer,
            elapsed_ms = u64::try_from(entry.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Reverse request resolved"
        );
        // The caller may have stopped waiting between removal and send.
        let _ = entry.reply.send(response.into_reply());
        Resolution::Delivered
    }

    /// Drop an entry. Returns false if it was already gone.
    pub fn remove(&self, id: CorrelationId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Whether an entry is outstanding
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of outstanding entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes a pending entry on drop
#[derive(Debug)]
pub struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: CorrelationId,
}

impl PendingGuard<'_> {
    /// Correlation id this guard covers
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
