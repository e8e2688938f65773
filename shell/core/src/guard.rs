//! Sender Guard
//!
//! Decides whether an inbound message came from a surface allowed to drive
//! privileged state. The allow-list is the set of first-party surfaces
//! (main UI, settings, onboarding, announcements) that are still alive, and
//! it is recomputed on every check so a destroyed surface loses trust
//! immediately.
//!
//! Rejections are logged, never reported back to the sender.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::transport::{PeerHandle, PeerId, RequestContext};

/// Named first-party surfaces that may be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirstPartySurface {
    /// Main browser UI
    Main,
    /// Settings window
    Settings,
    /// Setup / onboarding window
    Setup,
    /// Announcements window
    Announcements,
}

impl FirstPartySurface {
    /// Every first-party slot
    pub const ALL: [Self; 4] = [Self::Main, Self::Settings, Self::Setup, Self::Announcements];

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Settings => "settings",
            Self::Setup => "setup",
            Self::Announcements => "announcements",
        }
    }
}

impl fmt::Display for FirstPartySurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the current trusted sender ids
pub trait TrustedSurfaces: Send + Sync {
    /// Ids of the surfaces trusted right now
    fn trusted_surface_ids(&self) -> HashSet<PeerId>;
}

/// First-party surfaces known to the host windowing layer
#[derive(Debug, Default)]
pub struct FirstPartySurfaces {
    slots: RwLock<HashMap<FirstPartySurface, PeerHandle>>,
}

impl FirstPartySurfaces {
    /// No surfaces registered yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill a slot, returning the surface it replaced
    pub fn register(&self, kind: FirstPartySurface, handle: PeerHandle) -> Option<PeerHandle> {
        debug!(surface = %kind, peer = %handle.id(), "First-party surface registered");
        self.slots.write().insert(kind, handle)
    }

    /// Clear a slot
    pub fn unregister(&self, kind: FirstPartySurface) -> Option<PeerHandle> {
        self.slots.write().remove(&kind)
    }

    /// Surface currently in a slot
    #[must_use]
    pub fn get(&self, kind: FirstPartySurface) -> Option<PeerHandle> {
        self.slots.read().get(&kind).cloned()
    }

    /// Slot holding `id`, if any
    #[must_use]
    pub fn kind_of(&self, id: PeerId) -> Option<FirstPartySurface> {
        self.slots
            .read()
            .iter()
            .find(|(_, handle)| handle.id() == id)
            .map(|(kind, _)| *kind)
    }
}

impl TrustedSurfaces for FirstPartySurfaces {
    fn trusted_surface_ids(&self) -> HashSet<PeerId> {
        let slots = self.slots.read();
        let main_alive = slots
            .get(&FirstPartySurface::Main)
            .is_some_and(|handle| !handle.is_destroyed());
        if !main_alive {
            warn!("Main window not found");
        }

        slots
            .values()
            .filter(|handle| !handle.is_destroyed())
            .map(PeerHandle::id)
            .collect()
    }
}

/// Validates message origins against [`TrustedSurfaces`]
#[derive(Clone)]
pub struct SenderGuard {
    surfaces: Arc<dyn TrustedSurfaces>,
    exemptions: Arc<RwLock<HashSet<String>>>,
}

impl SenderGuard {
    /// Guard backed by `surfaces`
    #[must_use]
    pub fn new(surfaces: Arc<dyn TrustedSurfaces>) -> Self {
        Self {
            surfaces,
            exemptions: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Whether `sender` is currently trusted
    pub fn is_trusted(&self, sender: PeerId) -> bool {
        let trusted = self.surfaces.trusted_surface_ids().contains(&sender);
        if !trusted {
            warn!(sender = %sender, "Invalid sender");
        }
        trusted
    }

    /// Whether a message arriving with `ctx` may proceed
    ///
    /// Exempt channels pass regardless of sender.
    pub fn check(&self, ctx: &RequestContext) -> bool {
        if self.is_exempt(&ctx.channel) {
            debug!(channel = %ctx.channel, sender = %ctx.sender, "Exempt channel");
            return true;
        }
        let trusted = self.surfaces.trusted_surface_ids().contains(&ctx.sender);
        if !trusted {
            warn!(channel = %ctx.channel, sender = %ctx.sender, "Rejected message from untrusted sender");
        }
        trusted
    }

    /// Let any sender use `channel`
    pub fn exempt<P, O>(&self, channel: &Channel<P, O>) {
        debug!(channel = channel.name(), "Channel exempted from sender validation");
        self.exemptions.write().insert(channel.name().to_string());
    }

    /// Whether `channel` is exempt
    #[must_use]
    pub fn is_exempt(&self, channel: &str) -> bool {
        self.exemptions.read().contains(channel)
    }
}

impl fmt::Debug for SenderGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderGuard")
            .field("exemptions", &*self.exemptions.read())
            .finish_non_exhaustive()
    }
}
