//! Channel declarations
//!
//! A [`Channel`] is a named, typed wire key. The payload type `P` travels from
//! the caller to the receiver and `O` is the reply type for request/response
//! channels (`()` for notify-only channels). Channels carry no behavior; the
//! transport uses the name as the routing key and serde for the payload.
//!
//! Reverse requests (owner asks controller) reuse the base name with the
//! reserved `:request` / `:response` suffixes.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

use crate::view::{
    ManagerAction, ManagerActionOutput, ViewActionOutput, ViewActionRequest, ViewEventEnvelope,
};

/// Suffix of the frame that carries a reverse request.
pub const REQUEST_SUFFIX: &str = ":request";

/// Suffix of the frame that carries a reverse response.
pub const RESPONSE_SUFFIX: &str = ":response";

/// A named channel with payload type `P` and output type `O`.
pub struct Channel<P, O = ()> {
    name: &'static str,
    _types: PhantomData<fn(P) -> O>,
}

impl<P, O> Channel<P, O> {
    /// Declare a channel. The name is the wire key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _types: PhantomData,
        }
    }

    /// Wire key of this channel
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Name of the frame that carries a reverse request on this channel
    #[must_use]
    pub fn request_name(&self) -> String {
        format!("{}{REQUEST_SUFFIX}", self.name)
    }

    /// Name of the frame that carries a reverse response on this channel
    #[must_use]
    pub fn response_name(&self) -> String {
        format!("{}{RESPONSE_SUFFIX}", self.name)
    }

    fn signature(&self) -> ChannelSignature {
        ChannelSignature {
            payload: type_name::<P>(),
            output: type_name::<O>(),
        }
    }
}

impl<P, O> Clone for Channel<P, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, O> Copy for Channel<P, O> {}

impl<P, O> fmt::Debug for Channel<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("payload", &type_name::<P>())
            .field("output", &type_name::<O>())
            .finish()
    }
}

impl<P, O> fmt::Display for Channel<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Errors raised while declaring channels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A channel with this name was already declared
    #[error("channel '{0}' is already declared")]
    Duplicate(String),

    /// The name collides with the reverse request/response frames
    #[error("channel '{0}' uses a reserved suffix")]
    ReservedSuffix(String),

    /// The name is empty
    #[error("channel name must not be empty")]
    EmptyName,
}

/// Payload/output type names recorded for a declared channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSignature {
    /// Payload type name
    pub payload: &'static str,
    /// Output type name
    pub output: &'static str,
}

/// Catalog of declared channels, keyed by wire name
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<&'static str, ChannelSignature>,
}

impl ChannelRegistry {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a channel. A name may be declared only once.
    pub fn declare<P, O>(&mut self, channel: &Channel<P, O>) -> Result<(), ChannelError> {
        let name = channel.name();
        if name.is_empty() {
            return Err(ChannelError::EmptyName);
        }
        if name.ends_with(REQUEST_SUFFIX) || name.ends_with(RESPONSE_SUFFIX) {
            return Err(ChannelError::ReservedSuffix(name.to_string()));
        }
        if self.channels.contains_key(name) {
            return Err(ChannelError::Duplicate(name.to_string()));
        }
        self.channels.insert(name, channel.signature());
        Ok(())
    }

    /// Signature of a declared channel
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ChannelSignature> {
        self.channels.get(name).copied()
    }

    /// Whether a channel with this name is declared
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Declared channel names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.channels.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of declared channels
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether nothing is declared yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Channels used by the surface registry and its proxies
pub mod channels {
    use super::{
        Channel, ManagerAction, ManagerActionOutput, ViewActionOutput, ViewActionRequest,
        ViewEventEnvelope,
    };

    /// Registry-level actions (create, hide all, show active)
    pub const VIEW_MANAGER_ACTION: Channel<ManagerAction, Option<ManagerActionOutput>> =
        Channel::new("webcontentsview-manager-action");

    /// Per-view actions addressed by view id
    pub const VIEW_ACTION: Channel<ViewActionRequest, Option<ViewActionOutput>> =
        Channel::new("webcontentsview-action");

    /// Native view events relayed to every controller
    pub const VIEW_EVENT: Channel<ViewEventEnvelope> = Channel::new("webcontentsview-event");
}

/// Catalog of every channel the shell declares
pub fn shell_channels() -> Result<ChannelRegistry, ChannelError> {
    let mut registry = ChannelRegistry::new();
    registry.declare(&channels::VIEW_MANAGER_ACTION)?;
    registry.declare(&channels::VIEW_ACTION)?;
    registry.declare(&channels::VIEW_EVENT)?;
    Ok(registry)
}
