//! Shell wiring
//!
//! One [`Shell`] per host window: the owner transport, the first-party
//! surface slots, the sender guard and the view registry, built explicitly
//! by [`ShellBuilder`] and handed to whoever needs them. Nothing is global.
//!
//! # Example
//!
//! ```ignore
//! let host = HeadlessHost::new();
//! let factory = HeadlessFactory::new(&host);
//! let shell = ShellBuilder::new(ShellConfig::default())
//!     .with_host(host)
//!     .with_factory(factory)
//!     .build()?;
//! shell.start();
//!
//! let main = shell.spawn_controller(Some(FirstPartySurface::Main));
//! let view = main.client().create(CreateOptions::new().activated()).await;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{shell_channels, ChannelError};
use crate::config::{ConfigError, ShellConfig};
use crate::guard::{FirstPartySurface, FirstPartySurfaces, SenderGuard, TrustedSurfaces};
use crate::proxy::ViewManagerClient;
use crate::transport::{Inbox, Peer, PeerHandle, PeerId, PeerLifetime, Transport, TransportError};
use crate::view::{HostEvent, SurfaceFactory, SurfaceHost, ViewRegistry};

/// Peer id of the owner unless overridden
pub const DEFAULT_OWNER_ID: PeerId = PeerId::new(1);

/// Errors raised while building a shell
#[derive(Debug, Error)]
pub enum ShellError {
    /// No host window was given
    #[error("no surface host configured")]
    MissingHost,

    /// No surface factory was given
    #[error("no surface factory configured")]
    MissingFactory,

    /// The channel catalog is inconsistent
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Handlers could not be registered
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Builder for [`Shell`]
pub struct ShellBuilder {
    config: ShellConfig,
    host: Option<Arc<dyn SurfaceHost>>,
    factory: Option<Arc<dyn SurfaceFactory>>,
    owner_id: PeerId,
}

impl ShellBuilder {
    /// Start from a configuration
    #[must_use]
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            host: None,
            factory: None,
            owner_id: DEFAULT_OWNER_ID,
        }
    }

    /// Host window the views are shown in
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn SurfaceHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Factory that builds native surfaces
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn SurfaceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Peer id of the owner side
    #[must_use]
    pub fn with_owner_id(mut self, id: PeerId) -> Self {
        self.owner_id = id;
        self
    }

    /// Wire everything together
    ///
    /// The registry's handlers are registered but nothing runs until
    /// [`Shell::start`].
    pub fn build(self) -> Result<Shell, ShellError> {
        let host = self.host.ok_or(ShellError::MissingHost)?;
        let factory = self.factory.ok_or(ShellError::MissingFactory)?;
        self.config.validate()?;
        let catalog = shell_channels()?;
        debug!(channels = ?catalog.names(), "Channel catalog validated");

        let (owner, inbox, lifetime) = Peer::new(self.owner_id).into_parts();
        let transport = Transport::owner(self.owner_id, self.config.transport.clone());
        let surfaces = Arc::new(FirstPartySurfaces::new());
        let guard = SenderGuard::new(Arc::clone(&surfaces) as Arc<dyn TrustedSurfaces>);
        let registry = ViewRegistry::new(
            host,
            factory,
            Arc::clone(&transport),
            guard.clone(),
            self.config.views.clone(),
        );
        registry.attach()?;

        info!(
            owner = %self.owner_id,
            timeout_ms = self.config.transport.request_timeout_ms,
            "Shell built"
        );
        Ok(Shell {
            next_peer_id: AtomicU32::new(self.owner_id.as_u32().saturating_add(1)),
            config: self.config,
            transport,
            surfaces,
            guard,
            registry,
            owner,
            inbox: Mutex::new(Some(inbox)),
            lifetime,
        })
    }
}

/// Owner side of one host window
pub struct Shell {
    config: ShellConfig,
    transport: Arc<Transport>,
    surfaces: Arc<FirstPartySurfaces>,
    guard: SenderGuard,
    registry: Arc<ViewRegistry>,
    owner: PeerHandle,
    inbox: Mutex<Option<Inbox>>,
    lifetime: PeerLifetime,
    next_peer_id: AtomicU32,
}

impl Shell {
    /// Start the owner's dispatch loop and the view event relay
    ///
    /// Returns the spawned tasks. A second call spawns nothing.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::with_capacity(2);
        if let Some(inbox) = self.inbox.lock().take() {
            tasks.push(self.transport.spawn(inbox));
        }
        if let Some(relay) = self.registry.spawn_event_relay() {
            tasks.push(relay);
        }
        if !tasks.is_empty() {
            info!(owner = %self.owner.id(), "Shell started");
        }
        tasks
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Owner-side transport
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// View registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ViewRegistry> {
        &self.registry
    }

    /// Sender guard shared by every privileged handler
    #[must_use]
    pub fn guard(&self) -> &SenderGuard {
        &self.guard
    }

    /// First-party surface slots
    #[must_use]
    pub fn surfaces(&self) -> &Arc<FirstPartySurfaces> {
        &self.surfaces
    }

    /// Address controllers use to reach the owner
    #[must_use]
    pub fn owner_handle(&self) -> PeerHandle {
        self.owner.clone()
    }

    /// Register a controller that talks to this shell
    ///
    /// Putting it in a first-party slot makes it trusted.
    pub fn connect_controller(&self, kind: Option<FirstPartySurface>, handle: PeerHandle) {
        if let Some(kind) = kind {
            self.surfaces.register(kind, handle.clone());
        }
        self.transport.connect_peer(handle);
    }

    /// Create, connect and start an in-process controller
    pub fn spawn_controller(&self, kind: Option<FirstPartySurface>) -> Controller {
        let id = PeerId::new(self.next_peer_id.fetch_add(1, Ordering::Relaxed));
        let (handle, inbox, lifetime) = Peer::new(id).into_parts();
        let transport = Transport::controller(id, self.owner.clone(), self.config.transport.clone());
        let task = transport.spawn(inbox);
        self.connect_controller(kind, handle.clone());
        debug!(peer = %id, surface = ?kind, "Controller spawned");

        Controller {
            client: ViewManagerClient::new(Arc::clone(&transport)),
            transport,
            handle,
            lifetime,
            task,
        }
    }

    /// Forward a host window event to the registry
    pub fn handle_host_event(&self, event: &HostEvent) {
        self.registry.handle_host_event(event);
    }

    /// Close the window: destroy every view and mark the owner destroyed
    pub fn shutdown(&self) {
        self.registry.handle_host_event(&HostEvent::Closed);
        self.lifetime.destroy();
        info!(owner = %self.owner.id(), "Shell shut down");
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("owner", &self.owner.id())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// An in-process controller connected to a [`Shell`]
///
/// Dropping it destroys the controller peer.
#[derive(Debug)]
pub struct Controller {
    transport: Arc<Transport>,
    client: ViewManagerClient,
    handle: PeerHandle,
    lifetime: PeerLifetime,
    task: JoinHandle<()>,
}

impl Controller {
    /// Peer id
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.handle.id()
    }

    /// Controller-side transport
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Registry client
    #[must_use]
    pub fn client(&self) -> &ViewManagerClient {
        &self.client
    }

    /// Address the owner uses to reach this controller
    #[must_use]
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    /// Mark the controller destroyed, as if its surface went away
    pub fn destroy(&self) {
        self.lifetime.destroy();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.lifetime.destroy();
        self.task.abort();
    }
}
