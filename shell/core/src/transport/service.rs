//! Role-parameterised message transport
//!
//! One [`Transport`] runs on each side of a link. The owner side holds the
//! real surfaces and answers `invoke`s; the controller side drives them and
//! answers the owner's reverse requests. Both sides use the same dispatch
//! loop and the same reply-waiting logic, so a request in either direction
//! ends in exactly one of: reply, remote error, timeout, peer destroyed.
//!
//! ```text
//!   controller                                   owner
//!   ----------                                   -----
//!   notify(ch, p)        -- Notify ch -------->  on(ch)
//!   invoke(ch, p)        -- Invoke ch, reply ->  handle(ch)
//!   on(ch)               <- Notify ch ---------  notify_peer(ch, peer, p)
//!   handle_peer_request  <- Notify ch:request -  request_from_peer(ch, peer, p)
//!                        -- Notify ch:response ->  (pending map, by id)
//! ```

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::TransportConfig;
use super::envelope::{PeerRequest, PeerResponse};
use super::error::TransportError;
use super::link::{Frame, Inbox, InvokeReply, PeerHandle, PeerId};
use super::pending::{PendingRequests, Resolution};
use crate::channel::{Channel, REQUEST_SUFFIX, RESPONSE_SUFFIX};

/// Which side of the link a transport runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Privileged UI that drives surfaces
    Controller,
    /// Process holding the real surfaces
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => f.write_str("controller"),
            Self::Owner => f.write_str("owner"),
        }
    }
}

/// Where an inbound message came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Wire key the message arrived on
    pub channel: String,
    /// Origin of the message
    pub sender: PeerId,
}

/// Subscription handle returned by [`Transport::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;
type ErasedHandler = Arc<dyn Fn(RequestContext, Value) -> HandlerFuture + Send + Sync>;
type ErasedListener = Arc<dyn Fn(&RequestContext, &Value) + Send + Sync>;

/// Typed message transport for one side of a link
pub struct Transport {
    role: Role,
    local: PeerId,
    /// Owner's address (controller side only)
    owner: Option<PeerHandle>,
    config: TransportConfig,
    /// Controllers connected to this owner
    peers: DashMap<PeerId, PeerHandle>,
    /// Owner-side handlers for `invoke`
    handlers: DashMap<String, ErasedHandler>,
    /// Controller-side handlers for reverse requests
    peer_handlers: DashMap<String, ErasedHandler>,
    listeners: DashMap<String, Vec<(ListenerId, ErasedListener)>>,
    pending: PendingRequests,
    next_listener_id: AtomicU64,
}

impl Transport {
    /// Owner-side transport
    #[must_use]
    pub fn owner(local: PeerId, config: TransportConfig) -> Arc<Self> {
        Arc::new(Self::new(Role::Owner, local, None, config))
    }

    /// Controller-side transport talking to `owner`
    #[must_use]
    pub fn controller(local: PeerId, owner: PeerHandle, config: TransportConfig) -> Arc<Self> {
        Arc::new(Self::new(Role::Controller, local, Some(owner), config))
    }

    fn new(role: Role, local: PeerId, owner: Option<PeerHandle>, config: TransportConfig) -> Self {
        Self {
            role,
            local,
            owner,
            config,
            peers: DashMap::new(),
            handlers: DashMap::new(),
            peer_handlers: DashMap::new(),
            listeners: DashMap::new(),
            pending: PendingRequests::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Side of the link
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Identity of the local peer
    #[must_use]
    pub fn local_id(&self) -> PeerId {
        self.local
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Number of reverse requests still waiting for a response
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // ========================================================================
    // Peers (owner side)
    // ========================================================================

    /// Register a controller so it receives [`notify_all`](Self::notify_all)
    pub fn connect_peer(&self, peer: PeerHandle) {
        info!(peer = %peer.id(), local = %self.local, "Peer connected");
        self.peers.insert(peer.id(), peer);
    }

    /// Forget a controller. Returns false if it was not connected.
    pub fn disconnect_peer(&self, id: PeerId) -> bool {
        let removed = self.peers.remove(&id).is_some();
        if removed {
            info!(peer = %id, local = %self.local, "Peer disconnected");
        }
        removed
    }

    /// Address of a connected controller
    #[must_use]
    pub fn peer(&self, id: PeerId) -> Option<PeerHandle> {
        self.peers.get(&id).map(|entry| entry.value().clone())
    }

    /// Live connected controllers, sorted by id. Destroyed peers are pruned.
    pub fn connected_peers(&self) -> Vec<PeerHandle> {
        self.peers.retain(|id, peer| {
            let alive = !peer.is_destroyed();
            if !alive {
                debug!(peer = %id, "Pruning destroyed peer");
            }
            alive
        });
        let mut peers: Vec<_> = self.peers.iter().map(|e| e.value().clone()).collect();
        peers.sort_by_key(PeerHandle::id);
        peers
    }

    // ========================================================================
    // One-way messages
    // ========================================================================

    /// Controller to owner, one-way. A gone owner is logged, not surfaced.
    pub fn notify<P: Serialize>(
        &self,
        channel: &Channel<P>,
        payload: &P,
    ) -> Result<(), TransportError> {
        let Some(owner) = self.owner.as_ref() else {
            return Err(self.wrong_role("notify"));
        };
        let payload = encode(channel.name(), payload)?;
        self.deliver(owner, channel.name().to_string(), payload);
        Ok(())
    }

    /// Owner to one controller, one-way. A gone peer is logged, not surfaced.
    pub fn notify_peer<P: Serialize>(
        &self,
        channel: &Channel<P>,
        peer: &PeerHandle,
        payload: &P,
    ) -> Result<(), TransportError> {
        if self.role != Role::Owner {
            return Err(self.wrong_role("notify_peer"));
        }
        let payload = encode(channel.name(), payload)?;
        self.deliver(peer, channel.name().to_string(), payload);
        Ok(())
    }

    /// Owner to every connected controller. Returns how many were reached.
    pub fn notify_all<P: Serialize>(
        &self,
        channel: &Channel<P>,
        payload: &P,
    ) -> Result<usize, TransportError> {
        if self.role != Role::Owner {
            return Err(self.wrong_role("notify_all"));
        }
        let payload = encode(channel.name(), payload)?;
        let delivered = self
            .connected_peers()
            .iter()
            .filter(|peer| self.deliver(peer, channel.name().to_string(), payload.clone()))
            .count();
        Ok(delivered)
    }

    fn deliver(&self, peer: &PeerHandle, channel: String, payload: Value) -> bool {
        match peer.send(Frame::Notify {
            channel,
            sender: self.local,
            payload,
        }) {
            Ok(()) => true,
            Err(e) => {
                debug!(peer = %peer.id(), error = %e, "Notification dropped");
                false
            }
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Controller to owner request, answered by the owner's [`handle`](Self::handle)
    pub async fn invoke<P, O>(&self, channel: &Channel<P, O>, payload: &P) -> Result<O, TransportError>
    where
        P: Serialize,
        O: DeserializeOwned,
    {
        self.invoke_with_timeout(channel, payload, self.config.request_timeout())
            .await
    }

    /// [`invoke`](Self::invoke) with an explicit window
    pub async fn invoke_with_timeout<P, O>(
        &self,
        channel: &Channel<P, O>,
        payload: &P,
        window: Duration,
    ) -> Result<O, TransportError>
    where
        P: Serialize,
        O: DeserializeOwned,
    {
        let Some(owner) = self.owner.as_ref() else {
            return Err(self.wrong_role("invoke"));
        };
        let name = channel.name();
        let payload = encode(name, payload)?;
        let (reply, rx) = oneshot::channel();

        owner.send(Frame::Invoke {
            channel: name.to_string(),
            sender: self.local,
            payload,
            reply,
        })?;
        debug!(channel = name, owner = %owner.id(), "Invoke sent");

        let value = await_reply(name, owner, rx, window).await?;
        decode(name, value)
    }

    /// Owner to controller request, answered by the controller's
    /// [`handle_peer_request`](Self::handle_peer_request)
    pub async fn request_from_peer<P, O>(
        &self,
        channel: &Channel<P, O>,
        peer: &PeerHandle,
        payload: &P,
    ) -> Result<O, TransportError>
    where
        P: Serialize,
        O: DeserializeOwned,
    {
        self.request_from_peer_with_timeout(channel, peer, payload, self.config.request_timeout())
            .await
    }

    /// [`request_from_peer`](Self::request_from_peer) with an explicit window
    pub async fn request_from_peer_with_timeout<P, O>(
        &self,
        channel: &Channel<P, O>,
        peer: &PeerHandle,
        payload: &P,
        window: Duration,
    ) -> Result<O, TransportError>
    where
        P: Serialize,
        O: DeserializeOwned,
    {
        if self.role != Role::Owner {
            return Err(self.wrong_role("request_from_peer"));
        }
        let name = channel.name();
        if peer.is_destroyed() {
            warn!(channel = name, peer = %peer.id(), "Request to destroyed peer rejected");
            return Err(TransportError::PeerDestroyed {
                channel: name.to_string(),
                peer: peer.id(),
            });
        }
        let payload = encode(name, payload)?;

        let id = self.pending.next_id();
        let rx = self.pending.register(id, name, peer.id());
        let _guard = self.pending.guard(id);

        let request = encode(name, &PeerRequest { id, payload })?;
        peer.send(Frame::Notify {
            channel: channel.request_name(),
            sender: self.local,
            payload: request,
        })?;
        debug!(id, channel = name, peer = %peer.id(), "Reverse request sent");

        let value = await_reply(name, peer, rx, window).await?;
        decode(name, value)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Owner-side handler for `invoke` on `channel`
    ///
    /// Handler errors and panics become error replies. Registering again
    /// replaces the previous handler.
    pub fn handle<P, O, F, Fut>(&self, channel: &Channel<P, O>, handler: F) -> Result<(), TransportError>
    where
        P: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        if self.role != Role::Owner {
            return Err(self.wrong_role("handle"));
        }
        register_handler(&self.handlers, channel.name(), erase_handler(handler));
        Ok(())
    }

    /// Controller-side handler for reverse requests on `channel`
    pub fn handle_peer_request<P, O, F, Fut>(
        &self,
        channel: &Channel<P, O>,
        handler: F,
    ) -> Result<(), TransportError>
    where
        P: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        if self.role != Role::Controller {
            return Err(self.wrong_role("handle_peer_request"));
        }
        register_handler(&self.peer_handlers, channel.name(), erase_handler(handler));
        Ok(())
    }

    /// Drop the handler registered for `channel`, if any
    pub fn remove_handler<P, O>(&self, channel: &Channel<P, O>) -> bool {
        let removed = self.handlers.remove(channel.name()).is_some()
            | self.peer_handlers.remove(channel.name()).is_some();
        if removed {
            debug!(channel = channel.name(), "Handler removed");
        }
        removed
    }

    /// Whether a handler is registered for `channel` on this side
    #[must_use]
    pub fn has_handler<P, O>(&self, channel: &Channel<P, O>) -> bool {
        self.handlers.contains_key(channel.name()) || self.peer_handlers.contains_key(channel.name())
    }

    /// Subscribe to notifications on `channel`
    ///
    /// Listeners run inline on the dispatch loop, in registration order.
    /// Payloads that fail to decode are logged and skipped.
    pub fn on<P, F>(&self, channel: &Channel<P>, listener: F) -> ListenerId
    where
        P: DeserializeOwned + 'static,
        F: Fn(&RequestContext, P) + Send + Sync + 'static,
    {
        let erased: ErasedListener = Arc::new(move |ctx: &RequestContext, value: &Value| {
            match P::deserialize(value) {
                Ok(payload) => listener(ctx, payload),
                Err(e) => warn!(
                    channel = %ctx.channel,
                    sender = %ctx.sender,
                    error = %e,
                    "Dropping malformed notification"
                ),
            }
        });
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(channel.name().to_string())
            .or_default()
            .push((id, erased));
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off(&self, listener: ListenerId) -> bool {
        let mut removed = false;
        for mut entry in self.listeners.iter_mut() {
            let before = entry.len();
            entry.retain(|(id, _)| *id != listener);
            removed |= entry.len() != before;
        }
        self.listeners.retain(|_, list| !list.is_empty());
        removed
    }

    /// Number of listeners on `channel`
    #[must_use]
    pub fn listener_count<P, O>(&self, channel: &Channel<P, O>) -> usize {
        self.listeners.get(channel.name()).map_or(0, |list| list.len())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Run the dispatch loop on a background task
    pub fn spawn(self: &Arc<Self>, inbox: Inbox) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(inbox))
    }

    /// Read frames from `inbox` until every sender is gone
    pub async fn run(self: Arc<Self>, mut inbox: Inbox) {
        info!(role = %self.role, local = %self.local, "Transport dispatch started");
        while let Some(frame) = inbox.recv().await {
            self.dispatch(frame);
        }
        info!(role = %self.role, local = %self.local, "Transport dispatch stopped");
    }

    /// Route one inbound frame
    ///
    /// Must be called from within a tokio runtime; handlers run on
    /// spawned tasks.
    pub fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Invoke {
                channel,
                sender,
                payload,
                reply,
            } => self.dispatch_invoke(channel, sender, payload, reply),
            Frame::Notify {
                channel,
                sender,
                payload,
            } => {
                if let Some(base) = channel.strip_suffix(RESPONSE_SUFFIX) {
                    self.accept_response(base, sender, payload);
                } else if let Some(base) = channel.strip_suffix(REQUEST_SUFFIX) {
                    self.answer_peer_request(base, sender, payload);
                } else {
                    self.emit(channel, sender, &payload);
                }
            }
        }
    }

    fn dispatch_invoke(
        &self,
        channel: String,
        sender: PeerId,
        payload: Value,
        reply: oneshot::Sender<InvokeReply>,
    ) {
        let handler = self.handlers.get(&channel).map(|h| Arc::clone(h.value()));
        let Some(handler) = handler else {
            warn!(channel = %channel, sender = %sender, "No handler registered");
            let _ = reply.send(Err(format!("no handler registered for '{channel}'")));
            return;
        };

        debug!(channel = %channel, sender = %sender, "Invoke received");
        let ctx = RequestContext { channel, sender };
        tokio::spawn(async move {
            let result = run_handler(handler, ctx, payload).await;
            // The caller may have timed out already.
            let _ = reply.send(result);
        });
    }

    fn accept_response(&self, base: &str, sender: PeerId, payload: Value) {
        let response: PeerResponse = match serde_json::from_value(payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(channel = base, sender = %sender, error = %e, "Malformed response ignored");
                return;
            }
        };
        let id = response.id;
        match self.pending.resolve(sender, response) {
            Resolution::Delivered => {}
            Resolution::Unknown => {
                debug!(id, channel = base, sender = %sender, "Response for unknown request ignored");
            }
            Resolution::ForeignPeer => {
                warn!(id, channel = base, sender = %sender, "Response from unexpected peer ignored");
            }
        }
    }

    fn answer_peer_request(&self, base: &str, sender: PeerId, payload: Value) {
        let Some(owner) = self.owner.clone() else {
            warn!(channel = base, sender = %sender, "Reverse request received by the owner side");
            return;
        };
        if sender != owner.id() {
            warn!(channel = base, sender = %sender, "Reverse request from unexpected peer ignored");
            return;
        }
        let request: PeerRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(channel = base, error = %e, "Malformed reverse request ignored");
                return;
            }
        };

        let local = self.local;
        let response_channel = format!("{base}{RESPONSE_SUFFIX}");
        let handler = self.peer_handlers.get(base).map(|h| Arc::clone(h.value()));
        let Some(handler) = handler else {
            warn!(channel = base, id = request.id, "No handler registered for reverse request");
            let response =
                PeerResponse::err(request.id, format!("no handler registered for '{base}'"));
            send_response(&owner, local, response_channel, &response);
            return;
        };

        let ctx = RequestContext {
            channel: base.to_string(),
            sender,
        };
        tokio::spawn(async move {
            let response = match run_handler(handler, ctx, request.payload).await {
                Ok(value) => PeerResponse::ok(request.id, value),
                Err(message) => PeerResponse::err(request.id, message),
            };
            send_response(&owner, local, response_channel, &response);
        });
    }

    fn emit(&self, channel: String, sender: PeerId, payload: &Value) {
        let listeners: Vec<ErasedListener> = self
            .listeners
            .get(&channel)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        if listeners.is_empty() {
            debug!(channel = %channel, sender = %sender, "No listeners for notification");
            return;
        }

        let ctx = RequestContext { channel, sender };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&ctx, payload))).is_err() {
                error!(channel = %ctx.channel, "Listener panicked");
            }
        }
    }

    fn wrong_role(&self, operation: &'static str) -> TransportError {
        warn!(operation, role = %self.role, "Operation called on the wrong side");
        TransportError::WrongRole {
            operation,
            role: self.role,
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("role", &self.role)
            .field("local", &self.local)
            .field("handlers", &(self.handlers.len() + self.peer_handlers.len()))
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Wait for a reply, the peer's destruction or the window to elapse
///
/// Destruction is polled first so it wins over a reply or a deadline that
/// becomes ready at the same time.
async fn await_reply(
    channel: &str,
    peer: &PeerHandle,
    reply: oneshot::Receiver<InvokeReply>,
    window: Duration,
) -> Result<Value, TransportError> {
    let outcome = tokio::time::timeout(window, async {
        tokio::select! {
            biased;
            () = peer.destroyed() => Err(TransportError::PeerDestroyed {
                channel: channel.to_string(),
                peer: peer.id(),
            }),
            reply = reply => match reply {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(TransportError::Remote {
                    channel: channel.to_string(),
                    message,
                }),
                Err(_) => Err(TransportError::NoReply {
                    channel: channel.to_string(),
                }),
            },
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(
                channel,
                peer = %peer.id(),
                after_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
                "Request timed out"
            );
            Err(TransportError::Timeout {
                channel: channel.to_string(),
                peer: peer.id(),
                after: window,
            })
        }
    }
}

/// Run a handler on its own task so a panic becomes an error reply
async fn run_handler(handler: ErasedHandler, ctx: RequestContext, payload: Value) -> InvokeReply {
    let channel = ctx.channel.clone();
    match tokio::spawn(async move { handler(ctx, payload).await }).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(channel = %channel, error = %format!("{err:#}"), "Handler failed");
            Err(format!("{err:#}"))
        }
        Err(join_err) if join_err.is_panic() => {
            error!(channel = %channel, "Handler panicked");
            Err(format!("handler for '{channel}' panicked"))
        }
        Err(join_err) => Err(join_err.to_string()),
    }
}

fn send_response(owner: &PeerHandle, local: PeerId, channel: String, response: &PeerResponse) {
    let payload = match serde_json::to_value(response) {
        Ok(payload) => payload,
        Err(e) => {
            error!(channel = %channel, error = %e, "Failed to encode response");
            return;
        }
    };
    if let Err(e) = owner.send(Frame::Notify {
        channel,
        sender: local,
        payload,
    }) {
        debug!(owner = %owner.id(), error = %e, "Response dropped");
    }
}

fn register_handler(map: &DashMap<String, ErasedHandler>, channel: &str, handler: ErasedHandler) {
    if map.insert(channel.to_string(), handler).is_some() {
        warn!(channel, "Handler replaced");
    } else {
        debug!(channel, "Handler registered");
    }
}

fn erase_handler<P, O, F, Fut>(handler: F) -> ErasedHandler
where
    P: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    Arc::new(move |ctx: RequestContext, value: Value| -> HandlerFuture {
        match serde_json::from_value::<P>(value) {
            Ok(payload) => {
                let fut = handler(ctx, payload);
                async move {
                    let output = fut.await?;
                    Ok(serde_json::to_value(output)?)
                }
                .boxed()
            }
            Err(e) => {
                let channel = ctx.channel;
                async move {
                    Err(anyhow::Error::new(e).context(format!("malformed payload on '{channel}'")))
                }
                .boxed()
            }
        }
    })
}

fn encode<T: Serialize + ?Sized>(channel: &str, value: &T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|e| TransportError::serialization(channel, e))
}

fn decode<T: DeserializeOwned>(channel: &str, value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::serialization(channel, e))
}
