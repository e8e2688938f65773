//! Surface Registry
//!
//! Owns every live view of one host window: its native surface, whether it
//! sits in the host's child list, and which plain view and which overlay are
//! active. Controllers drive it over two request channels, and it relays
//! native events back to them over one notification channel.
//!
//! # Architecture
//!
//! ```text
//!   controller ──invoke──► Transport ──► SenderGuard ──► ViewRegistry
//!                                                         │  Mutex<RegistryState>
//!                                                         │  views / active pointers
//!                                                         ▼
//!                                              SurfaceHost + NativeSurface
//!                                                         │ listeners enqueue
//!   controller ◄──notify_all── relay ◄── RegistrySignal ◄─┘
//! ```
//!
//! # Locking
//!
//! The state mutex is never held while a native surface method runs that
//! could fire listeners. Listeners only enqueue a [`RegistrySignal`]; the
//! relay drains the queue and may call back into the registry freely.
//!
//! The visual stacking order has exactly one primitive: remove a surface
//! from the host's child list and add it back, which puts it on top.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::{ViewEvent, ViewEventEnvelope, ViewEventKind};
use super::native::{HostEvent, ListenerHandle, NativeSurface, SurfaceFactory, SurfaceHost, SurfaceSpec};
use super::types::{
    CreateOptions, CreatedView, ManagerAction, ManagerActionOutput, NavigationHistory, ViewAction,
    ViewActionOutput, ViewActionRequest, ViewId, ViewLifecycle, ViewSnapshot,
};
use crate::channel::channels;
use crate::config::ViewSettings;
use crate::guard::SenderGuard;
use crate::transport::{RequestContext, Transport, TransportError};

const EVENT_CAPACITY: usize = 64;

/// Registry lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A view was inserted
    Created(ViewId),
    /// A view was removed
    Destroyed(ViewId),
}

/// Work queued by native listeners for the relay
#[derive(Debug, Clone)]
pub enum RegistrySignal {
    /// A surface raised an event
    View {
        /// View the surface belongs to
        id: ViewId,
        /// Native id, so a stale signal never hits a reused view id
        web_contents_id: u32,
        /// The event
        event: ViewEvent,
    },
    /// A surface was torn down outside the registry
    SurfaceDestroyed {
        /// View the surface belongs to
        id: ViewId,
        /// Native id of the surface
        web_contents_id: u32,
    },
}

struct ViewRecord {
    is_overlay: bool,
    attached: bool,
    ever_attached: bool,
    /// Attached only for an in-flight capture
    capture_attached: bool,
    surface: Arc<dyn NativeSurface>,
    listener_handles: Vec<ListenerHandle>,
}

impl ViewRecord {
    fn lifecycle(&self) -> ViewLifecycle {
        if self.attached {
            ViewLifecycle::Attached
        } else if self.ever_attached {
            ViewLifecycle::Detached
        } else {
            ViewLifecycle::Created
        }
    }

    fn snapshot(&self, id: &ViewId) -> ViewSnapshot {
        ViewSnapshot {
            id: id.clone(),
            web_contents_id: self.surface.web_contents_id(),
            is_overlay: self.is_overlay,
            lifecycle: self.lifecycle(),
            bounds: self.surface.bounds(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    views: HashMap<ViewId, ViewRecord>,
    active_view_id: Option<ViewId>,
    active_overlay_view_id: Option<ViewId>,
}

impl RegistryState {
    fn is_active(&self, id: &ViewId, is_overlay: bool) -> bool {
        let pointer = if is_overlay {
            &self.active_overlay_view_id
        } else {
            &self.active_view_id
        };
        pointer.as_ref() == Some(id)
    }

    fn set_active(&mut self, id: &ViewId, is_overlay: bool) {
        if is_overlay {
            self.active_overlay_view_id = Some(id.clone());
        } else {
            self.active_view_id = Some(id.clone());
        }
    }
}

/// Live views of one host window
pub struct ViewRegistry {
    host: Arc<dyn SurfaceHost>,
    factory: Arc<dyn SurfaceFactory>,
    transport: Arc<Transport>,
    guard: SenderGuard,
    settings: ViewSettings,
    state: Mutex<RegistryState>,
    signals_tx: mpsc::UnboundedSender<RegistrySignal>,
    signals_rx: Mutex<Option<mpsc::UnboundedReceiver<RegistrySignal>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ViewRegistry {
    /// Registry for the window behind `host`
    ///
    /// `transport` must be an owner-side transport. Nothing is registered on
    /// it until [`attach`](Self::attach).
    #[must_use]
    pub fn new(
        host: Arc<dyn SurfaceHost>,
        factory: Arc<dyn SurfaceFactory>,
        transport: Arc<Transport>,
        guard: SenderGuard,
        settings: ViewSettings,
    ) -> Arc<Self> {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            host,
            factory,
            transport,
            guard,
            settings,
            state: Mutex::new(RegistryState::default()),
            signals_tx,
            signals_rx: Mutex::new(Some(signals_rx)),
            events,
        })
    }

    // ========================================================================
    // Transport wiring
    // ========================================================================

    /// Answer the manager and view action channels
    pub fn attach(self: &Arc<Self>) -> Result<(), TransportError> {
        let registry = Arc::downgrade(self);
        self.transport
            .handle(&channels::VIEW_MANAGER_ACTION, move |ctx, action: ManagerAction| {
                let registry = Weak::clone(&registry);
                async move {
                    let Some(registry) = registry.upgrade() else {
                        return Ok(None);
                    };
                    Ok(registry.handle_manager_action(&ctx, action).await)
                }
            })?;

        let registry = Arc::downgrade(self);
        self.transport
            .handle(&channels::VIEW_ACTION, move |ctx, request: ViewActionRequest| {
                let registry = Weak::clone(&registry);
                async move {
                    let Some(registry) = registry.upgrade() else {
                        return Ok(None);
                    };
                    Ok(registry.handle_view_action(&ctx, request).await)
                }
            })?;

        info!(local = %self.transport.local_id(), "View registry attached");
        Ok(())
    }

    /// Stop answering the action channels
    pub fn detach(&self) {
        self.transport.remove_handler(&channels::VIEW_MANAGER_ACTION);
        self.transport.remove_handler(&channels::VIEW_ACTION);
        info!(local = %self.transport.local_id(), "View registry detached");
    }

    async fn handle_manager_action(
        &self,
        ctx: &RequestContext,
        action: ManagerAction,
    ) -> Option<ManagerActionOutput> {
        if !self.guard.check(ctx) {
            return None;
        }
        debug!(sender = %ctx.sender, ?action, "Manager action received");

        match action {
            ManagerAction::Create(options) => self.create(options).await.map(|view| {
                ManagerActionOutput::Created(CreatedView {
                    view_id: view.id,
                    web_contents_id: view.web_contents_id,
                })
            }),
            ManagerAction::HideAll => Some(ManagerActionOutput::Done(self.hide_all())),
            ManagerAction::ShowActive { id } => {
                Some(ManagerActionOutput::Done(self.show_active(id.as_ref())))
            }
        }
    }

    async fn handle_view_action(
        &self,
        ctx: &RequestContext,
        request: ViewActionRequest,
    ) -> Option<ViewActionOutput> {
        if !self.guard.check(ctx) {
            return None;
        }
        debug!(
            sender = %ctx.sender,
            view_id = %request.view_id,
            action = request.action.name(),
            "View action received"
        );
        self.perform(&request.view_id, request.action).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a view
    ///
    /// Returns `None` if the explicit id is taken or the surface cannot be
    /// built; the registry is left unchanged in both cases.
    pub async fn create(&self, options: CreateOptions) -> Option<ViewSnapshot> {
        if let Some(id) = options.id.as_ref() {
            if self.contains(id) {
                warn!(view_id = %id, "View id already registered");
                return None;
            }
        }

        let is_overlay = options.wants_overlay();
        let spec = self.surface_spec(&options, is_overlay);
        let surface = match self.factory.create_surface(&spec) {
            Ok(surface) => surface,
            Err(e) => {
                error!(error = %e, partition = %spec.partition, "Failed to create view");
                return None;
            }
        };
        let web_contents_id = surface.web_contents_id();
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| ViewId::new(web_contents_id.to_string()));

        if is_overlay {
            surface.set_border_radius(self.settings.overlay_border_radius);
        }
        if let Some(bounds) = options.bounds {
            surface.set_bounds(bounds);
        }
        let restored = !options.navigation_history.is_empty();
        if restored {
            let last = options.navigation_history.len() - 1;
            surface.restore_history(NavigationHistory {
                index: options.navigation_history_index.unwrap_or(last).min(last),
                entries: options.navigation_history.clone(),
            });
        }

        let listener_handles = self.install_listeners(&id, surface.as_ref());
        {
            let mut state = self.state.lock();
            if state.views.contains_key(&id) {
                drop(state);
                error!(view_id = %id, "View id collided during creation");
                release_surface(surface.as_ref(), &listener_handles);
                return None;
            }
            state.views.insert(
                id.clone(),
                ViewRecord {
                    is_overlay,
                    attached: false,
                    ever_attached: false,
                    capture_attached: false,
                    surface: Arc::clone(&surface),
                    listener_handles,
                },
            );
        }
        info!(view_id = %id, web_contents_id, is_overlay, "View created");

        if options.wants_activation() {
            if is_overlay {
                self.hide_all();
            }
            self.activate(&id);
        }

        let _ = self.events.send(RegistryEvent::Created(id.clone()));

        if !restored {
            if let Some(url) = options.url.as_deref() {
                debug!(view_id = %id, url, "Loading initial URL");
                if let Err(e) = surface.load_url(url).await {
                    warn!(view_id = %id, error = %e, "Initial load failed");
                }
            }
        }

        self.snapshot(&id)
    }

    fn surface_spec(&self, options: &CreateOptions, is_overlay: bool) -> SurfaceSpec {
        let default_partition = if is_overlay {
            &self.settings.overlay_partition
        } else {
            &self.settings.view_partition
        };
        let mut additional_arguments = options.additional_arguments.clone();
        if let Some(overlay_id) = options.overlay_id.as_deref() {
            additional_arguments.push(format!("--overlayId={overlay_id}"));
        }
        SurfaceSpec {
            partition: options
                .partition
                .clone()
                .unwrap_or_else(|| default_partition.clone()),
            preload: options.preload.clone().or_else(|| self.settings.preload.clone()),
            additional_arguments,
            sandbox: self.settings.sandbox,
            transparent: is_overlay,
        }
    }

    fn install_listeners(&self, id: &ViewId, surface: &dyn NativeSurface) -> Vec<ListenerHandle> {
        let web_contents_id = surface.web_contents_id();
        let mut handles = Vec::with_capacity(ViewEventKind::ALL.len() + 1);

        for kind in ViewEventKind::ALL {
            let tx = self.signals_tx.clone();
            let id = id.clone();
            handles.push(surface.add_listener(
                kind,
                Arc::new(move |event| {
                    let _ = tx.send(RegistrySignal::View {
                        id: id.clone(),
                        web_contents_id,
                        event,
                    });
                }),
            ));
        }

        let tx = self.signals_tx.clone();
        let id = id.clone();
        handles.push(surface.on_destroyed(Arc::new(move || {
            let _ = tx.send(RegistrySignal::SurfaceDestroyed {
                id: id.clone(),
                web_contents_id,
            });
        })));
        handles
    }

    /// Bring a view to the front, make it active and focus it
    pub fn activate(&self, id: &ViewId) -> bool {
        let Some(surface) = self.bring_to_front(id) else {
            return false;
        };
        surface.focus();
        debug!(view_id = %id, "View activated");
        true
    }

    /// Detach and reattach so the view is topmost, then update the matching
    /// active pointer
    fn bring_to_front(&self, id: &ViewId) -> Option<Arc<dyn NativeSurface>> {
        let gone = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(record) = state.views.get_mut(id) else {
                drop(guard);
                warn!(view_id = %id, "No view found to activate");
                return None;
            };

            if record.surface.is_destroyed() {
                true
            } else {
                detach_surface(self.host.as_ref(), id, record);
                if !attach_surface(self.host.as_ref(), id, record) {
                    return None;
                }
                record.ever_attached = true;
                let is_overlay = record.is_overlay;
                let surface = Arc::clone(&record.surface);
                state.set_active(id, is_overlay);
                return Some(surface);
            }
        };

        if gone {
            self.reconcile(id);
        }
        None
    }

    /// Detach one view
    ///
    /// Hiding the active overlay also clears the overlay pointer.
    pub fn hide(&self, id: &ViewId) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(record) = state.views.get_mut(id) else {
            drop(guard);
            warn!(view_id = %id, "No view found to hide");
            return false;
        };
        detach_surface(self.host.as_ref(), id, record);
        if record.is_overlay && state.active_overlay_view_id.as_ref() == Some(id) {
            state.active_overlay_view_id = None;
        }
        debug!(view_id = %id, "View hidden");
        true
    }

    /// Detach every view, then focus the host window
    ///
    /// Active pointers are kept so [`show_active`](Self::show_active) can
    /// restore them.
    pub fn hide_all(&self) -> bool {
        {
            let mut state = self.state.lock();
            for (id, record) in &mut state.views {
                detach_surface(self.host.as_ref(), id, record);
            }
        }
        self.host.focus();
        debug!("All views hidden");
        true
    }

    /// Re-attach the named view, or the tracked active one
    ///
    /// When an overlay is active and the target is a plain view, the plain
    /// view goes back underneath and the overlay is activated on top.
    pub fn show_active(&self, id: Option<&ViewId>) -> bool {
        let (target, overlay, target_is_overlay) = {
            let state = self.state.lock();
            let target = id
                .cloned()
                .or_else(|| state.active_view_id.clone())
                .or_else(|| state.active_overlay_view_id.clone());
            let target_is_overlay = target
                .as_ref()
                .and_then(|target| state.views.get(target))
                .map(|record| record.is_overlay);
            (target, state.active_overlay_view_id.clone(), target_is_overlay)
        };

        let Some(target) = target else {
            warn!("No active view to show");
            return false;
        };
        let Some(target_is_overlay) = target_is_overlay else {
            warn!(view_id = %target, "No view found to show");
            return false;
        };

        match overlay {
            Some(overlay) if !target_is_overlay => {
                debug!(view_id = %target, overlay_id = %overlay, "Showing view under active overlay");
                let shown = self.bring_to_front(&target).is_some();
                self.activate(&overlay) || shown
            }
            _ => self.activate(&target),
        }
    }

    /// Tear a view down
    ///
    /// Releases its listeners, clears any active pointer naming it,
    /// removes it from the host and closes the surface. Unknown ids are a
    /// logged no-op.
    pub fn destroy(&self, id: &ViewId) -> bool {
        let record = {
            let mut state = self.state.lock();
            let Some(record) = state.views.remove(id) else {
                drop(state);
                warn!(view_id = %id, "No view found to destroy");
                return false;
            };
            if state.active_view_id.as_ref() == Some(id) {
                debug!(view_id = %id, "Clearing active view");
                state.active_view_id = None;
            }
            if state.active_overlay_view_id.as_ref() == Some(id) {
                debug!(view_id = %id, "Clearing active overlay");
                state.active_overlay_view_id = None;
            }
            record
        };

        if let Err(e) = self.host.remove_child(record.surface.as_ref()) {
            warn!(view_id = %id, error = %e, "Could not remove view from host");
        }
        release_surface(record.surface.as_ref(), &record.listener_handles);

        info!(view_id = %id, "View destroyed");
        let _ = self.events.send(RegistryEvent::Destroyed(id.clone()));
        true
    }

    /// Destroy every view, then clear whatever is still in the host
    pub fn destroy_all(&self) -> usize {
        let ids: Vec<ViewId> = self.state.lock().views.keys().cloned().collect();
        info!(count = ids.len(), "Destroying all views");
        let destroyed = ids.iter().filter(|id| self.destroy(id)).count();

        let remaining = self.host.children();
        if !remaining.is_empty() {
            warn!(remaining = remaining.len(), "Views left in host after destroy, removing");
            for web_contents_id in remaining {
                if let Err(e) = self.host.remove_child_by_id(web_contents_id) {
                    warn!(web_contents_id, error = %e, "Could not remove leftover child");
                }
            }
        }
        destroyed
    }

    /// React to the host window's own lifecycle
    pub fn handle_host_event(&self, event: &HostEvent) {
        match event {
            HostEvent::Closed | HostEvent::ContentsDestroyed => {
                info!(?event, "Host window going away, cleaning up");
                self.destroy_all();
                self.detach();
            }
            HostEvent::DidNavigate { url } => {
                info!(url = %url, "Host navigated, removing leftover views");
                self.destroy_all();
            }
        }
    }

    fn reconcile(&self, id: &ViewId) {
        warn!(view_id = %id, "View surface was destroyed outside the registry");
        self.destroy(id);
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Run one action on a view
    ///
    /// Returns `None` for an unknown view.
    pub async fn perform(&self, id: &ViewId, action: ViewAction) -> Option<ViewActionOutput> {
        let (surface, is_overlay) = self.live_surface(id)?;
        let output = match action {
            ViewAction::Activate => ViewActionOutput::Done(self.activate(id)),
            ViewAction::Reload { ignore_cache } => {
                surface.reload(ignore_cache);
                ViewActionOutput::Done(true)
            }
            ViewAction::GoBack => {
                let can = surface.can_go_back();
                if can {
                    surface.go_back();
                }
                ViewActionOutput::Done(can)
            }
            ViewAction::GoForward => {
                let can = surface.can_go_forward();
                if can {
                    surface.go_forward();
                }
                ViewActionOutput::Done(can)
            }
            ViewAction::Destroy => ViewActionOutput::Done(self.destroy(id)),
            ViewAction::SetBounds(bounds) => {
                surface.set_bounds(bounds);
                ViewActionOutput::Done(true)
            }
            ViewAction::LoadUrl { url } => match surface.load_url(&url).await {
                Ok(()) => ViewActionOutput::Done(true),
                Err(e) => {
                    warn!(view_id = %id, error = %e, "Load failed");
                    ViewActionOutput::Done(false)
                }
            },
            ViewAction::Hide => ViewActionOutput::Done(self.hide(id)),
            ViewAction::Focus => {
                let active = self.state.lock().is_active(id, is_overlay);
                if !active {
                    self.bring_to_front(id);
                }
                surface.focus();
                ViewActionOutput::Done(true)
            }
            ViewAction::SetAudioMuted(muted) => {
                surface.set_audio_muted(muted);
                ViewActionOutput::Done(true)
            }
            ViewAction::SetZoomFactor(factor) => {
                if factor.is_finite() && factor > 0.0 {
                    surface.set_zoom_factor(factor);
                    ViewActionOutput::Done(true)
                } else {
                    warn!(view_id = %id, factor, "Rejected zoom factor");
                    ViewActionOutput::Done(false)
                }
            }
            ViewAction::FindInPage { text, options } => {
                ViewActionOutput::FindRequest(surface.find_in_page(&text, options))
            }
            ViewAction::StopFindInPage { action } => {
                surface.stop_find_in_page(action);
                ViewActionOutput::Done(true)
            }
            ViewAction::CapturePage { quality, rect } => {
                let quality = quality.unwrap_or(self.settings.capture_quality);
                let attached_here = self.attach_for_capture(id);
                let image = surface.capture_page(rect, quality).await;
                if attached_here {
                    self.detach_after_capture(id);
                }
                ViewActionOutput::Capture(image)
            }
            ViewAction::GetNavigationHistory => {
                ViewActionOutput::History(surface.navigation_history())
            }
            ViewAction::GetUrl => ViewActionOutput::Url(surface.url()),
            ViewAction::InsertText { text } => {
                surface.insert_text(&text);
                ViewActionOutput::Done(true)
            }
            ViewAction::IsCurrentlyAudible => {
                ViewActionOutput::Audible(surface.is_currently_audible())
            }
            ViewAction::Send { channel, args } => {
                surface.send(&channel, args);
                ViewActionOutput::Done(true)
            }
            ViewAction::OpenDevTools { mode } => {
                surface.open_dev_tools(mode);
                ViewActionOutput::Done(true)
            }
        };
        Some(output)
    }

    /// Surface of a live view; reconciles a surface destroyed out-of-band
    fn live_surface(&self, id: &ViewId) -> Option<(Arc<dyn NativeSurface>, bool)> {
        let found = self
            .state
            .lock()
            .views
            .get(id)
            .map(|record| (Arc::clone(&record.surface), record.is_overlay));
        let Some((surface, is_overlay)) = found else {
            warn!(view_id = %id, "No view found");
            return None;
        };
        if surface.is_destroyed() {
            self.reconcile(id);
            return None;
        }
        Some((surface, is_overlay))
    }

    fn attach_for_capture(&self, id: &ViewId) -> bool {
        let mut state = self.state.lock();
        match state.views.get_mut(id) {
            Some(record) if !record.attached => {
                let attached = attach_surface(self.host.as_ref(), id, record);
                record.capture_attached = attached;
                attached
            }
            _ => false,
        }
    }

    /// Undo [`attach_for_capture`](Self::attach_for_capture) unless the view
    /// was attached or hidden by someone else meanwhile
    fn detach_after_capture(&self, id: &ViewId) {
        let mut state = self.state.lock();
        match state.views.get_mut(id) {
            Some(record) if record.capture_attached => {
                detach_surface(self.host.as_ref(), id, record);
            }
            Some(_) => debug!(view_id = %id, "View attached during capture, keeping it"),
            None => {}
        }
    }

    // ========================================================================
    // Event relay
    // ========================================================================

    /// Handle every queued native signal now. Returns how many were handled.
    ///
    /// Does nothing once [`spawn_event_relay`](Self::spawn_event_relay) has
    /// taken the queue.
    pub fn process_pending_events(&self) -> usize {
        let signals: Vec<RegistrySignal> = {
            let mut rx = self.signals_rx.lock();
            let Some(rx) = rx.as_mut() else {
                return 0;
            };
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        let count = signals.len();
        for signal in signals {
            self.handle_signal(signal);
        }
        count
    }

    /// Drain native signals on a background task
    ///
    /// Returns `None` if the relay is already running.
    pub fn spawn_event_relay(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.signals_rx.lock().take()?;
        let registry = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            info!("View event relay started");
            while let Some(signal) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.handle_signal(signal);
            }
            info!("View event relay stopped");
        }))
    }

    fn handle_signal(&self, signal: RegistrySignal) {
        match signal {
            RegistrySignal::View {
                id,
                web_contents_id,
                event,
            } => {
                let Some(is_overlay) = self.record_kind(&id, web_contents_id) else {
                    debug!(view_id = %id, kind = ?event.kind(), "Event from a removed view dropped");
                    return;
                };
                let hide = is_overlay && event == ViewEvent::Blur;
                let envelope = ViewEventEnvelope {
                    view_id: id.clone(),
                    event,
                };
                match self.transport.notify_all(&channels::VIEW_EVENT, &envelope) {
                    Ok(peers) => debug!(
                        view_id = %id,
                        kind = ?envelope.event.kind(),
                        peers,
                        "View event relayed"
                    ),
                    Err(e) => warn!(view_id = %id, error = %e, "Could not relay view event"),
                }
                if hide {
                    info!(view_id = %id, "Overlay lost focus, hiding it");
                    self.hide(&id);
                }
            }
            RegistrySignal::SurfaceDestroyed {
                id,
                web_contents_id,
            } => {
                if self.record_kind(&id, web_contents_id).is_some() {
                    self.reconcile(&id);
                }
            }
        }
    }

    /// Overlay flag of the record, if `id` still names this surface
    fn record_kind(&self, id: &ViewId, web_contents_id: u32) -> Option<bool> {
        self.state
            .lock()
            .views
            .get(id)
            .filter(|record| record.surface.web_contents_id() == web_contents_id)
            .map(|record| record.is_overlay)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Subscribe to created/destroyed notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Active plain view
    #[must_use]
    pub fn active_view_id(&self) -> Option<ViewId> {
        self.state.lock().active_view_id.clone()
    }

    /// Active overlay
    #[must_use]
    pub fn active_overlay_view_id(&self) -> Option<ViewId> {
        self.state.lock().active_overlay_view_id.clone()
    }

    /// Snapshot of one view
    #[must_use]
    pub fn snapshot(&self, id: &ViewId) -> Option<ViewSnapshot> {
        self.state.lock().views.get(id).map(|record| record.snapshot(id))
    }

    /// Snapshots of every view, sorted by id
    #[must_use]
    pub fn views(&self) -> Vec<ViewSnapshot> {
        let mut views: Vec<_> = self
            .state
            .lock()
            .views
            .iter()
            .map(|(id, record)| record.snapshot(id))
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    /// Number of live views
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().views.len()
    }

    /// Whether there are no views
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().views.is_empty()
    }

    /// Whether `id` names a live view
    #[must_use]
    pub fn contains(&self, id: &ViewId) -> bool {
        self.state.lock().views.contains_key(id)
    }

    /// Lifecycle state; `Destroyed` for ids not in the registry
    #[must_use]
    pub fn lifecycle(&self, id: &ViewId) -> ViewLifecycle {
        self.state
            .lock()
            .views
            .get(id)
            .map_or(ViewLifecycle::Destroyed, ViewRecord::lifecycle)
    }

    /// Whether the view is in the host's child list
    #[must_use]
    pub fn is_attached(&self, id: &ViewId) -> bool {
        self.lifecycle(id) == ViewLifecycle::Attached
    }
}

impl fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ViewRegistry")
            .field("views", &state.views.len())
            .field("active_view_id", &state.active_view_id)
            .field("active_overlay_view_id", &state.active_overlay_view_id)
            .finish_non_exhaustive()
    }
}

fn attach_surface(host: &dyn SurfaceHost, id: &ViewId, record: &mut ViewRecord) -> bool {
    match host.add_child(record.surface.as_ref()) {
        Ok(()) => {
            record.attached = true;
            record.capture_attached = false;
            true
        }
        Err(e) => {
            warn!(view_id = %id, error = %e, "Could not attach view");
            false
        }
    }
}

fn detach_surface(host: &dyn SurfaceHost, id: &ViewId, record: &mut ViewRecord) {
    if let Err(e) = host.remove_child(record.surface.as_ref()) {
        warn!(view_id = %id, error = %e, "Could not detach view");
    }
    record.attached = false;
    record.capture_attached = false;
}

fn release_surface(surface: &dyn NativeSurface, handles: &[ListenerHandle]) {
    for handle in handles {
        surface.remove_listener(*handle);
    }
    if !surface.is_destroyed() {
        surface.close();
    }
}
