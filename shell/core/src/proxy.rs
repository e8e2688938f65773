//! Controller-side mirrors of the registry
//!
//! A [`ViewProxy`] holds nothing but a view id and a controller transport;
//! every call becomes one `invoke` on the view-action channel. Failures of
//! any kind (unknown view, rejected sender, transport error, unexpected
//! output) are logged and surface as `None` / `false`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::channels;
use crate::transport::{ListenerId, Transport};
use crate::view::{
    Bounds, CaptureQuality, CreateOptions, DevToolsMode, FindOptions, ManagerAction,
    ManagerActionOutput, NavigationHistory, StopFindAction, ViewAction, ViewActionOutput,
    ViewActionRequest, ViewEventEnvelope, ViewId,
};

/// Remote handle to one view
#[derive(Debug, Clone)]
pub struct ViewProxy {
    id: ViewId,
    transport: Arc<Transport>,
}

impl ViewProxy {
    /// Proxy for `id` over a controller transport
    #[must_use]
    pub fn new(id: ViewId, transport: Arc<Transport>) -> Self {
        Self { id, transport }
    }

    /// Id of the view
    #[must_use]
    pub fn id(&self) -> &ViewId {
        &self.id
    }

    async fn act(&self, action: ViewAction) -> Option<ViewActionOutput> {
        let name = action.name();
        let request = ViewActionRequest {
            view_id: self.id.clone(),
            action,
        };
        match self.transport.invoke(&channels::VIEW_ACTION, &request).await {
            Ok(Some(output)) => Some(output),
            Ok(None) => {
                warn!(view_id = %self.id, action = name, "View action not performed");
                None
            }
            Err(e) => {
                warn!(view_id = %self.id, action = name, error = %e, "View action failed");
                None
            }
        }
    }

    async fn act_done(&self, action: ViewAction) -> bool {
        match self.act(action).await {
            Some(ViewActionOutput::Done(done)) => done,
            Some(other) => {
                warn!(view_id = %self.id, output = ?other, "Unexpected view action output");
                false
            }
            None => false,
        }
    }

    /// Bring to front and focus
    pub async fn activate(&self) -> bool {
        self.act_done(ViewAction::Activate).await
    }

    /// Reload the page
    pub async fn reload(&self, ignore_cache: bool) -> bool {
        self.act_done(ViewAction::Reload { ignore_cache }).await
    }

    /// Navigate back; false when there is nothing to go back to
    pub async fn go_back(&self) -> bool {
        self.act_done(ViewAction::GoBack).await
    }

    /// Navigate forward
    pub async fn go_forward(&self) -> bool {
        self.act_done(ViewAction::GoForward).await
    }

    /// Tear the view down
    pub async fn destroy(&self) -> bool {
        self.act_done(ViewAction::Destroy).await
    }

    /// Move or resize
    pub async fn set_bounds(&self, bounds: Bounds) -> bool {
        self.act_done(ViewAction::SetBounds(bounds)).await
    }

    /// Navigate to `url`
    pub async fn load_url(&self, url: impl Into<String>) -> bool {
        self.act_done(ViewAction::LoadUrl { url: url.into() }).await
    }

    /// Detach from the host window
    pub async fn hide(&self) -> bool {
        self.act_done(ViewAction::Hide).await
    }

    /// Focus, bringing the view to the front if it is not active
    pub async fn focus(&self) -> bool {
        self.act_done(ViewAction::Focus).await
    }

    /// Mute or unmute
    pub async fn set_audio_muted(&self, muted: bool) -> bool {
        self.act_done(ViewAction::SetAudioMuted(muted)).await
    }

    /// Set page zoom
    pub async fn set_zoom_factor(&self, factor: f64) -> bool {
        self.act_done(ViewAction::SetZoomFactor(factor)).await
    }

    /// Start a search, returning its request id
    pub async fn find_in_page(&self, text: impl Into<String>, options: FindOptions) -> Option<u32> {
        let action = ViewAction::FindInPage {
            text: text.into(),
            options,
        };
        match self.act(action).await? {
            ViewActionOutput::FindRequest(request_id) => Some(request_id),
            other => self.unexpected(&other),
        }
    }

    /// Stop the current search
    pub async fn stop_find_in_page(&self, action: StopFindAction) -> bool {
        self.act_done(ViewAction::StopFindInPage { action }).await
    }

    /// Screenshot as a data URL
    pub async fn capture_page(
        &self,
        quality: Option<CaptureQuality>,
        rect: Option<Bounds>,
    ) -> Option<String> {
        match self.act(ViewAction::CapturePage { quality, rect }).await? {
            ViewActionOutput::Capture(image) => image,
            other => self.unexpected(&other),
        }
    }

    /// Session history
    pub async fn navigation_history(&self) -> Option<NavigationHistory> {
        match self.act(ViewAction::GetNavigationHistory).await? {
            ViewActionOutput::History(history) => Some(history),
            other => self.unexpected(&other),
        }
    }

    /// Current URL
    pub async fn url(&self) -> Option<String> {
        match self.act(ViewAction::GetUrl).await? {
            ViewActionOutput::Url(url) => Some(url),
            other => self.unexpected(&other),
        }
    }

    /// Type text into the focused element
    pub async fn insert_text(&self, text: impl Into<String>) -> bool {
        self.act_done(ViewAction::InsertText { text: text.into() })
            .await
    }

    /// Whether audio is playing
    pub async fn is_currently_audible(&self) -> Option<bool> {
        match self.act(ViewAction::IsCurrentlyAudible).await? {
            ViewActionOutput::Audible(audible) => Some(audible),
            other => self.unexpected(&other),
        }
    }

    /// Message the view's preload
    pub async fn send(&self, channel: impl Into<String>, args: Vec<Value>) -> bool {
        self.act_done(ViewAction::Send {
            channel: channel.into(),
            args,
        })
        .await
    }

    /// Open developer tools
    pub async fn open_dev_tools(&self, mode: DevToolsMode) -> bool {
        self.act_done(ViewAction::OpenDevTools { mode }).await
    }

    fn unexpected<T>(&self, output: &ViewActionOutput) -> Option<T> {
        warn!(view_id = %self.id, ?output, "Unexpected view action output");
        None
    }
}

/// Controller-side client for registry-level operations
#[derive(Debug, Clone)]
pub struct ViewManagerClient {
    transport: Arc<Transport>,
}

impl ViewManagerClient {
    /// Client over a controller transport
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// The underlying transport
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    async fn manage(&self, action: ManagerAction) -> Option<ManagerActionOutput> {
        match self
            .transport
            .invoke(&channels::VIEW_MANAGER_ACTION, &action)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Manager action failed");
                None
            }
        }
    }

    /// Create a view and return a proxy for it
    pub async fn create(&self, options: CreateOptions) -> Option<ViewProxy> {
        match self.manage(ManagerAction::Create(options)).await {
            Some(ManagerActionOutput::Created(created)) => {
                debug!(
                    view_id = %created.view_id,
                    web_contents_id = created.web_contents_id,
                    "View created"
                );
                Some(self.view(created.view_id))
            }
            Some(other) => {
                warn!(output = ?other, "Unexpected create output");
                None
            }
            None => {
                warn!("View was not created");
                None
            }
        }
    }

    /// Detach every view
    pub async fn hide_all(&self) -> bool {
        matches!(
            self.manage(ManagerAction::HideAll).await,
            Some(ManagerActionOutput::Done(true))
        )
    }

    /// Re-attach the named view, or the tracked active one
    pub async fn show_active(&self, id: Option<ViewId>) -> bool {
        matches!(
            self.manage(ManagerAction::ShowActive { id }).await,
            Some(ManagerActionOutput::Done(true))
        )
    }

    /// Proxy for an existing view
    #[must_use]
    pub fn view(&self, id: impl Into<ViewId>) -> ViewProxy {
        ViewProxy::new(id.into(), Arc::clone(&self.transport))
    }

    /// Subscribe to relayed view events
    pub fn on_view_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ViewEventEnvelope) + Send + Sync + 'static,
    {
        self.transport
            .on(&channels::VIEW_EVENT, move |_, envelope| listener(envelope))
    }

    /// Subscribe to relayed events of one view
    pub fn on_events_of<F>(&self, id: ViewId, listener: F) -> ListenerId
    where
        F: Fn(ViewEventEnvelope) + Send + Sync + 'static,
    {
        self.on_view_event(move |envelope| {
            if envelope.view_id == id {
                listener(envelope);
            }
        })
    }

    /// Drop a subscription
    pub fn off(&self, listener: ListenerId) -> bool {
        self.transport.off(listener)
    }
}
