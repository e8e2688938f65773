//! Headless in-memory native backend
//!
//! Implements [`SurfaceHost`], [`NativeSurface`] and [`SurfaceFactory`]
//! without a browser engine. Navigation, focus and audio are simulated well
//! enough to drive the registry end to end: loads raise the usual event
//! sequence, capture only works while attached, and a surface can be torn
//! down out-of-band with [`HeadlessSurface::destroy`].
//!
//! Used by the daemon and by tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::events::{FindResult, ViewEvent, ViewEventKind};
use super::native::{
    DestroyedCallback, EventCallback, ListenerHandle, NativeSurface, SurfaceError, SurfaceFactory,
    SurfaceHost, SurfaceSpec,
};
use super::types::{
    Bounds, CaptureQuality, DevToolsMode, FindOptions, NavigationEntry, NavigationHistory,
    StopFindAction,
};

/// First native id handed out by [`HeadlessFactory`]
pub const FIRST_SURFACE_ID: u32 = 100;

// ============================================================================
// Host
// ============================================================================

/// Window with an ordered child list
#[derive(Debug, Default)]
pub struct HeadlessHost {
    children: Mutex<Vec<u32>>,
    focus_count: AtomicUsize,
}

impl HeadlessHost {
    /// Empty window
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether a surface is in the child list
    #[must_use]
    pub fn is_attached(&self, web_contents_id: u32) -> bool {
        self.children.lock().contains(&web_contents_id)
    }

    /// Topmost child
    #[must_use]
    pub fn top(&self) -> Option<u32> {
        self.children.lock().last().copied()
    }

    /// How often the window's own contents were focused
    #[must_use]
    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    /// Put an id into the child list without going through the registry
    pub fn insert_child_id(&self, web_contents_id: u32) {
        self.children.lock().push(web_contents_id);
    }
}

impl SurfaceHost for HeadlessHost {
    fn add_child(&self, surface: &dyn NativeSurface) -> Result<(), SurfaceError> {
        let id = surface.web_contents_id();
        if surface.is_destroyed() {
            return Err(SurfaceError::Destroyed(id));
        }
        let mut children = self.children.lock();
        children.retain(|child| *child != id);
        children.push(id);
        Ok(())
    }

    fn remove_child(&self, surface: &dyn NativeSurface) -> Result<(), SurfaceError> {
        self.remove_child_by_id(surface.web_contents_id())
    }

    fn remove_child_by_id(&self, web_contents_id: u32) -> Result<(), SurfaceError> {
        self.children.lock().retain(|child| *child != web_contents_id);
        Ok(())
    }

    fn children(&self) -> Vec<u32> {
        self.children.lock().clone()
    }

    fn focus(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Surface
// ============================================================================

enum Listener {
    Event(ViewEventKind, EventCallback),
    Destroyed(DestroyedCallback),
}

struct SurfaceState {
    destroyed: bool,
    bounds: Bounds,
    border_radius: u32,
    history: NavigationHistory,
    zoom_factor: f64,
    muted: bool,
    audible: bool,
    focused: bool,
    find_requests: u32,
    reloads: u32,
    inserted_text: String,
    sent: Vec<(String, Vec<Value>)>,
    dev_tools: Option<DevToolsMode>,
    listeners: BTreeMap<u64, Listener>,
}

/// Simulated browsing surface
pub struct HeadlessSurface {
    id: u32,
    spec: SurfaceSpec,
    host: Weak<HeadlessHost>,
    state: Mutex<SurfaceState>,
    next_listener: AtomicU64,
}

impl HeadlessSurface {
    fn new(id: u32, spec: SurfaceSpec, host: Weak<HeadlessHost>) -> Self {
        Self {
            id,
            spec,
            host,
            state: Mutex::new(SurfaceState {
                destroyed: false,
                bounds: Bounds::default(),
                border_radius: 0,
                history: NavigationHistory::default(),
                zoom_factor: 1.0,
                muted: false,
                audible: false,
                focused: false,
                find_requests: 0,
                reloads: 0,
                inserted_text: String::new(),
                sent: Vec::new(),
                dev_tools: None,
                listeners: BTreeMap::new(),
            }),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Spec the surface was built from
    #[must_use]
    pub fn spec(&self) -> &SurfaceSpec {
        &self.spec
    }

    /// Raise an event as the engine would
    pub fn emit(&self, event: ViewEvent) {
        let kind = event.kind();
        let callbacks: Vec<EventCallback> = {
            let state = self.state.lock();
            if state.destroyed {
                return;
            }
            state
                .listeners
                .values()
                .filter_map(|listener| match listener {
                    Listener::Event(k, callback) if *k == kind => Some(Arc::clone(callback)),
                    _ => None,
                })
                .collect()
        };
        for callback in callbacks {
            callback(event.clone());
        }
    }

    /// Tear the surface down as the engine would (crash, process exit)
    pub fn destroy(&self) {
        let callbacks: Vec<DestroyedCallback> = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            let listeners = std::mem::take(&mut state.listeners);
            listeners
                .into_values()
                .filter_map(|listener| match listener {
                    Listener::Destroyed(callback) => Some(callback),
                    Listener::Event(..) => None,
                })
                .collect()
        };
        debug!(web_contents_id = self.id, "Headless surface destroyed");
        for callback in callbacks {
            callback();
        }
    }

    /// Lose focus
    pub fn blur(&self) {
        self.state.lock().focused = false;
        self.emit(ViewEvent::Blur);
    }

    /// Start or stop simulated audio playback
    pub fn set_audible(&self, audible: bool) {
        self.state.lock().audible = audible;
        self.emit(if audible {
            ViewEvent::MediaStartedPlaying
        } else {
            ViewEvent::MediaPaused
        });
    }

    /// Current zoom factor
    #[must_use]
    pub fn zoom_factor(&self) -> f64 {
        self.state.lock().zoom_factor
    }

    /// Whether audio is muted
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    /// Whether the surface holds focus
    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.state.lock().focused
    }

    /// Corner radius
    #[must_use]
    pub fn border_radius(&self) -> u32 {
        self.state.lock().border_radius
    }

    /// Number of reloads
    #[must_use]
    pub fn reload_count(&self) -> u32 {
        self.state.lock().reloads
    }

    /// Text typed so far
    #[must_use]
    pub fn inserted_text(&self) -> String {
        self.state.lock().inserted_text.clone()
    }

    /// Messages sent to the preload
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().sent.clone()
    }

    /// Dock mode of open developer tools
    #[must_use]
    pub fn dev_tools(&self) -> Option<DevToolsMode> {
        self.state.lock().dev_tools
    }

    /// Number of live listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn add(&self, listener: Listener) -> ListenerHandle {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        if !state.destroyed {
            state.listeners.insert(id, listener);
        }
        ListenerHandle(id)
    }

    fn navigate_to_current(&self) {
        let url = self.url();
        self.emit(ViewEvent::DidStartLoading);
        self.emit(ViewEvent::DidNavigate {
            url,
            http_response_code: 200,
            http_status_text: "OK".into(),
        });
        self.emit(ViewEvent::DomReady);
        self.emit(ViewEvent::DidFinishLoad);
        self.emit(ViewEvent::DidStopLoading);
    }
}

#[async_trait]
impl NativeSurface for HeadlessSurface {
    fn web_contents_id(&self) -> u32 {
        self.id
    }

    fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn set_bounds(&self, bounds: Bounds) {
        self.state.lock().bounds = bounds;
    }

    fn bounds(&self) -> Bounds {
        self.state.lock().bounds
    }

    fn set_border_radius(&self, radius: u32) {
        self.state.lock().border_radius = radius;
    }

    async fn load_url(&self, url: &str) -> Result<(), SurfaceError> {
        if self.is_destroyed() {
            return Err(SurfaceError::Destroyed(self.id));
        }
        self.emit(ViewEvent::WillNavigate { url: url.into() });
        if !url.contains(':') {
            self.emit(ViewEvent::DidFailLoad {
                error_code: -300,
                error_description: "ERR_INVALID_URL".into(),
                validated_url: url.into(),
                is_main_frame: true,
            });
            return Err(SurfaceError::Navigation {
                url: url.into(),
                reason: "ERR_INVALID_URL".into(),
            });
        }

        {
            let mut state = self.state.lock();
            let history = &mut state.history;
            if !history.entries.is_empty() {
                history.entries.truncate(history.index + 1);
            }
            history.entries.push(NavigationEntry::new(url));
            history.index = history.entries.len() - 1;
        }
        self.navigate_to_current();
        Ok(())
    }

    fn url(&self) -> String {
        self.state
            .lock()
            .history
            .current()
            .map(|entry| entry.url.clone())
            .unwrap_or_default()
    }

    fn reload(&self, _ignore_cache: bool) {
        self.state.lock().reloads += 1;
        self.emit(ViewEvent::DidStartLoading);
        self.emit(ViewEvent::DidStopLoading);
    }

    fn can_go_back(&self) -> bool {
        self.state.lock().history.index > 0
    }

    fn can_go_forward(&self) -> bool {
        let state = self.state.lock();
        state.history.index + 1 < state.history.entries.len()
    }

    fn go_back(&self) {
        {
            let mut state = self.state.lock();
            if state.history.index == 0 {
                return;
            }
            state.history.index -= 1;
        }
        self.navigate_to_current();
    }

    fn go_forward(&self) {
        {
            let mut state = self.state.lock();
            if state.history.index + 1 >= state.history.entries.len() {
                return;
            }
            state.history.index += 1;
        }
        self.navigate_to_current();
    }

    fn restore_history(&self, mut history: NavigationHistory) {
        history.index = history.index.min(history.entries.len().saturating_sub(1));
        self.state.lock().history = history;
    }

    fn navigation_history(&self) -> NavigationHistory {
        self.state.lock().history.clone()
    }

    fn insert_text(&self, text: &str) {
        self.state.lock().inserted_text.push_str(text);
    }

    fn focus(&self) {
        self.state.lock().focused = true;
        self.emit(ViewEvent::Focus);
    }

    fn set_audio_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn is_currently_audible(&self) -> bool {
        let state = self.state.lock();
        state.audible && !state.muted
    }

    fn set_zoom_factor(&self, factor: f64) {
        self.state.lock().zoom_factor = factor;
    }

    fn find_in_page(&self, text: &str, _options: FindOptions) -> u32 {
        let (request_id, matches) = {
            let mut state = self.state.lock();
            state.find_requests += 1;
            let haystack = state
                .history
                .current()
                .map(|entry| format!("{} {}", entry.url, entry.title))
                .unwrap_or_default();
            let matches = if text.is_empty() {
                0
            } else {
                u32::try_from(haystack.matches(text).count()).unwrap_or(u32::MAX)
            };
            (state.find_requests, matches)
        };
        self.emit(ViewEvent::FoundInPage {
            result: FindResult {
                request_id,
                active_match_ordinal: u32::from(matches > 0),
                matches,
                final_update: true,
            },
        });
        request_id
    }

    fn stop_find_in_page(&self, _action: StopFindAction) {}

    async fn capture_page(&self, rect: Option<Bounds>, quality: CaptureQuality) -> Option<String> {
        if self.is_destroyed() {
            return None;
        }
        let attached = self
            .host
            .upgrade()
            .is_some_and(|host| host.is_attached(self.id));
        if !attached {
            return None;
        }
        let area = rect.unwrap_or_else(|| self.bounds());
        Some(format!(
            "data:image/png;headless,{}x{}",
            quality.scale(area.width),
            quality.scale(area.height)
        ))
    }

    fn send(&self, channel: &str, args: Vec<Value>) {
        self.state.lock().sent.push((channel.to_string(), args));
    }

    fn open_dev_tools(&self, mode: DevToolsMode) {
        self.state.lock().dev_tools = Some(mode);
    }

    fn add_listener(&self, kind: ViewEventKind, callback: EventCallback) -> ListenerHandle {
        self.add(Listener::Event(kind, callback))
    }

    fn on_destroyed(&self, callback: DestroyedCallback) -> ListenerHandle {
        self.add(Listener::Destroyed(callback))
    }

    fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.state.lock().listeners.remove(&handle.0).is_some()
    }

    fn close(&self) {
        self.destroy();
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds [`HeadlessSurface`]s attached to one [`HeadlessHost`]
pub struct HeadlessFactory {
    host: Weak<HeadlessHost>,
    next_id: AtomicU32,
    fail_next: AtomicBool,
    created: AtomicUsize,
    /// Live surfaces; destroyed ones are dropped on the next construction
    surfaces: Mutex<Vec<Arc<HeadlessSurface>>>,
}

impl HeadlessFactory {
    /// Factory for surfaces shown in `host`
    #[must_use]
    pub fn new(host: &Arc<HeadlessHost>) -> Arc<Self> {
        Arc::new(Self {
            host: Arc::downgrade(host),
            next_id: AtomicU32::new(FIRST_SURFACE_ID),
            fail_next: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            surfaces: Mutex::new(Vec::new()),
        })
    }

    /// Make the next construction fail
    pub fn fail_next_creation(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Surface with a given native id
    #[must_use]
    pub fn surface(&self, web_contents_id: u32) -> Option<Arc<HeadlessSurface>> {
        self.surfaces
            .lock()
            .iter()
            .find(|surface| surface.id == web_contents_id)
            .cloned()
    }

    /// Most recently built surface
    #[must_use]
    pub fn last(&self) -> Option<Arc<HeadlessSurface>> {
        self.surfaces.lock().last().cloned()
    }

    /// Number of surfaces built
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl SurfaceFactory for HeadlessFactory {
    fn create_surface(&self, spec: &SurfaceSpec) -> Result<Arc<dyn NativeSurface>, SurfaceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SurfaceError::Construction("simulated failure".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let surface = Arc::new(HeadlessSurface::new(id, spec.clone(), self.host.clone()));
        {
            let mut surfaces = self.surfaces.lock();
            surfaces.retain(|existing| !existing.is_destroyed());
            surfaces.push(Arc::clone(&surface));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(web_contents_id = id, partition = %spec.partition, "Headless surface created");
        Ok(surface)
    }
}
