//! Boundary to the windowing toolkit
//!
//! The registry never talks to a real browser engine directly. It sees a
//! [`SurfaceHost`] (the window with an ordered child list), [`NativeSurface`]s
//! (one embedded browsing area each) and a [`SurfaceFactory`] that builds them.
//! [`headless`](super::headless) provides an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::events::{ViewEvent, ViewEventKind};
use super::types::{
    Bounds, CaptureQuality, DevToolsMode, FindOptions, NavigationHistory, StopFindAction,
};

/// Errors raised by the native layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The surface could not be constructed
    #[error("surface construction failed: {0}")]
    Construction(String),

    /// The surface is already destroyed
    #[error("surface {0} is destroyed")]
    Destroyed(u32),

    /// Navigation was rejected
    #[error("navigation to '{url}' failed: {reason}")]
    Navigation {
        /// Target URL
        url: String,
        /// Why it failed
        reason: String,
    },

    /// The host refused a child-list change
    #[error("host error: {0}")]
    Host(String),
}

/// Subscription handle for a native listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub u64);

/// Callback for one kind of native event
pub type EventCallback = Arc<dyn Fn(ViewEvent) + Send + Sync>;

/// Callback for surface destruction
pub type DestroyedCallback = Arc<dyn Fn() + Send + Sync>;

/// Everything needed to construct a surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    /// Storage partition
    pub partition: String,
    /// Preload script path
    pub preload: Option<String>,
    /// Extra arguments handed to the preload
    pub additional_arguments: Vec<String>,
    /// Run the renderer sandboxed
    pub sandbox: bool,
    /// Transparent background
    pub transparent: bool,
}

/// Events raised by the host window itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostEvent {
    /// The window is closing
    Closed,
    /// The window's own contents were destroyed
    ContentsDestroyed,
    /// The window's own contents navigated
    DidNavigate {
        /// Committed URL
        url: String,
    },
}

/// One embedded, independently navigable browsing area
///
/// Listener callbacks may fire synchronously from inside any method call,
/// including on the calling thread.
#[async_trait]
pub trait NativeSurface: Send + Sync {
    /// Native id, unique per process
    fn web_contents_id(&self) -> u32;

    /// Whether the surface has been torn down
    fn is_destroyed(&self) -> bool;

    /// Move or resize
    fn set_bounds(&self, bounds: Bounds);

    /// Current bounds
    fn bounds(&self) -> Bounds;

    /// Round the corners
    fn set_border_radius(&self, radius: u32);

    /// Navigate to `url`
    async fn load_url(&self, url: &str) -> Result<(), SurfaceError>;

    /// Current URL
    fn url(&self) -> String;

    /// Reload the current entry
    fn reload(&self, ignore_cache: bool);

    /// Whether there is an entry to go back to
    fn can_go_back(&self) -> bool;

    /// Whether there is an entry to go forward to
    fn can_go_forward(&self) -> bool;

    /// Go back one entry
    fn go_back(&self);

    /// Go forward one entry
    fn go_forward(&self);

    /// Replace the session history
    fn restore_history(&self, history: NavigationHistory);

    /// Session history
    fn navigation_history(&self) -> NavigationHistory;

    /// Type text into the focused element
    fn insert_text(&self, text: &str);

    /// Give keyboard focus to the surface
    fn focus(&self);

    /// Mute or unmute
    fn set_audio_muted(&self, muted: bool);

    /// Whether audio is playing
    fn is_currently_audible(&self) -> bool;

    /// Set page zoom
    fn set_zoom_factor(&self, factor: f64);

    /// Start a search, returning its request id
    fn find_in_page(&self, text: &str, options: FindOptions) -> u32;

    /// Stop the current search
    fn stop_find_in_page(&self, action: StopFindAction);

    /// Screenshot as a data URL. Only attached surfaces paint.
    async fn capture_page(&self, rect: Option<Bounds>, quality: CaptureQuality) -> Option<String>;

    /// Message the preload
    fn send(&self, channel: &str, args: Vec<Value>);

    /// Open developer tools
    fn open_dev_tools(&self, mode: DevToolsMode);

    /// Subscribe to one kind of event
    fn add_listener(&self, kind: ViewEventKind, callback: EventCallback) -> ListenerHandle;

    /// Subscribe to destruction
    fn on_destroyed(&self, callback: DestroyedCallback) -> ListenerHandle;

    /// Unsubscribe. Returns false if the handle was unknown.
    fn remove_listener(&self, handle: ListenerHandle) -> bool;

    /// Tear the surface down
    fn close(&self);
}

/// The window hosting surfaces, with an ordered child list (last is topmost)
pub trait SurfaceHost: Send + Sync {
    /// Append a surface as the topmost child
    fn add_child(&self, surface: &dyn NativeSurface) -> Result<(), SurfaceError>;

    /// Remove a surface from the child list
    fn remove_child(&self, surface: &dyn NativeSurface) -> Result<(), SurfaceError>;

    /// Remove a child by native id
    fn remove_child_by_id(&self, web_contents_id: u32) -> Result<(), SurfaceError>;

    /// Native ids of the children, bottom to top
    fn children(&self) -> Vec<u32>;

    /// Give focus back to the window's own contents
    fn focus(&self);
}

/// Builds native surfaces
pub trait SurfaceFactory: Send + Sync {
    /// Construct a surface
    fn create_surface(&self, spec: &SurfaceSpec) -> Result<Arc<dyn NativeSurface>, SurfaceError>;
}
