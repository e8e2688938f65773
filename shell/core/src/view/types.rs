//! View data types shared by the registry, the proxies and the wire

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a view within a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    /// Wrap an id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ViewId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Rectangle in host window coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Bounds {
    /// Construct a rectangle
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One entry of a surface's session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEntry {
    /// Entry URL
    pub url: String,
    /// Page title at the time of navigation
    #[serde(default)]
    pub title: String,
}

impl NavigationEntry {
    /// Entry with an empty title
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
        }
    }
}

/// Session history and the position within it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NavigationHistory {
    /// Entries, oldest first
    pub entries: Vec<NavigationEntry>,
    /// Index of the current entry
    pub index: usize,
}

impl NavigationHistory {
    /// Current entry
    #[must_use]
    pub fn current(&self) -> Option<&NavigationEntry> {
        self.entries.get(self.index)
    }
}

/// How a new view is created
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOptions {
    /// Explicit id; the native surface id is used when absent
    pub id: Option<ViewId>,
    /// URL to load when no history is restored
    pub url: Option<String>,
    /// Initial bounds
    pub bounds: Option<Bounds>,
    /// History to restore
    pub navigation_history: Vec<NavigationEntry>,
    /// Current index within `navigation_history`
    pub navigation_history_index: Option<usize>,
    /// Attach and activate right away
    pub activate: bool,
    /// Render above plain views and hide on blur
    pub is_overlay: bool,
    /// Id of a built-in overlay; implies an activated overlay
    pub overlay_id: Option<String>,
    /// Storage partition override
    pub partition: Option<String>,
    /// Preload script path
    pub preload: Option<String>,
    /// Extra arguments handed to the preload
    pub additional_arguments: Vec<String>,
}

impl CreateOptions {
    /// Options with nothing set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ViewId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the URL to load
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set initial bounds
    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Restore a history instead of loading a URL
    #[must_use]
    pub fn with_history(mut self, entries: Vec<NavigationEntry>, index: usize) -> Self {
        self.navigation_history = entries;
        self.navigation_history_index = Some(index);
        self
    }

    /// Attach and activate on creation
    #[must_use]
    pub fn activated(mut self) -> Self {
        self.activate = true;
        self
    }

    /// Create an overlay
    #[must_use]
    pub fn overlay(mut self) -> Self {
        self.is_overlay = true;
        self
    }

    /// Whether these options produce an overlay
    #[must_use]
    pub fn wants_overlay(&self) -> bool {
        self.is_overlay || self.overlay_id.is_some()
    }

    /// Whether the view is attached and activated on creation
    #[must_use]
    pub fn wants_activation(&self) -> bool {
        self.activate || self.overlay_id.is_some()
    }
}

/// Screenshot scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureQuality {
    /// One third of the native size
    #[default]
    Low,
    /// Two thirds of the native size
    Medium,
    /// Native size
    High,
}

impl CaptureQuality {
    /// Scale a dimension down for this quality
    #[must_use]
    pub fn scale(self, dimension: u32) -> u32 {
        match self {
            Self::Low => dimension / 3,
            Self::Medium => dimension / 3 * 2 + dimension % 3 * 2 / 3,
            Self::High => dimension,
        }
    }
}

/// Find-in-page options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
    /// Search forward
    pub forward: bool,
    /// Case-sensitive match
    pub match_case: bool,
    /// Continue the previous search
    pub find_next: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            forward: true,
            match_case: false,
            find_next: false,
        }
    }
}

/// What to do with the selection when a search stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopFindAction {
    /// Clear the selection
    #[default]
    ClearSelection,
    /// Keep the selection
    KeepSelection,
    /// Activate the selected match
    ActivateSelection,
}

/// Dock position of the developer tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevToolsMode {
    /// Docked right
    Right,
    /// Docked bottom
    Bottom,
    /// Separate window
    #[default]
    Detach,
    /// Undocked, can be re-docked
    Undocked,
}

/// Operation on one view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewAction {
    /// Bring to front and focus
    Activate,
    /// Reload the page
    #[serde(rename_all = "camelCase")]
    Reload {
        /// Bypass the cache
        #[serde(default)]
        ignore_cache: bool,
    },
    /// Navigate back
    GoBack,
    /// Navigate forward
    GoForward,
    /// Tear down the view
    Destroy,
    /// Move or resize
    SetBounds(Bounds),
    /// Navigate to a URL
    LoadUrl {
        /// Target URL
        url: String,
    },
    /// Detach from the host
    Hide,
    /// Focus, bringing to front if not active
    Focus,
    /// Mute or unmute audio
    SetAudioMuted(bool),
    /// Set page zoom
    SetZoomFactor(f64),
    /// Start a find-in-page search
    FindInPage {
        /// Text to search for
        text: String,
        /// Search options
        #[serde(default)]
        options: FindOptions,
    },
    /// Stop the find-in-page search
    StopFindInPage {
        /// Selection handling
        #[serde(default)]
        action: StopFindAction,
    },
    /// Screenshot the page
    CapturePage {
        /// Scale; the configured default when absent
        #[serde(default)]
        quality: Option<CaptureQuality>,
        /// Region; the whole page when absent
        #[serde(default)]
        rect: Option<Bounds>,
    },
    /// Read the session history
    GetNavigationHistory,
    /// Read the current URL
    GetUrl,
    /// Type text into the focused element
    InsertText {
        /// Text to insert
        text: String,
    },
    /// Whether audio is playing
    IsCurrentlyAudible,
    /// Message the surface's preload
    Send {
        /// Preload channel
        channel: String,
        /// Arguments
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Open developer tools
    OpenDevTools {
        /// Dock position
        #[serde(default)]
        mode: DevToolsMode,
    },
}

impl ViewAction {
    /// Wire tag, for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activate => "ACTIVATE",
            Self::Reload { .. } => "RELOAD",
            Self::GoBack => "GO_BACK",
            Self::GoForward => "GO_FORWARD",
            Self::Destroy => "DESTROY",
            Self::SetBounds(_) => "SET_BOUNDS",
            Self::LoadUrl { .. } => "LOAD_URL",
            Self::Hide => "HIDE",
            Self::Focus => "FOCUS",
            Self::SetAudioMuted(_) => "SET_AUDIO_MUTED",
            Self::SetZoomFactor(_) => "SET_ZOOM_FACTOR",
            Self::FindInPage { .. } => "FIND_IN_PAGE",
            Self::StopFindInPage { .. } => "STOP_FIND_IN_PAGE",
            Self::CapturePage { .. } => "CAPTURE_PAGE",
            Self::GetNavigationHistory => "GET_NAVIGATION_HISTORY",
            Self::GetUrl => "GET_URL",
            Self::InsertText { .. } => "INSERT_TEXT",
            Self::IsCurrentlyAudible => "IS_CURRENTLY_AUDIBLE",
            Self::Send { .. } => "SEND",
            Self::OpenDevTools { .. } => "OPEN_DEV_TOOLS",
        }
    }
}

/// A [`ViewAction`] addressed to a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewActionRequest {
    /// Target view
    pub view_id: ViewId,
    /// Operation
    pub action: ViewAction,
}

/// Result of a [`ViewAction`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ViewActionOutput {
    /// Whether the operation took effect
    Done(bool),
    /// Current URL
    Url(String),
    /// Id of the find-in-page request
    FindRequest(u32),
    /// Screenshot as a data URL, if one could be taken
    Capture(Option<String>),
    /// Session history
    History(NavigationHistory),
    /// Whether audio is playing
    Audible(bool),
}

impl ViewActionOutput {
    /// True only for `Done(true)`
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(true))
    }
}

/// Registry-level operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagerAction {
    /// Create a view
    Create(CreateOptions),
    /// Detach every view
    HideAll,
    /// Re-attach the tracked (or named) view
    ShowActive {
        /// View to show; the tracked active view when absent
        #[serde(default)]
        id: Option<ViewId>,
    },
}

/// A newly created view, as reported to controllers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedView {
    /// Id assigned to the view
    pub view_id: ViewId,
    /// Native id of the surface
    pub web_contents_id: u32,
}

/// Result of a [`ManagerAction`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ManagerActionOutput {
    /// View created
    Created(CreatedView),
    /// Whether the operation took effect
    Done(bool),
}

/// Where a view is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewLifecycle {
    /// Constructed, never attached
    Created,
    /// In the host's child list
    Attached,
    /// Was attached, currently not
    Detached,
    /// Not live in the registry
    Destroyed,
}

/// Read-only view of a registry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    /// View id
    pub id: ViewId,
    /// Native id of the surface
    pub web_contents_id: u32,
    /// Whether the view is an overlay
    pub is_overlay: bool,
    /// Lifecycle state
    pub lifecycle: ViewLifecycle,
    /// Current bounds
    pub bounds: Bounds,
}

impl ViewSnapshot {
    /// Whether the view is in the host's child list
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lifecycle == ViewLifecycle::Attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_action_wire_tags() {
        assert_eq!(
            serde_json::to_value(ViewAction::Activate).unwrap(),
            json!({"type": "ACTIVATE"})
        );
        assert_eq!(
            serde_json::to_value(ViewAction::SetZoomFactor(1.5)).unwrap(),
            json!({"type": "SET_ZOOM_FACTOR", "payload": 1.5})
        );
        assert_eq!(
            serde_json::to_value(ViewAction::Reload { ignore_cache: true }).unwrap(),
            json!({"type": "RELOAD", "payload": {"ignoreCache": true}})
        );
    }

    #[test]
    fn test_action_defaults_when_fields_missing() {
        let action: ViewAction =
            serde_json::from_value(json!({"type": "CAPTURE_PAGE", "payload": {}})).unwrap();
        assert_eq!(
            action,
            ViewAction::CapturePage {
                quality: None,
                rect: None
            }
        );

        let action: ViewAction = serde_json::from_value(json!({"type": "GET_URL"})).unwrap();
        assert_eq!(action.name(), "GET_URL");
    }

    #[test]
    fn test_create_options_from_camel_case() {
        let options: CreateOptions = serde_json::from_value(json!({
            "url": "https://example.com",
            "isOverlay": true,
            "navigationHistoryIndex": 2,
        }))
        .unwrap();

        assert!(options.wants_overlay());
        assert!(!options.wants_activation());
        assert_eq!(options.navigation_history_index, Some(2));
    }

    #[test]
    fn test_overlay_id_implies_activated_overlay() {
        let options = CreateOptions {
            overlay_id: Some("command-bar".into()),
            ..CreateOptions::default()
        };
        assert!(options.wants_overlay());
        assert!(options.wants_activation());
    }

    #[test]
    fn test_capture_quality_scale() {
        assert_eq!(CaptureQuality::Low.scale(900), 300);
        assert_eq!(CaptureQuality::Medium.scale(900), 600);
        assert_eq!(CaptureQuality::High.scale(900), 900);
        assert_eq!(CaptureQuality::Medium.scale(902), 601);
    }

    #[test]
    fn test_capture_quality_scale_large_dimensions() {
        assert_eq!(CaptureQuality::Medium.scale(3_000_000_000), 2_000_000_000);
        assert_eq!(CaptureQuality::Medium.scale(u32::MAX), 2_863_311_530);
        assert_eq!(CaptureQuality::Low.scale(u32::MAX), 1_431_655_765);
        assert_eq!(CaptureQuality::High.scale(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_manager_output_shape() {
        let output = ManagerActionOutput::Created(CreatedView {
            view_id: "v1".into(),
            web_contents_id: 4,
        });
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"kind": "created", "value": {"viewId": "v1", "webContentsId": 4}})
        );
    }
}
