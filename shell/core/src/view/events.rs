//! Native view events and the envelope they are relayed in
//!
//! Every event a surface can raise is one variant of [`ViewEvent`], so the
//! relay and its consumers match exhaustively. On the wire an event travels
//! inside a [`ViewEventEnvelope`] shaped `{type, viewId, payload}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::ViewId;

/// Kind of native event, used to install one listener per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewEventKind {
    /// Load started
    DidStartLoading,
    /// Load stopped
    DidStopLoading,
    /// Load finished
    DidFinishLoad,
    /// Load failed
    DidFailLoad,
    /// DOM is ready
    DomReady,
    /// Navigation about to start
    WillNavigate,
    /// Main-frame navigation committed
    DidNavigate,
    /// Same-document navigation committed
    DidNavigateInPage,
    /// Hovered link changed
    UpdateTargetUrl,
    /// Title changed
    PageTitleUpdated,
    /// Favicons changed
    PageFaviconUpdated,
    /// Media started
    MediaStartedPlaying,
    /// Media paused
    MediaPaused,
    /// Surface gained focus
    Focus,
    /// Surface lost focus
    Blur,
    /// Find-in-page result
    FoundInPage,
    /// Raw message from the preload
    IpcMessage,
    /// Entered HTML fullscreen
    EnterHtmlFullScreen,
    /// Left HTML fullscreen
    LeaveHtmlFullScreen,
}

impl ViewEventKind {
    /// Every tracked kind
    pub const ALL: [Self; 19] = [
        Self::DidStartLoading,
        Self::DidStopLoading,
        Self::DidFinishLoad,
        Self::DidFailLoad,
        Self::DomReady,
        Self::WillNavigate,
        Self::DidNavigate,
        Self::DidNavigateInPage,
        Self::UpdateTargetUrl,
        Self::PageTitleUpdated,
        Self::PageFaviconUpdated,
        Self::MediaStartedPlaying,
        Self::MediaPaused,
        Self::Focus,
        Self::Blur,
        Self::FoundInPage,
        Self::IpcMessage,
        Self::EnterHtmlFullScreen,
        Self::LeaveHtmlFullScreen,
    ];

    /// Name of the native event
    #[must_use]
    pub fn native_name(self) -> &'static str {
        match self {
            Self::DidStartLoading => "did-start-loading",
            Self::DidStopLoading => "did-stop-loading",
            Self::DidFinishLoad => "did-finish-load",
            Self::DidFailLoad => "did-fail-load",
            Self::DomReady => "dom-ready",
            Self::WillNavigate => "will-navigate",
            Self::DidNavigate => "did-navigate",
            Self::DidNavigateInPage => "did-navigate-in-page",
            Self::UpdateTargetUrl => "update-target-url",
            Self::PageTitleUpdated => "page-title-updated",
            Self::PageFaviconUpdated => "page-favicon-updated",
            Self::MediaStartedPlaying => "media-started-playing",
            Self::MediaPaused => "media-paused",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::FoundInPage => "found-in-page",
            Self::IpcMessage => "ipc-message",
            Self::EnterHtmlFullScreen => "enter-html-full-screen",
            Self::LeaveHtmlFullScreen => "leave-html-full-screen",
        }
    }
}

/// Find-in-page result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResult {
    /// Id of the find request
    pub request_id: u32,
    /// Ordinal of the active match
    pub active_match_ordinal: u32,
    /// Number of matches
    pub matches: u32,
    /// Whether this is the last update for the request
    pub final_update: bool,
}

/// A native surface event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewEvent {
    /// Load started
    DidStartLoading,
    /// Load stopped
    DidStopLoading,
    /// Load finished
    DidFinishLoad,
    /// Load failed
    #[serde(rename_all = "camelCase")]
    DidFailLoad {
        /// Network error code
        error_code: i32,
        /// Error text
        error_description: String,
        /// URL that failed
        #[serde(rename = "validatedURL")]
        validated_url: String,
        /// Whether the main frame failed
        is_main_frame: bool,
    },
    /// DOM is ready
    DomReady,
    /// Navigation about to start
    WillNavigate {
        /// Target URL
        url: String,
    },
    /// Main-frame navigation committed
    #[serde(rename_all = "camelCase")]
    DidNavigate {
        /// Committed URL
        url: String,
        /// HTTP status code
        http_response_code: i32,
        /// HTTP status text
        http_status_text: String,
    },
    /// Same-document navigation committed
    #[serde(rename_all = "camelCase")]
    DidNavigateInPage {
        /// Committed URL
        url: String,
        /// Whether the main frame navigated
        is_main_frame: bool,
    },
    /// Hovered link changed
    UpdateTargetUrl {
        /// Link URL, empty when nothing is hovered
        url: String,
    },
    /// Title changed
    #[serde(rename_all = "camelCase")]
    PageTitleUpdated {
        /// New title
        title: String,
        /// Whether the page set the title itself
        explicit_set: bool,
    },
    /// Favicons changed
    PageFaviconUpdated {
        /// Favicon URLs
        favicons: Vec<String>,
    },
    /// Media started
    MediaStartedPlaying,
    /// Media paused
    MediaPaused,
    /// Surface gained focus
    Focus,
    /// Surface lost focus
    Blur,
    /// Find-in-page result
    FoundInPage {
        /// Match counts
        result: FindResult,
    },
    /// Raw message from the preload
    IpcMessage {
        /// Preload channel
        channel: String,
        /// Arguments
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Entered HTML fullscreen
    EnterHtmlFullScreen,
    /// Left HTML fullscreen
    LeaveHtmlFullScreen,
}

impl ViewEvent {
    /// Kind of this event
    #[must_use]
    pub fn kind(&self) -> ViewEventKind {
        match self {
            Self::DidStartLoading => ViewEventKind::DidStartLoading,
            Self::DidStopLoading => ViewEventKind::DidStopLoading,
            Self::DidFinishLoad => ViewEventKind::DidFinishLoad,
            Self::DidFailLoad { .. } => ViewEventKind::DidFailLoad,
            Self::DomReady => ViewEventKind::DomReady,
            Self::WillNavigate { .. } => ViewEventKind::WillNavigate,
            Self::DidNavigate { .. } => ViewEventKind::DidNavigate,
            Self::DidNavigateInPage { .. } => ViewEventKind::DidNavigateInPage,
            Self::UpdateTargetUrl { .. } => ViewEventKind::UpdateTargetUrl,
            Self::PageTitleUpdated { .. } => ViewEventKind::PageTitleUpdated,
            Self::PageFaviconUpdated { .. } => ViewEventKind::PageFaviconUpdated,
            Self::MediaStartedPlaying => ViewEventKind::MediaStartedPlaying,
            Self::MediaPaused => ViewEventKind::MediaPaused,
            Self::Focus => ViewEventKind::Focus,
            Self::Blur => ViewEventKind::Blur,
            Self::FoundInPage { .. } => ViewEventKind::FoundInPage,
            Self::IpcMessage { .. } => ViewEventKind::IpcMessage,
            Self::EnterHtmlFullScreen => ViewEventKind::EnterHtmlFullScreen,
            Self::LeaveHtmlFullScreen => ViewEventKind::LeaveHtmlFullScreen,
        }
    }
}

/// A [`ViewEvent`] tagged with the view it came from
///
/// Serialized flat as `{type, viewId, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawEnvelope", try_from = "RawEnvelope")]
pub struct ViewEventEnvelope {
    /// Source view
    pub view_id: ViewId,
    /// Event
    pub event: ViewEvent,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    view_id: ViewId,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    payload: Value,
}

impl From<ViewEventEnvelope> for RawEnvelope {
    fn from(envelope: ViewEventEnvelope) -> Self {
        // Adjacently tagged enums always encode to an object with a "type" key.
        let mut tagged = match serde_json::to_value(&envelope.event) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let kind = match tagged.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => String::new(),
        };
        Self {
            kind,
            view_id: envelope.view_id,
            payload: tagged.remove("payload").unwrap_or(Value::Null),
        }
    }
}

impl TryFrom<RawEnvelope> for ViewEventEnvelope {
    type Error = serde_json::Error;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let mut tagged = Map::new();
        tagged.insert("type".into(), Value::String(raw.kind));
        if !raw.payload.is_null() {
            tagged.insert("payload".into(), raw.payload);
        }
        Ok(Self {
            view_id: raw.view_id,
            event: serde_json::from_value(Value::Object(tagged))?,
        })
    }
}
