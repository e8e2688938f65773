//! Views: embedded browsing surfaces and the registry that owns them
//!
//! - [`types`]: ids, bounds, create options, actions and their outputs
//! - [`events`]: native events and the envelope they are relayed in
//! - [`native`]: traits at the boundary to the windowing toolkit
//! - [`headless`]: in-memory implementation of those traits
//! - [`registry`]: the owner-side [`ViewRegistry`]

pub mod events;
pub mod headless;
pub mod native;
pub mod registry;
pub mod types;

pub use events::{FindResult, ViewEvent, ViewEventEnvelope, ViewEventKind};
pub use headless::{HeadlessFactory, HeadlessHost, HeadlessSurface};
pub use native::{
    HostEvent, ListenerHandle, NativeSurface, SurfaceError, SurfaceFactory, SurfaceHost,
    SurfaceSpec,
};
pub use registry::{RegistryEvent, RegistrySignal, ViewRegistry};
pub use types::{
    Bounds, CaptureQuality, CreateOptions, CreatedView, DevToolsMode, FindOptions, ManagerAction,
    ManagerActionOutput, NavigationEntry, NavigationHistory, StopFindAction, ViewAction,
    ViewActionOutput, ViewActionRequest, ViewId, ViewLifecycle, ViewSnapshot,
};
