//! Shell Core - Surface Transport and View Registry for the surf browser shell
//!
//! This crate lets a privileged controller UI and the owner process holding
//! the embedded browsing surfaces cooperate over typed channels. It is
//! independent of any windowing toolkit: the real window and web contents sit
//! behind the traits in [`view::native`], and [`view::headless`] provides an
//! in-memory implementation for tests and the daemon.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Controllers                               │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────────┐  │
//! │  │   Main    │  │ Settings  │  │   Setup   │  │ Announcements │  │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └───────┬───────┘  │
//! │        └──────────────┴──────┬───────┴────────────────┘          │
//! │              ViewProxy / ViewManagerClient (invoke)               │
//! └──────────────────────────────┼───────────────────────────────────┘
//!                                │   ▲ view events (notify_all)
//! ┌──────────────────────────────┼───┼───────────────────────────────┐
//! │                         OWNER (Shell)                            │
//! │  ┌───────────┐  ┌────────────┴───┴──┐  ┌──────────────────────┐  │
//! │  │ Transport ├─►│    SenderGuard    ├─►│     ViewRegistry     │  │
//! │  └───────────┘  └───────────────────┘  │ views, active ids    │  │
//! │                                        └──────────┬───────────┘  │
//! │                                 SurfaceHost / NativeSurface       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Transport`]: typed notify / invoke / reverse request for one side of a link
//! - [`Channel`]: named wire key with payload and output types
//! - [`SenderGuard`]: allow-list check on message origins
//! - [`ViewRegistry`]: owner-side set of live views and their stacking order
//! - [`ViewProxy`]: controller-side handle to one view
//! - [`ShellBuilder`] / [`Shell`]: wires one window's worth of the above
//!
//! # Module Overview
//!
//! - [`channel`]: channel declarations and the shell's channel catalog
//! - [`transport`]: peers, correlation tracking, dispatch
//! - [`guard`]: first-party surfaces and sender validation
//! - [`view`]: view types, events, native traits, headless backend, registry
//! - [`proxy`]: controller-side mirrors
//! - [`shell`]: explicit construction of a shell
//! - [`config`]: TOML / environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod config;
pub mod guard;
pub mod proxy;
pub mod shell;
pub mod transport;
pub mod view;

// Re-exports for convenience
pub use channel::{channels, shell_channels, Channel, ChannelError, ChannelRegistry};
pub use guard::{FirstPartySurface, FirstPartySurfaces, SenderGuard, TrustedSurfaces};
pub use proxy::{ViewManagerClient, ViewProxy};
pub use shell::{Controller, Shell, ShellBuilder, ShellError};
pub use transport::{
    Peer, PeerHandle, PeerId, PeerLifetime, RequestContext, Role, Transport, TransportConfig,
    TransportError,
};
pub use view::{
    Bounds, CreateOptions, HostEvent, ViewAction, ViewActionOutput, ViewEvent, ViewEventEnvelope,
    ViewId, ViewLifecycle, ViewRegistry, ViewSnapshot,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ShellConfig, ShellToml, ViewSettings,
};
