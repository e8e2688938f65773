//! Line-oriented command scripts
//!
//! The daemon has no real window, so it is driven by a small command language
//! read from a file or stdin. Every command goes through a first-party
//! controller exactly as the main UI would, and prints one JSON line.
//!
//! ```text
//! # comment
//! create tab --activate https://example.test
//! create bar --overlay --activate
//! bounds tab 0 80 1280 720
//! hide-all
//! show-active tab
//! destroy bar
//! list
//! ```

use std::str::FromStr;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use shell_core::view::FindOptions;
use shell_core::{Bounds, Controller, CreateOptions, HostEvent, Shell, ViewId};

/// A malformed script line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// First word is not a command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Required argument absent
    #[error("'{command}' needs {what}")]
    MissingArgument {
        /// Command name
        command: &'static str,
        /// Description of the argument
        what: &'static str,
    },

    /// Argument present but unusable
    #[error("'{command}': invalid {what} '{value}'")]
    InvalidArgument {
        /// Command name
        command: &'static str,
        /// Description of the argument
        what: &'static str,
        /// Offending text
        value: String,
    },
}

/// One parsed script line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a view
    Create {
        /// Explicit id
        id: String,
        /// Initial URL
        url: Option<String>,
        /// Show it on creation
        activate: bool,
        /// Create as an overlay
        overlay: bool,
    },
    /// Bring a view to the front
    Activate(String),
    /// Detach a view
    Hide(String),
    /// Detach every view
    HideAll,
    /// Re-attach a view, or the active one
    ShowActive(Option<String>),
    /// Navigate
    Load(String, String),
    /// History back
    Back(String),
    /// History forward
    Forward(String),
    /// Reload
    Reload(String),
    /// Move / resize
    Bounds(String, Bounds),
    /// Page zoom
    Zoom(String, f64),
    /// Mute / unmute
    Mute(String, bool),
    /// Start a search
    Find(String, String),
    /// Screenshot
    Capture(String),
    /// Session history
    History(String),
    /// Current URL
    Url(String),
    /// Tear down
    Destroy(String),
    /// The host window's own contents navigated
    NavigateHost(String),
    /// Registry state
    List,
}

impl Command {
    /// Parse a line; blank lines and `#` comments yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match name {
            "create" => {
                let mut id = None;
                let mut url = None;
                let mut activate = false;
                let mut overlay = false;
                for word in rest {
                    match word {
                        "--activate" => activate = true,
                        "--overlay" => overlay = true,
                        _ if id.is_none() => id = Some(word.to_string()),
                        _ => url = Some(word.to_string()),
                    }
                }
                Self::Create {
                    id: id.ok_or(ParseError::MissingArgument {
                        command: "create",
                        what: "a view id",
                    })?,
                    url,
                    activate,
                    overlay,
                }
            }
            "activate" => Self::Activate(view_arg("activate", &rest)?),
            "hide" => Self::Hide(view_arg("hide", &rest)?),
            "hide-all" => Self::HideAll,
            "show-active" => Self::ShowActive(rest.first().map(ToString::to_string)),
            "load" => Self::Load(view_arg("load", &rest)?, text_arg("load", &rest, "a url")?),
            "back" => Self::Back(view_arg("back", &rest)?),
            "forward" => Self::Forward(view_arg("forward", &rest)?),
            "reload" => Self::Reload(view_arg("reload", &rest)?),
            "bounds" => {
                let id = view_arg("bounds", &rest)?;
                if rest.len() < 5 {
                    return Err(ParseError::MissingArgument {
                        command: "bounds",
                        what: "x y width height",
                    });
                }
                let bounds = Bounds::new(
                    number("bounds", "x", rest[1])?,
                    number("bounds", "y", rest[2])?,
                    number("bounds", "width", rest[3])?,
                    number("bounds", "height", rest[4])?,
                );
                Self::Bounds(id, bounds)
            }
            "zoom" => {
                let id = view_arg("zoom", &rest)?;
                let factor = rest.get(1).ok_or(ParseError::MissingArgument {
                    command: "zoom",
                    what: "a factor",
                })?;
                Self::Zoom(id, number("zoom", "factor", factor)?)
            }
            "mute" => {
                let id = view_arg("mute", &rest)?;
                let muted = match rest.get(1).copied() {
                    None | Some("on") => true,
                    Some("off") => false,
                    Some(other) => {
                        return Err(ParseError::InvalidArgument {
                            command: "mute",
                            what: "state",
                            value: other.to_string(),
                        })
                    }
                };
                Self::Mute(id, muted)
            }
            "find" => Self::Find(view_arg("find", &rest)?, text_arg("find", &rest, "search text")?),
            "capture" => Self::Capture(view_arg("capture", &rest)?),
            "history" => Self::History(view_arg("history", &rest)?),
            "url" => Self::Url(view_arg("url", &rest)?),
            "destroy" => Self::Destroy(view_arg("destroy", &rest)?),
            "navigate-host" => Self::NavigateHost(
                rest.first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "app://main".to_string()),
            ),
            "list" => Self::List,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Command word, for output
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Activate(_) => "activate",
            Self::Hide(_) => "hide",
            Self::HideAll => "hide-all",
            Self::ShowActive(_) => "show-active",
            Self::Load(..) => "load",
            Self::Back(_) => "back",
            Self::Forward(_) => "forward",
            Self::Reload(_) => "reload",
            Self::Bounds(..) => "bounds",
            Self::Zoom(..) => "zoom",
            Self::Mute(..) => "mute",
            Self::Find(..) => "find",
            Self::Capture(_) => "capture",
            Self::History(_) => "history",
            Self::Url(_) => "url",
            Self::Destroy(_) => "destroy",
            Self::NavigateHost(_) => "navigate-host",
            Self::List => "list",
        }
    }
}

fn view_arg(command: &'static str, rest: &[&str]) -> Result<String, ParseError> {
    rest.first()
        .map(ToString::to_string)
        .ok_or(ParseError::MissingArgument {
            command,
            what: "a view id",
        })
}

/// Everything after the view id, joined back together
fn text_arg(command: &'static str, rest: &[&str], what: &'static str) -> Result<String, ParseError> {
    if rest.len() < 2 {
        return Err(ParseError::MissingArgument { command, what });
    }
    Ok(rest[1..].join(" "))
}

fn number<T: FromStr>(command: &'static str, what: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidArgument {
        command,
        what,
        value: value.to_string(),
    })
}

/// Executes commands against a shell through one controller
pub struct ScriptRunner<'a> {
    shell: &'a Shell,
    controller: &'a Controller,
}

impl<'a> ScriptRunner<'a> {
    /// Runner acting as `controller`
    #[must_use]
    pub fn new(shell: &'a Shell, controller: &'a Controller) -> Self {
        Self { shell, controller }
    }

    /// Parse and run one line, returning its JSON output
    pub async fn run_line(&self, line: &str) -> Result<Option<Value>> {
        let Some(command) = Command::parse(line).with_context(|| format!("Bad line: {line}"))?
        else {
            return Ok(None);
        };
        debug!(command = command.name(), "Running script command");
        let result = self.run(command.clone()).await?;
        Ok(Some(json!({ "command": command.name(), "result": result })))
    }

    /// Run every line of `script`, handing each output to `emit` as soon as
    /// its command finishes. Stops at the first failing line.
    ///
    /// Returns the number of commands run.
    pub async fn run_script(&self, script: &str, mut emit: impl FnMut(Value)) -> Result<usize> {
        let mut count = 0;
        for (number, line) in script.lines().enumerate() {
            let output = self
                .run_line(line)
                .await
                .with_context(|| format!("Line {}", number + 1))?;
            if let Some(output) = output {
                emit(output);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Run one command
    pub async fn run(&self, command: Command) -> Result<Value> {
        let client = self.controller.client();
        let value = match command {
            Command::Create {
                id,
                url,
                activate,
                overlay,
            } => {
                let mut options = CreateOptions::new().with_id(id);
                if let Some(url) = url {
                    options = options.with_url(url);
                }
                if activate {
                    options = options.activated();
                }
                if overlay {
                    options = options.overlay();
                }
                match client.create(options).await {
                    Some(view) => json!(view.id()),
                    None => Value::Null,
                }
            }
            Command::Activate(id) => json!(client.view(id).activate().await),
            Command::Hide(id) => json!(client.view(id).hide().await),
            Command::HideAll => json!(client.hide_all().await),
            Command::ShowActive(id) => json!(client.show_active(id.map(ViewId::new)).await),
            Command::Load(id, url) => json!(client.view(id).load_url(url).await),
            Command::Back(id) => json!(client.view(id).go_back().await),
            Command::Forward(id) => json!(client.view(id).go_forward().await),
            Command::Reload(id) => json!(client.view(id).reload(false).await),
            Command::Bounds(id, bounds) => json!(client.view(id).set_bounds(bounds).await),
            Command::Zoom(id, factor) => json!(client.view(id).set_zoom_factor(factor).await),
            Command::Mute(id, muted) => json!(client.view(id).set_audio_muted(muted).await),
            Command::Find(id, text) => {
                json!(client.view(id).find_in_page(text, FindOptions::default()).await)
            }
            Command::Capture(id) => json!(client.view(id).capture_page(None, None).await),
            Command::History(id) => json!(client.view(id).navigation_history().await),
            Command::Url(id) => json!(client.view(id).url().await),
            Command::Destroy(id) => json!(client.view(id).destroy().await),
            Command::NavigateHost(url) => {
                self.shell.handle_host_event(&HostEvent::DidNavigate { url });
                json!(true)
            }
            Command::List => {
                let registry = self.shell.registry();
                json!({
                    "views": registry.views(),
                    "activeViewId": registry.active_view_id(),
                    "activeOverlayViewId": registry.active_overlay_view_id(),
                })
            }
        };
        Ok(value)
    }
}
