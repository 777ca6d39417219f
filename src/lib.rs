//! waymux: tmux control-mode tracking for Wayland compositors.
//!
//! A compositor that overlays native windows on the terminal cells of
//! tmux panes needs a live picture of the server: which sessions exist,
//! how their windows are laid out, where every pane sits, and which
//! client looks at what. waymux maintains that picture by attaching
//! long-lived `tmux -C` control clients to the server, parsing their
//! notification stream, and reloading the affected slice of its shadow
//! model whenever tmux reports a change.
//!
//! ```no_run
//! use waymux::{Tmux, EventHandler, Pane};
//!
//! struct Compositor;
//!
//! impl EventHandler for Compositor {
//!     fn pane_resized(&mut self, pane: &Pane) -> waymux::Result<()> {
//!         println!("pane {} now {}x{} at {},{}", pane.id, pane.w, pane.h, pane.x, pane.y);
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> waymux::Result<()> {
//! let tmux = Tmux::new();
//! tmux.set_socket_name(Some("compositor".into()))?;
//! tmux.set_handler(Box::new(Compositor));
//! tmux.connect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The model is eventually consistent: tmux offers no atomic snapshot,
//! so a reload pass can race server-side changes. Every such change also
//! emits a notification, which schedules another pass; the picture
//! converges as soon as the server goes quiet.

pub mod cc;
pub mod config;
pub mod error;
pub mod events;
pub mod keys;
pub mod layout;
pub mod model;
pub mod parser;
pub mod read;
pub mod reload;
pub mod ring;

mod launch;
mod refresh;
mod tmux;

pub use cc::TEMP_SESSION_NAME;
pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventHandler, NullHandler};
pub use keys::{KeyBinding, KeyCode, KeyTable};
pub use launch::ExecOutput;
pub use model::{
    Client, Model, Pane, PaneId, Session, SessionId, StatusBar, Window, WindowId,
};
pub use refresh::RefreshFlags;
pub use tmux::Tmux;
