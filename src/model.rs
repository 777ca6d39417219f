//! Shadow model of the tmux server.
//!
//! Sessions, windows, panes and clients as last observed through the
//! control clients. Everything is keyed by the stable tmux identifier
//! (`$n`, `@n`, `%n`, or the client name); cross-references between
//! entities are ids, never owning pointers, so the model is a plain
//! value type that can be cloned out to the host as a snapshot.
//!
//! The model is only ever mutated by the reload procedures; the host
//! sees it through the façade's lookup accessors and through the entity
//! snapshots carried by events.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::keys::{KeyCode, KeyTable};

macro_rules! tmux_id {
    ($name:ident, $sigil:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($sigil, "{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            /// Parse the wire form, sigil included.
            fn from_str(s: &str) -> Result<Self, Error> {
                s.strip_prefix($sigil)
                    .and_then(|digits| digits.parse().ok())
                    .map(Self)
                    .ok_or_else(|| Error::parse(format!("bad id {s:?}")))
            }
        }
    };
}

tmux_id!(SessionId, "$", "A tmux session id (`$n` on the wire).");
tmux_id!(WindowId, "@", "A tmux window id (`@n` on the wire).");
tmux_id!(PaneId, "%", "A tmux pane id (`%n` on the wire).");

/// Where a session draws its status bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusBar {
    Off,
    Top,
    #[default]
    Bottom,
}

/// A tmux session: an ordered collection of windows, one active, with
/// zero or more attached clients.
///
/// `windows` is the session's own window array. Because of tmux window
/// linking the same window id may appear in several sessions' arrays, or
/// more than once in this one, so windows are never threaded onto
/// per-session lists; only this array preserves the session's ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub statusbar: StatusBar,
    /// The session's prefix key (the `prefix` option).
    pub prefix: KeyCode,
    /// The alternate prefix key (`prefix2`), if bound.
    pub prefix2: KeyCode,
    /// Window ids in tmux's order, duplicates allowed.
    pub windows: Vec<WindowId>,
    pub active_window: Option<WindowId>,
    /// Names of the clients currently attached to this session.
    pub clients: Vec<String>,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            statusbar: StatusBar::default(),
            prefix: KeyCode::NONE,
            prefix2: KeyCode::NONE,
            windows: Vec::new(),
            active_window: None,
            clients: Vec::new(),
        }
    }
}

/// A tmux window: a set of panes tiled over the full viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub id: WindowId,
    /// Pane ids in tmux's order. A pane belongs to exactly one window.
    pub panes: Vec<PaneId>,
    pub active_pane: Option<PaneId>,
}

impl Window {
    #[must_use]
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            panes: Vec::new(),
            active_pane: None,
        }
    }
}

/// A tmux pane: one pseudo terminal, positioned inside its window.
///
/// Geometry is in terminal cells with the origin at the window's top
/// left; the status bar is not accounted for.
#[derive(Debug, Clone, PartialEq)]
pub struct Pane {
    pub id: PaneId,
    /// Pid of the pane's root process (usually a shell); tmux destroys
    /// the pane when this process exits.
    pub pid: i32,
    /// Whether this is the active pane in its window.
    pub active: bool,
    /// Whether the pane is in a mode (copy mode and friends).
    pub in_mode: bool,
    /// The window holding this pane. Lookup reference only.
    pub window: Option<WindowId>,
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl Pane {
    #[must_use]
    pub fn new(id: PaneId, pid: i32) -> Self {
        Self {
            id,
            pid,
            active: false,
            in_mode: false,
            window: None,
            x: 0,
            y: 0,
            w: 0,
            h: 0,
        }
    }
}

/// A client attached to the server, identified by its unique name.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub name: String,
    pub pid: i32,
    /// The session the client is attached to. Lookup reference only.
    pub session: Option<SessionId>,
}

impl Client {
    #[must_use]
    pub fn new(name: impl Into<String>, pid: i32) -> Self {
        Self {
            name: name.into(),
            pid,
            session: None,
        }
    }
}

/// The complete shadow of the server.
#[derive(Debug, Default)]
pub struct Model {
    pub sessions: HashMap<SessionId, Session>,
    pub windows: HashMap<WindowId, Window>,
    pub panes: HashMap<PaneId, Pane>,
    pub clients: HashMap<String, Client>,
    pub key_tables: HashMap<String, KeyTable>,
}

impl Model {
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.windows.clear();
        self.panes.clear();
        self.clients.clear();
        self.key_tables.clear();
    }

    /// Fetch a key table, creating it on demand.
    pub fn key_table_mut(&mut self, name: &str) -> &mut KeyTable {
        self.key_tables
            .entry(name.to_string())
            .or_insert_with(|| KeyTable::new(name))
    }

    /// Check the structural invariants; used by tests after every sync.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (id, pane) in &self.panes {
            assert_eq!(*id, pane.id);
            let mut containing = 0;
            for window in self.windows.values() {
                let hits = window.panes.iter().filter(|p| *p == id).count();
                assert!(hits <= 1, "pane {id} appears {hits} times in {}", window.id);
                containing += hits;
            }
            assert!(containing <= 1, "pane {id} linked into {containing} windows");
            if let Some(wid) = pane.window {
                let window = self.windows.get(&wid).expect("dangling pane.window");
                assert!(window.panes.contains(id));
            }
        }
        for (id, window) in &self.windows {
            assert_eq!(*id, window.id);
            if let Some(active) = window.active_pane {
                assert!(window.panes.contains(&active));
            }
        }
        for (id, session) in &self.sessions {
            assert_eq!(*id, session.id);
            if let Some(active) = session.active_window {
                assert!(session.windows.contains(&active));
            }
            for wid in &session.windows {
                assert!(self.windows.contains_key(wid), "dangling window {wid}");
            }
        }
        for (name, client) in &self.clients {
            assert_eq!(name, &client.name);
            if let Some(sid) = client.session {
                assert!(self.sessions.contains_key(&sid), "dangling client session");
            }
        }
    }
}
