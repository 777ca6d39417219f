//! Reload procedures: bring the shadow model into agreement with tmux.
//!
//! Each procedure has two halves. The async half (on the façade) runs
//! the `list-…` command and hands its line-oriented output here. The
//! pure half below parses the rows and diffs them against the model,
//! pushing change events as it goes. It never touches a process, so
//! every diffing rule is unit-testable against canned server output.
//!
//! The diff shape is the same everywhere:
//! 1. every existing entity is looked for in the observed rows; matches
//!    are marked, the rest are removed and queued as `*Closed`;
//! 2. unmarked rows allocate new entities and queue `New*`;
//! 3. a second walk over the rows rebuilds linkage (orderings, active
//!    pointers, parent references) in observed order.
//!
//! None of tmux's listings guarantee uniqueness (window linking can
//! repeat a window and its panes arbitrarily), so every rule below
//! tolerates duplicate rows.

use std::collections::HashSet;
use std::ops::ControlFlow;

use log::warn;

use crate::cc::TEMP_SESSION_NAME;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::keys::{self, KeyBinding, KeyCode};
use crate::layout;
use crate::model::{
    Client, Model, Pane, PaneId, Session, SessionId, StatusBar, Window, WindowId,
};

// ---------------------------------------------------------------------
// Field formats and row parsing
// ---------------------------------------------------------------------

/// `list-sessions` format.
pub const SESSION_FORMAT: &str = "#{session_id} |#{session_name}";
/// `list-windows -a` format.
pub const WINDOW_FORMAT: &str = "#{window_id} #{session_id} #{window_active}";
/// `list-panes -a` format.
pub const PANE_FORMAT: &str =
    "#{pane_id} #{window_id} #{pane_active} #{pane_in_mode} #{pane_pid}";
/// `list-clients` format.
pub const CLIENT_FORMAT: &str = "#{session_id} #{client_pid} |#{client_name}";
/// `list-windows -a` format for the geometry pass.
pub const LAYOUT_FORMAT: &str = "#{window_visible_layout}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub session: SessionId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRow {
    pub window: WindowId,
    pub session: SessionId,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneRow {
    pub pane: PaneId,
    pub window: WindowId,
    pub active: bool,
    pub in_mode: bool,
    pub pid: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRow {
    pub session: SessionId,
    pub pid: i32,
    pub name: String,
}

fn parse_flag(token: &str, line: &str) -> Result<bool> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(Error::parse(format!("bad flag in {line:?}"))),
    }
}

fn parse_pid(token: &str, line: &str) -> Result<i32> {
    token
        .parse()
        .map_err(|_| Error::parse(format!("bad pid in {line:?}")))
}

/// Split a line into `n` space-separated head fields plus a tail that
/// starts after the `|` marker. The marker keeps names containing spaces
/// intact.
fn split_tail(line: &str, heads: usize) -> Result<(Vec<&str>, &str)> {
    let mut rest = line;
    let mut fields = Vec::with_capacity(heads);
    for _ in 0..heads {
        let (field, after) = rest
            .split_once(' ')
            .ok_or_else(|| Error::parse(format!("short line {line:?}")))?;
        fields.push(field);
        rest = after;
    }
    let tail = rest
        .strip_prefix('|')
        .ok_or_else(|| Error::parse(format!("missing name marker in {line:?}")))?;
    Ok((fields, tail))
}

pub fn parse_session_rows(out: &str) -> Result<Vec<SessionRow>> {
    out.lines()
        .map(|line| {
            let (fields, name) = split_tail(line, 1)?;
            Ok(SessionRow {
                session: fields[0].parse()?,
                name: name.to_string(),
            })
        })
        .collect()
}

pub fn parse_window_rows(out: &str) -> Result<Vec<WindowRow>> {
    out.lines()
        .map(|line| {
            let mut fields = line.split(' ');
            let (Some(window), Some(session), Some(active), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::parse(format!("bad window line {line:?}")));
            };
            Ok(WindowRow {
                window: window.parse()?,
                session: session.parse()?,
                active: parse_flag(active, line)?,
            })
        })
        .collect()
}

pub fn parse_pane_rows(out: &str) -> Result<Vec<PaneRow>> {
    out.lines()
        .map(|line| {
            let fields: Vec<&str> = line.split(' ').collect();
            let &[pane, window, active, in_mode, pid] = fields.as_slice() else {
                return Err(Error::parse(format!("bad pane line {line:?}")));
            };
            Ok(PaneRow {
                pane: pane.parse()?,
                window: window.parse()?,
                active: parse_flag(active, line)?,
                in_mode: parse_flag(in_mode, line)?,
                pid: parse_pid(pid, line)?,
            })
        })
        .collect()
}

pub fn parse_client_rows(out: &str) -> Result<Vec<ClientRow>> {
    out.lines()
        .map(|line| {
            let (fields, name) = split_tail(line, 2)?;
            Ok(ClientRow {
                session: fields[0].parse()?,
                pid: parse_pid(fields[1], line)?,
                name: name.to_string(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------

/// Diff the session collection against `rows`.
///
/// Sessions named [`TEMP_SESSION_NAME`] are ours: they are tracked (a
/// control client still attaches to them) but the host never hears about
/// them, in either direction.
pub fn sync_sessions(model: &mut Model, rows: &[SessionRow], events: &mut Vec<Event>) {
    let ids: Vec<SessionId> = model.sessions.keys().copied().collect();
    for id in ids {
        if rows.iter().any(|row| row.session == id) {
            continue;
        }
        if let Some(session) = model.sessions.remove(&id) {
            if session.name != TEMP_SESSION_NAME {
                events.push(Event::SessionClosed(session));
            }
        }
    }

    for row in rows {
        if let Some(session) = model.sessions.get_mut(&row.session) {
            // Renames arrive without their own refresh; pick them up
            // whenever we happen to be here.
            session.name.clone_from(&row.name);
            continue;
        }

        let session = Session::new(row.session, row.name.clone());
        model.sessions.insert(row.session, session.clone());
        if row.name != TEMP_SESSION_NAME {
            events.push(Event::NewSession(session));
        }
    }
}

/// Apply one `status` / `status-position` option pair to a session.
///
/// Empty per-session values inherit the global ones.
pub fn resolve_statusbar(
    status: &str,
    position: &str,
    global: (bool, bool),
) -> Result<StatusBar> {
    let on = match status {
        "on" => true,
        "off" => false,
        "" => global.0,
        other => return Err(Error::invalid(format!("bad status value {other:?}"))),
    };
    let top = match position {
        "top" => true,
        "bottom" => false,
        "" => global.1,
        other => {
            return Err(Error::invalid(format!(
                "bad status-position value {other:?}"
            )));
        }
    };
    Ok(if !on {
        StatusBar::Off
    } else if top {
        StatusBar::Top
    } else {
        StatusBar::Bottom
    })
}

// ---------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------

/// Diff the window collection against `rows` and rebuild every session's
/// window array in observed order.
pub fn sync_windows(model: &mut Model, rows: &[WindowRow], events: &mut Vec<Event>) -> Result<()> {
    let ids: Vec<WindowId> = model.windows.keys().copied().collect();
    for id in ids {
        if rows.iter().any(|row| row.window == id) {
            continue;
        }
        if let Some(window) = model.windows.remove(&id) {
            events.push(Event::WindowClosed(window));
        }
    }

    for row in rows {
        if model.windows.contains_key(&row.window) {
            continue;
        }
        let window = Window::new(row.window);
        model.windows.insert(row.window, window.clone());
        events.push(Event::NewWindow(window));
    }

    // Linkage: rebuild each session's array from scratch. Window linking
    // makes duplicates legal here, so rows append unconditionally.
    for session in model.sessions.values_mut() {
        session.windows.clear();
    }
    for row in rows {
        let session = model.sessions.get_mut(&row.session).ok_or_else(|| {
            Error::invalid(format!("window {} names unknown session {}", row.window, row.session))
        })?;
        session.windows.push(row.window);
        if row.active && session.active_window != Some(row.window) {
            session.active_window = Some(row.window);
            events.push(Event::SessionWindowChanged(session.clone()));
        }
    }

    // A session whose active window vanished must not keep pointing at
    // it.
    for session in model.sessions.values_mut() {
        if let Some(active) = session.active_window {
            if !session.windows.contains(&active) {
                session.active_window = None;
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------
// Panes
// ---------------------------------------------------------------------

/// Diff the pane collection against `rows` and rebuild each window's
/// pane list.
///
/// Window linking repeats whole windows in `list-panes -a` output,
/// sometimes adjacently, so the transition between windows cannot be
/// detected by window-id boundaries alone. A pane already linked in this
/// pass marks its row as a repeat.
pub fn sync_panes(model: &mut Model, rows: &[PaneRow], events: &mut Vec<Event>) -> Result<()> {
    let ids: Vec<PaneId> = model.panes.keys().copied().collect();
    for id in ids {
        if rows.iter().any(|row| row.pane == id) {
            continue;
        }
        if let Some(mut pane) = model.panes.remove(&id) {
            pane.window = None;
            events.push(Event::PaneClosed(pane));
        }
    }

    let mut created: HashSet<PaneId> = HashSet::new();
    for row in rows {
        if model.panes.contains_key(&row.pane) {
            continue;
        }
        let pane = Pane::new(row.pane, row.pid);
        model.panes.insert(row.pane, pane.clone());
        created.insert(row.pane);
        events.push(Event::NewPane(pane));
    }

    // Linkage pass. Start every window empty and every pane unhooked.
    for window in model.windows.values_mut() {
        window.panes.clear();
    }
    for pane in model.panes.values_mut() {
        pane.window = None;
    }

    let mut linked: HashSet<PaneId> = HashSet::new();
    for row in rows {
        if linked.contains(&row.pane) {
            // Repeat listing of a linked window.
            continue;
        }
        linked.insert(row.pane);

        if !model.windows.contains_key(&row.window) {
            return Err(Error::invalid(format!(
                "pane {} names unknown window {}",
                row.pane, row.window
            )));
        }

        let pane = model
            .panes
            .get_mut(&row.pane)
            .ok_or_else(|| Error::invalid(format!("pane {} vanished mid-sync", row.pane)))?;
        pane.window = Some(row.window);
        pane.active = row.active;
        if pane.in_mode != row.in_mode {
            pane.in_mode = row.in_mode;
            if !created.contains(&row.pane) {
                let snapshot = pane.clone();
                events.push(Event::PaneModeChanged(snapshot));
            }
        }

        let window = model
            .windows
            .get_mut(&row.window)
            .ok_or_else(|| Error::invalid(format!("window {} vanished mid-sync", row.window)))?;
        window.panes.push(row.pane);
        if row.active && window.active_pane != Some(row.pane) {
            window.active_pane = Some(row.pane);
            events.push(Event::WindowPaneChanged(window.clone()));
        }
    }

    for window in model.windows.values_mut() {
        if let Some(active) = window.active_pane {
            if !window.panes.contains(&active) {
                window.active_pane = None;
            }
        }
    }

    Ok(())
}

/// Geometry pass: run every `window_visible_layout` line through the
/// layout parser and update pane extents. `PaneResized` fires only for
/// real changes, which makes a fresh pane's first geometry exactly one
/// resize event after its `NewPane`.
pub fn apply_layouts<'a, I>(model: &mut Model, layouts: I, events: &mut Vec<Event>) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut covered: HashSet<PaneId> = HashSet::new();
    let mut failure = None;

    for line in layouts {
        layout::parse(line, |geometry| {
            let Some(pane) = model.panes.get_mut(&geometry.id) else {
                failure = Some(Error::invalid(format!(
                    "layout names unknown pane {}",
                    geometry.id
                )));
                return ControlFlow::Break(());
            };
            covered.insert(geometry.id);
            let next = (geometry.x, geometry.y, geometry.w, geometry.h);
            if (pane.x, pane.y, pane.w, pane.h) != next {
                (pane.x, pane.y, pane.w, pane.h) = next;
                events.push(Event::PaneResized(pane.clone()));
            }
            ControlFlow::Continue(())
        })?;
        if let Some(err) = failure.take() {
            return Err(err);
        }
    }

    // Panes in no visible layout (other sessions' view of a linked
    // window, mostly) fall back to zero extents.
    for pane in model.panes.values_mut() {
        if covered.contains(&pane.id) {
            continue;
        }
        if (pane.x, pane.y, pane.w, pane.h) != (0, 0, 0, 0) {
            (pane.x, pane.y, pane.w, pane.h) = (0, 0, 0, 0);
            events.push(Event::PaneResized(pane.clone()));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------

/// Diff the client collection against `rows`. Clients come and go
/// without host callbacks; only their session attachment is reported.
pub fn sync_clients(model: &mut Model, rows: &[ClientRow], events: &mut Vec<Event>) -> Result<()> {
    let names: Vec<String> = model.clients.keys().cloned().collect();
    for name in names {
        if rows.iter().any(|row| row.name == name) {
            continue;
        }
        model.clients.remove(&name);
    }

    for row in rows {
        if !model.clients.contains_key(&row.name) {
            model
                .clients
                .insert(row.name.clone(), Client::new(row.name.clone(), row.pid));
        }
    }

    for session in model.sessions.values_mut() {
        session.clients.clear();
    }
    for row in rows {
        if !model.sessions.contains_key(&row.session) {
            return Err(Error::invalid(format!(
                "client {:?} names unknown session {}",
                row.name, row.session
            )));
        }
        let client = model
            .clients
            .get_mut(&row.name)
            .ok_or_else(|| Error::invalid(format!("client {:?} vanished mid-sync", row.name)))?;
        client.pid = row.pid;
        if client.session != Some(row.session) {
            client.session = Some(row.session);
            events.push(Event::ClientSessionChanged(client.clone()));
        }
        if let Some(session) = model.sessions.get_mut(&row.session) {
            session.clients.push(row.name.clone());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------
// Key bindings
// ---------------------------------------------------------------------

/// Rebuild the key tables from `list-keys` output.
///
/// Lines look like `bind-key [-r] -T <table> <key> <command…>`. Keys we
/// cannot interpret are skipped with a warning; a missing binding is
/// better than a dead refresh pass.
pub fn sync_binds(model: &mut Model, out: &str) {
    model.key_tables.clear();

    for line in out.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(rest) = line.strip_prefix("bind-key") else {
            warn!("unrecognized list-keys line: {line:?}");
            continue;
        };
        let mut rest = rest.trim_start();

        let repeat = if let Some(after) = rest.strip_prefix("-r") {
            rest = after.trim_start();
            true
        } else {
            false
        };

        let Some(after) = rest.strip_prefix("-T") else {
            warn!("list-keys line without table: {line:?}");
            continue;
        };
        rest = after.trim_start();

        let Some((table, after)) = rest.split_once(' ') else {
            warn!("truncated list-keys line: {line:?}");
            continue;
        };
        rest = after.trim_start();

        let Some((key, command)) = rest.split_once(' ') else {
            warn!("list-keys line without command: {line:?}");
            continue;
        };

        let code = keys::lookup(key);
        if !code.is_known() {
            warn!("skipping binding for unknown key {key:?}");
            continue;
        }

        let next_table = next_table_of(command);
        let table = model.key_table_mut(table);
        table.binds.insert(
            code,
            KeyBinding {
                code,
                command: command.to_string(),
                repeat,
                next_table,
            },
        );
    }
}

/// The table a binding transitions into: `switch-client -T x` names it,
/// everything else drops back to root.
fn next_table_of(command: &str) -> String {
    let mut tokens = command.split_whitespace();
    if tokens.next() == Some("switch-client")
        && tokens.next() == Some("-T")
        && let Some(table) = tokens.next()
    {
        return table.to_string();
    }
    "root".to_string()
}

/// Parse a session prefix option value into a key code. An unset or
/// unparseable option maps to no prefix rather than an error.
#[must_use]
pub fn resolve_prefix(value: &str) -> KeyCode {
    if value.is_empty() {
        return KeyCode::NONE;
    }
    keys::lookup(value)
}

// ---------------------------------------------------------------------
// Option query composition
// ---------------------------------------------------------------------

/// What a `show-options` query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTarget {
    Server,
    Session(SessionId),
    GlobalSession,
    Window(WindowId),
    GlobalWindow,
}

/// Compose the argv for `show-options -v…` against `target`.
#[must_use]
pub fn show_options_args(name: &str, target: OptionTarget) -> Vec<String> {
    let mut args = vec!["show-options".to_string()];
    match target {
        OptionTarget::Server => args.push("-vs".into()),
        OptionTarget::GlobalSession => args.push("-vg".into()),
        OptionTarget::Session(id) => {
            args.push("-vt".into());
            args.push(id.to_string());
        }
        OptionTarget::GlobalWindow => args.push("-vwg".into()),
        OptionTarget::Window(id) => {
            args.push("-vwt".into());
            args.push(id.to_string());
        }
    }
    args.push(name.to_string());
    args
}

/// Strip the single trailing newline tmux prints after an option value.
#[must_use]
pub fn trim_option(value: &str) -> &str {
    value.strip_suffix('\n').unwrap_or(value)
}
