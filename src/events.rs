//! Change events and the host-facing handler trait.
//!
//! Reload procedures queue events while diffing the shadow model; the
//! refresh coordinator dispatches the queue, in insertion order, once a
//! pass completes. Every event carries an entity snapshot: `*Closed`
//! events own the entity that was just removed from the model, the rest
//! carry clones, so handlers never observe the model mid-mutation.

use crate::error::Result;
use crate::model::{Client, Pane, Session, Window};

/// One queued change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    NewSession(Session),
    SessionClosed(Session),
    /// A session's active window changed.
    SessionWindowChanged(Session),
    NewWindow(Window),
    WindowClosed(Window),
    /// A window's active pane changed.
    WindowPaneChanged(Window),
    NewPane(Pane),
    PaneClosed(Pane),
    /// A pane's geometry changed (including its first real geometry).
    PaneResized(Pane),
    /// A pane entered or left a mode (copy mode and friends).
    PaneModeChanged(Pane),
    /// A client attached to a different session (or appeared).
    ClientSessionChanged(Client),
}

/// Host callbacks, one per event kind. Every method defaults to a no-op;
/// implement the ones the compositor cares about.
///
/// Returning an error from any handler aborts dispatch of the remaining
/// events queued in the same refresh pass.
#[allow(unused_variables)]
pub trait EventHandler: Send {
    fn new_session(&mut self, session: &Session) -> Result<()> {
        Ok(())
    }

    fn session_closed(&mut self, session: &Session) -> Result<()> {
        Ok(())
    }

    fn session_window_changed(&mut self, session: &Session) -> Result<()> {
        Ok(())
    }

    fn new_window(&mut self, window: &Window) -> Result<()> {
        Ok(())
    }

    fn window_closed(&mut self, window: &Window) -> Result<()> {
        Ok(())
    }

    fn window_pane_changed(&mut self, window: &Window) -> Result<()> {
        Ok(())
    }

    fn new_pane(&mut self, pane: &Pane) -> Result<()> {
        Ok(())
    }

    fn pane_closed(&mut self, pane: &Pane) -> Result<()> {
        Ok(())
    }

    fn pane_resized(&mut self, pane: &Pane) -> Result<()> {
        Ok(())
    }

    fn pane_mode_changed(&mut self, pane: &Pane) -> Result<()> {
        Ok(())
    }

    fn client_session_changed(&mut self, client: &Client) -> Result<()> {
        Ok(())
    }

    /// A refresh pass failed; the pass will be retried on the next
    /// trigger with its unprocessed flags intact.
    fn refresh_error(&mut self, error: &crate::error::Error) {}
}

impl Event {
    /// Route this event to the matching handler method.
    pub fn dispatch(&self, handler: &mut dyn EventHandler) -> Result<()> {
        match self {
            Self::NewSession(s) => handler.new_session(s),
            Self::SessionClosed(s) => handler.session_closed(s),
            Self::SessionWindowChanged(s) => handler.session_window_changed(s),
            Self::NewWindow(w) => handler.new_window(w),
            Self::WindowClosed(w) => handler.window_closed(w),
            Self::WindowPaneChanged(w) => handler.window_pane_changed(w),
            Self::NewPane(p) => handler.new_pane(p),
            Self::PaneClosed(p) => handler.pane_closed(p),
            Self::PaneResized(p) => handler.pane_resized(p),
            Self::PaneModeChanged(p) => handler.pane_mode_changed(p),
            Self::ClientSessionChanged(c) => handler.client_session_changed(c),
        }
    }
}

/// A no-op handler for hosts that only poll the model.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl EventHandler for NullHandler {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaneId, SessionId};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    impl EventHandler for Recorder {
        fn new_session(&mut self, _: &Session) -> Result<()> {
            self.seen.push("new_session");
            if self.fail_on == Some("new_session") {
                return Err(crate::error::Error::invalid("stop"));
            }
            Ok(())
        }

        fn new_pane(&mut self, _: &Pane) -> Result<()> {
            self.seen.push("new_pane");
            Ok(())
        }
    }

    #[test]
    fn dispatch_routes_by_variant() {
        let mut recorder = Recorder::default();
        let events = vec![
            Event::NewSession(Session::new(SessionId(1), "work")),
            Event::NewPane(Pane::new(PaneId(4), 100)),
        ];
        for event in &events {
            event.dispatch(&mut recorder).unwrap();
        }
        assert_eq!(recorder.seen, vec!["new_session", "new_pane"]);
    }

    #[test]
    fn default_methods_are_no_ops() {
        let mut null = NullHandler;
        Event::PaneResized(Pane::new(PaneId(1), 1))
            .dispatch(&mut null)
            .unwrap();
    }

    #[test]
    fn handler_error_propagates() {
        let mut recorder = Recorder {
            fail_on: Some("new_session"),
            ..Recorder::default()
        };
        let err = Event::NewSession(Session::new(SessionId(1), "work")).dispatch(&mut recorder);
        assert!(err.is_err());
    }
}
