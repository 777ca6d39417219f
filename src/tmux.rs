//! The public façade.
//!
//! A [`Tmux`] value is a cheap cloneable handle onto the tracking core:
//! configuration, the shadow model, the control-client list, and the two
//! background tasks (refresh coordinator and child supervisor). Hosts
//! configure it, install an [`EventHandler`], call [`Tmux::connect`],
//! and from then on read the model through the lookup accessors while
//! change events arrive on the handler.
//!
//! Connecting checks the server version, then runs a full sessions
//! reload; a control client is attached to every session found (via the
//! `NewSession` dispatch path), or a temporary bootstrap session is
//! created when the server has none.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cc::{CcExit, ControlClient, Reply};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Event, EventHandler};
use crate::keys::KeyTable;
use crate::launch::{self, ExecOutput};
use crate::model::{Client, Model, Pane, PaneId, Session, SessionId, Window, WindowId};
use crate::refresh::{RefreshFlags, RefreshQueue};
use crate::reload::{self, OptionTarget};

/// Handle to the tmux tracking core.
#[derive(Clone)]
pub struct Tmux {
    inner: Arc<Inner>,
}

struct Inner {
    config: Mutex<Config>,
    /// argv prefix frozen for the duration of a connect cycle.
    prefix: Mutex<Vec<String>>,
    connected: AtomicBool,
    model: Mutex<Model>,
    ccs: Mutex<Vec<Arc<ControlClient>>>,
    refresh: Arc<RefreshQueue>,
    handler: Mutex<Box<dyn EventHandler>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    exit_tx: Mutex<Option<mpsc::UnboundedSender<CcExit>>>,
}

impl Default for Tmux {
    fn default() -> Self {
        Self::new()
    }
}

impl Tmux {
    /// Create a disconnected core with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                config: Mutex::new(Config::default()),
                prefix: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                model: Mutex::new(Model::default()),
                ccs: Mutex::new(Vec::new()),
                refresh: Arc::new(RefreshQueue::new()),
                handler: Mutex::new(Box::new(crate::events::NullHandler)),
                tasks: Mutex::new(Vec::new()),
                exit_tx: Mutex::new(None),
            }),
        }
    }

    // -----------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------

    /// Install the host's event handler. May be swapped at any time;
    /// events queued in a running pass still go to the handler installed
    /// when dispatch reaches them.
    pub fn set_handler(&self, handler: Box<dyn EventHandler>) {
        *self.inner.handler.lock() = handler;
    }

    /// Set the tmux binary. Fails with [`Error::Busy`] while connected.
    pub fn set_bin_file(&self, path: Option<std::path::PathBuf>) -> Result<()> {
        self.locked_config(|config| {
            config.bin = path;
            Ok(())
        })
    }

    /// Select the server by `-L` socket name; clears any socket path.
    pub fn set_socket_name(&self, name: Option<String>) -> Result<()> {
        self.locked_config(|config| {
            config.set_socket_name(name);
            Ok(())
        })
    }

    /// Select the server by `-S` socket path; clears any socket name.
    pub fn set_socket_path(&self, path: Option<std::path::PathBuf>) -> Result<()> {
        self.locked_config(|config| {
            config.set_socket_path(path);
            Ok(())
        })
    }

    /// Set the `-f` configuration file.
    pub fn set_config_file(&self, path: Option<std::path::PathBuf>) -> Result<()> {
        self.locked_config(|config| {
            config.config_file = path;
            Ok(())
        })
    }

    /// Bounded-wait ceiling in milliseconds, 0 for none. Takes effect
    /// immediately, connected or not.
    pub fn set_timeout(&self, timeout_ms: u64) {
        self.inner.config.lock().timeout_ms = timeout_ms;
    }

    #[must_use]
    pub fn timeout(&self) -> u64 {
        self.inner.config.lock().timeout_ms
    }

    /// Resize the virtual viewport. While connected this pushes the new
    /// size to every control client before returning.
    pub async fn set_size(&self, w: u16, h: u16) -> Result<()> {
        let (size, timeout_ms) = {
            let mut config = self.inner.config.lock();
            if config.size == (w, h) {
                return Ok(());
            }
            config.set_size(w, h)?;
            (config.size, config.timeout_ms)
        };

        if !self.is_connected() {
            return Ok(());
        }
        let ccs: Vec<Arc<ControlClient>> = self.inner.ccs.lock().clone();
        for cc in ccs {
            cc.update_size(size, timeout_ms).await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        self.inner.config.lock().size
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn locked_config(&self, apply: impl FnOnce(&mut Config) -> Result<()>) -> Result<()> {
        if self.is_connected() {
            return Err(Error::Busy);
        }
        apply(&mut self.inner.config.lock())
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Attach to the server: gate on its version, load the whole model,
    /// and start tracking.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::invalid("already connected"));
        }

        let (prefix, timeout_ms) = {
            let config = self.inner.config.lock();
            (config.argv_prefix(), config.timeout_ms)
        };
        *self.inner.prefix.lock() = prefix.clone();

        let version = launch::exec_oneshot(&prefix, &["-V"], timeout_ms).await?;
        if version.status != 0 {
            return Err(Error::Exited(version.status));
        }
        launch::check_version(&version.stdout)?;

        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        *self.inner.exit_tx.lock() = Some(exit_tx);
        self.inner.connected.store(true, Ordering::SeqCst);

        // Initial load runs inline so connect's caller sees its errors.
        self.inner.refresh.queue(RefreshFlags::SESSIONS);
        if let Err(err) = self.inner.run_pass().await {
            self.disconnect().await;
            return Err(err);
        }

        let mut tasks = self.inner.tasks.lock();
        tasks.push(tokio::spawn(run_coordinator(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.refresh),
        )));
        tasks.push(tokio::spawn(run_supervisor(
            Arc::downgrade(&self.inner),
            exit_rx,
        )));
        Ok(())
    }

    /// Detach from the server: cull our bootstrap session if present,
    /// stop every control client, and clear the model.
    pub async fn disconnect(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }

        let timeout_ms = self.inner.config.lock().timeout_ms;
        let ccs: Vec<Arc<ControlClient>> = self.inner.ccs.lock().drain(..).collect();
        for cc in &ccs {
            // The bootstrap session dies with us; real sessions just
            // lose their watcher.
            let goodbye = if cc.temp { "kill-session" } else { "detach-client" };
            if let Err(err) = cc.exec(&[goodbye], timeout_ms).await {
                warn!("cc {}: {goodbye} failed: {err}", cc.pid);
            }
        }
        for cc in &ccs {
            cc.kill();
        }

        *self.inner.exit_tx.lock() = None;
        self.inner.model.lock().clear();
        let _ = self.inner.refresh.take();
    }

    // -----------------------------------------------------------------
    // Command execution
    // -----------------------------------------------------------------

    /// Run a tmux command, preferring an existing control client over a
    /// fresh process. Returns the exit status with collected stdout and
    /// stderr.
    pub async fn exec(&self, args: &[&str]) -> Result<ExecOutput> {
        self.inner.exec(args).await
    }

    /// Run a raw command line on the control client attached to
    /// `session`. The text is passed to tmux untokenized.
    pub async fn session_exec(&self, session: SessionId, text: &str) -> Result<ExecOutput> {
        let timeout_ms = self.inner.config.lock().timeout_ms;
        let cc = self
            .inner
            .cc_for(|cc| cc.session == Some(session))
            .ok_or_else(|| Error::invalid(format!("session {session} has no control client")))?;

        let mut line = text.trim_end_matches('\n').to_string();
        line.push('\n');
        let reply = cc.exec_raw(&line, timeout_ms).await?;
        Ok(reply_to_output(&reply))
    }

    // -----------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------

    /// Snapshot one session.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.inner.model.lock().sessions.get(&id).cloned()
    }

    /// Snapshot every session, ordered by id.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        let model = self.inner.model.lock();
        let mut sessions: Vec<Session> = model.sessions.values().cloned().collect();
        sessions.sort_by_key(|session| session.id);
        sessions
    }

    #[must_use]
    pub fn window(&self, id: WindowId) -> Option<Window> {
        self.inner.model.lock().windows.get(&id).cloned()
    }

    #[must_use]
    pub fn pane(&self, id: PaneId) -> Option<Pane> {
        self.inner.model.lock().panes.get(&id).cloned()
    }

    #[must_use]
    pub fn client(&self, name: &str) -> Option<Client> {
        self.inner.model.lock().clients.get(name).cloned()
    }

    #[must_use]
    pub fn key_table(&self, name: &str) -> Option<KeyTable> {
        self.inner.model.lock().key_tables.get(name).cloned()
    }

    /// Schedule reloads by hand, as if the matching notifications had
    /// arrived. Mostly useful to force a resync after a suspected miss.
    pub fn queue_refresh(&self, flags: RefreshFlags) {
        self.inner.refresh.queue(flags);
    }
}

fn reply_to_output(reply: &Reply) -> ExecOutput {
    let text = reply.text();
    if reply.is_error {
        ExecOutput {
            status: 1,
            stdout: String::new(),
            stderr: text,
        }
    } else {
        ExecOutput {
            status: 0,
            stdout: text,
            stderr: String::new(),
        }
    }
}

/// Coalescing refresh loop: every burst of queued flags becomes one
/// pass.
async fn run_coordinator(inner: std::sync::Weak<Inner>, refresh: Arc<RefreshQueue>) {
    loop {
        refresh.wait().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Err(err) = inner.run_pass().await {
            warn!("refresh pass failed: {err}");
        }
    }
}

/// Child supervisor: unlink exited control clients; when the last real
/// one goes, the server may have restarted under us, so resync from the
/// sessions down.
async fn run_supervisor(inner: std::sync::Weak<Inner>, mut exit_rx: mpsc::UnboundedReceiver<CcExit>) {
    while let Some(exit) = exit_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut ccs = inner.ccs.lock();
        let before = ccs.iter().any(|cc| !cc.temp);
        ccs.retain(|cc| cc.pid != exit.pid);
        let after = ccs.iter().any(|cc| !cc.temp);
        drop(ccs);

        debug!("control client {} exited", exit.pid);
        if before && !after {
            inner.refresh.queue(RefreshFlags::SESSIONS);
        }
    }
}

impl Inner {
    fn cc_for(&self, select: impl Fn(&ControlClient) -> bool) -> Option<Arc<ControlClient>> {
        self.ccs.lock().iter().find(|cc| select(cc.as_ref())).cloned()
    }

    async fn exec(&self, args: &[&str]) -> Result<ExecOutput> {
        let timeout_ms = self.config.lock().timeout_ms;

        if let Some(cc) = self.cc_for(|cc| !cc.temp) {
            let reply = cc.exec(args, timeout_ms).await?;
            return Ok(reply_to_output(&reply));
        }

        let prefix = {
            let prefix = self.prefix.lock();
            if prefix.is_empty() {
                self.config.lock().argv_prefix()
            } else {
                prefix.clone()
            }
        };
        launch::exec_oneshot(&prefix, args, timeout_ms).await
    }

    /// Run a command whose non-zero exit is routine (no server yet);
    /// only real transport errors surface.
    async fn exec_swallow(&self, args: &[&str]) -> Result<String> {
        let output = self.exec(args).await?;
        if output.status != 0 {
            debug!("{args:?} exited {}; treating as empty", output.status);
            return Ok(String::new());
        }
        Ok(output.stdout)
    }

    async fn get_option(&self, name: &str, target: OptionTarget) -> Result<String> {
        let args = reload::show_options_args(name, target);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&refs).await?;
        if output.status != 0 {
            return Err(Error::Exited(output.status));
        }
        Ok(reload::trim_option(&output.stdout).to_string())
    }

    // -----------------------------------------------------------------
    // Refresh passes
    // -----------------------------------------------------------------

    async fn run_pass(self: &Arc<Self>) -> Result<()> {
        let mut pending = self.refresh.take();
        if pending.is_empty() {
            return Ok(());
        }
        debug!("refresh pass: {pending:?}");

        let mut events = Vec::new();
        let outcome = self.run_reloads(&mut pending, &mut events).await;

        match outcome {
            Ok(()) => {
                self.dispatch(events).await;
                Ok(())
            }
            Err(err) => {
                // Whatever we did not get to runs next pass; the queued
                // events refer to a half-built view and are dropped.
                self.refresh.restore(pending);
                self.handler.lock().refresh_error(&err);
                Err(err)
            }
        }
    }

    /// The strict precedence order: sessions subsume everything,
    /// windows subsume panes, clients are independent.
    async fn run_reloads(
        self: &Arc<Self>,
        pending: &mut RefreshFlags,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        if pending.contains(RefreshFlags::SESSIONS) {
            self.reload_sessions(events).await?;
            *pending = RefreshFlags::empty();
            return Ok(());
        }

        if pending.contains(RefreshFlags::WINDOWS) {
            self.reload_windows(events).await?;
            pending.remove(RefreshFlags::WINDOWS | RefreshFlags::PANES);
        } else if pending.contains(RefreshFlags::PANES) {
            self.reload_panes(events).await?;
            pending.remove(RefreshFlags::PANES);
        }

        if pending.contains(RefreshFlags::CLIENTS) {
            self.reload_clients(events).await?;
            pending.remove(RefreshFlags::CLIENTS);
        }

        Ok(())
    }

    async fn reload_sessions(self: &Arc<Self>, events: &mut Vec<Event>) -> Result<()> {
        let out = self
            .exec_swallow(&["list-sessions", "-F", reload::SESSION_FORMAT])
            .await?;
        let rows = reload::parse_session_rows(&out)?;
        {
            let mut model = self.model.lock();
            reload::sync_sessions(&mut model, &rows, events);
        }

        if !rows.is_empty() {
            let global = self.global_statusbar().await?;
            let ids: Vec<SessionId> = self.model.lock().sessions.keys().copied().collect();
            for id in ids {
                let status = self.get_option("status", OptionTarget::Session(id)).await?;
                let position = self
                    .get_option("status-position", OptionTarget::Session(id))
                    .await?;
                let statusbar = reload::resolve_statusbar(&status, &position, global)?;

                let prefix = self.get_option("prefix", OptionTarget::Session(id)).await?;
                let prefix2 = self.get_option("prefix2", OptionTarget::Session(id)).await?;

                if let Some(session) = self.model.lock().sessions.get_mut(&id) {
                    session.statusbar = statusbar;
                    session.prefix = reload::resolve_prefix(&prefix);
                    session.prefix2 = reload::resolve_prefix(&prefix2);
                }
            }
        }

        self.reload_windows(events).await?;
        self.reload_clients(events).await?;

        let binds = self.exec_swallow(&["list-keys"]).await?;
        reload::sync_binds(&mut self.model.lock(), &binds);

        // An empty server still needs one control client watching it.
        let empty = self.model.lock().sessions.is_empty();
        if empty {
            self.cc_launch(None).await?;
        }
        Ok(())
    }

    /// Global `status` and `status-position`, both mandatory values.
    async fn global_statusbar(self: &Arc<Self>) -> Result<(bool, bool)> {
        let status = self
            .get_option("status", OptionTarget::GlobalSession)
            .await?;
        let on = match status.as_str() {
            "on" => true,
            "off" => false,
            other => return Err(Error::invalid(format!("bad global status {other:?}"))),
        };

        let position = self
            .get_option("status-position", OptionTarget::GlobalSession)
            .await?;
        let top = match position.as_str() {
            "top" => true,
            "bottom" => false,
            other => {
                return Err(Error::invalid(format!(
                    "bad global status-position {other:?}"
                )));
            }
        };
        Ok((on, top))
    }

    async fn reload_windows(self: &Arc<Self>, events: &mut Vec<Event>) -> Result<()> {
        let out = self
            .exec_swallow(&["list-windows", "-aF", reload::WINDOW_FORMAT])
            .await?;
        let rows = reload::parse_window_rows(&out)?;
        reload::sync_windows(&mut self.model.lock(), &rows, events)?;

        self.reload_panes(events).await
    }

    async fn reload_panes(self: &Arc<Self>, events: &mut Vec<Event>) -> Result<()> {
        let out = self
            .exec_swallow(&["list-panes", "-aF", reload::PANE_FORMAT])
            .await?;
        let rows = reload::parse_pane_rows(&out)?;
        reload::sync_panes(&mut self.model.lock(), &rows, events)?;

        let layouts = self
            .exec_swallow(&["list-windows", "-aF", reload::LAYOUT_FORMAT])
            .await?;
        reload::apply_layouts(&mut self.model.lock(), layouts.lines(), events)
    }

    async fn reload_clients(self: &Arc<Self>, events: &mut Vec<Event>) -> Result<()> {
        let out = self
            .exec_swallow(&["list-clients", "-F", reload::CLIENT_FORMAT])
            .await?;
        let rows = reload::parse_client_rows(&out)?;
        reload::sync_clients(&mut self.model.lock(), &rows, events)
    }

    // -----------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------

    /// Invoke the queued events in order. A new session gets its control
    /// client attached *before* the host hears about it, so the host can
    /// immediately run commands against it from the callback.
    async fn dispatch(self: &Arc<Self>, events: Vec<Event>) {
        for event in events {
            if let Event::NewSession(session) = &event {
                if let Err(err) = self.cc_launch(Some(session.id)).await {
                    warn!("could not attach control client to {}: {err}", session.id);
                    return;
                }
            }

            let event = self.resolve(event);
            let result = event.dispatch(self.handler.lock().as_mut());
            if let Err(err) = result {
                debug!("event handler aborted dispatch: {err}");
                return;
            }
        }
    }

    /// Refresh an event's snapshot from the model. Queued snapshots can
    /// predate later stages of the same pass (a new pane's geometry
    /// arrives in the layout stage, after its `NewPane` was queued);
    /// dispatch-time resolution hands the host the finished entity.
    fn resolve(&self, event: Event) -> Event {
        let model = self.model.lock();
        match event {
            Event::NewSession(s) => {
                Event::NewSession(model.sessions.get(&s.id).cloned().unwrap_or(s))
            }
            Event::SessionWindowChanged(s) => {
                Event::SessionWindowChanged(model.sessions.get(&s.id).cloned().unwrap_or(s))
            }
            Event::NewWindow(w) => Event::NewWindow(model.windows.get(&w.id).cloned().unwrap_or(w)),
            Event::WindowPaneChanged(w) => {
                Event::WindowPaneChanged(model.windows.get(&w.id).cloned().unwrap_or(w))
            }
            Event::NewPane(p) => Event::NewPane(model.panes.get(&p.id).cloned().unwrap_or(p)),
            Event::PaneResized(p) => {
                Event::PaneResized(model.panes.get(&p.id).cloned().unwrap_or(p))
            }
            Event::PaneModeChanged(p) => {
                Event::PaneModeChanged(model.panes.get(&p.id).cloned().unwrap_or(p))
            }
            Event::ClientSessionChanged(c) => {
                Event::ClientSessionChanged(model.clients.get(&c.name).cloned().unwrap_or(c))
            }
            closed @ (Event::SessionClosed(_) | Event::WindowClosed(_) | Event::PaneClosed(_)) => {
                closed
            }
        }
    }

    // -----------------------------------------------------------------
    // Control-client management
    // -----------------------------------------------------------------

    /// Attach a control client to `session`, or start the bootstrap
    /// session when `None`. Inserting a real client into a non-empty
    /// list first kills any bootstrap session still around.
    async fn cc_launch(self: &Arc<Self>, session: Option<SessionId>) -> Result<()> {
        let (prefix, size, timeout_ms) = {
            let config = self.config.lock();
            (self.prefix.lock().clone(), config.size, config.timeout_ms)
        };
        let exit_tx = self
            .exit_tx
            .lock()
            .clone()
            .ok_or_else(|| Error::invalid("not connected"))?;

        if session.is_none() && self.cc_for(|cc| cc.temp).is_some() {
            debug!("bootstrap control client already running");
            return Ok(());
        }

        let cc = ControlClient::launch(
            &prefix,
            session,
            size,
            timeout_ms,
            Arc::clone(&self.refresh),
            exit_tx,
        )
        .await?;

        if session.is_some() {
            let temps: Vec<Arc<ControlClient>> = self
                .ccs
                .lock()
                .iter()
                .filter(|cc| cc.temp)
                .cloned()
                .collect();
            for temp in temps {
                debug!("killing bootstrap session via cc {}", temp.pid);
                if let Err(err) = temp.exec(&["kill-session"], timeout_ms).await {
                    warn!("could not kill bootstrap session: {err}");
                }
            }
        }

        self.ccs.lock().push(cc);
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for cc in self.ccs.lock().drain(..) {
            cc.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_reject_while_connected() {
        let tmux = Tmux::new();
        tmux.inner.connected.store(true, Ordering::SeqCst);
        assert!(matches!(tmux.set_bin_file(None), Err(Error::Busy)));
        assert!(matches!(
            tmux.set_socket_name(Some("x".into())),
            Err(Error::Busy)
        ));
        assert!(matches!(
            tmux.set_socket_path(Some("/tmp/x".into())),
            Err(Error::Busy)
        ));
        assert!(matches!(tmux.set_config_file(None), Err(Error::Busy)));

        // Timeout may change at any time.
        tmux.set_timeout(50);
        assert_eq!(tmux.timeout(), 50);
    }

    #[tokio::test]
    async fn size_is_validated_disconnected() {
        let tmux = Tmux::new();
        assert!(tmux.set_size(5, 5).await.is_err());
        tmux.set_size(120, 40).await.unwrap();
        assert_eq!(tmux.size(), (120, 40));
    }

    #[test]
    fn lookups_on_empty_model() {
        let tmux = Tmux::new();
        assert!(tmux.session(SessionId(0)).is_none());
        assert!(tmux.window(WindowId(0)).is_none());
        assert!(tmux.pane(PaneId(0)).is_none());
        assert!(tmux.client("nope").is_none());
        assert!(tmux.key_table("root").is_none());
        assert!(tmux.sessions().is_empty());
    }

    #[tokio::test]
    async fn connect_rejects_missing_binary() {
        let tmux = Tmux::new();
        tmux.set_bin_file(Some("/nonexistent/definitely-not-tmux".into()))
            .unwrap();
        assert!(tmux.connect().await.is_err());
        assert!(!tmux.is_connected());
    }

    #[tokio::test]
    async fn connect_rejects_old_versions() {
        // A fake "tmux" that only answers -V.
        let script = "#!/bin/sh\necho 'tmux 2.3'\n";
        let dir = std::env::temp_dir().join(format!("waymux-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bin = dir.join("fake-tmux");
        std::fs::write(&bin, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let tmux = Tmux::new();
        tmux.set_bin_file(Some(bin)).unwrap();
        let err = tmux.connect().await.unwrap_err();
        assert!(matches!(err, Error::VersionTooOld(_)), "got {err:?}");
        assert!(!tmux.is_connected());
        assert!(tmux.inner.ccs.lock().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
