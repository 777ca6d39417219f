//! End-to-end tests against a real tmux server.
//!
//! These run only when a `tmux` binary is available; each test uses a
//! private `-L` socket so nothing touches the developer's own server.

use std::process::Command;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use waymux::{EventHandler, Session, SessionId, Tmux};

fn tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn socket_name(tag: &str) -> String {
    format!("waymux-test-{tag}-{}", std::process::id())
}

fn tmux_cmd(socket: &str, args: &[&str]) {
    let status = Command::new("tmux")
        .arg("-L")
        .arg(socket)
        .args(args)
        .status()
        .expect("run tmux");
    assert!(status.success(), "tmux -L {socket} {args:?} failed");
}

fn kill_server(socket: &str) {
    let _ = Command::new("tmux")
        .args(["-L", socket, "kill-server"])
        .status();
}

struct SessionWatcher {
    new_sessions: mpsc::Sender<Session>,
    closed_sessions: mpsc::Sender<SessionId>,
}

impl EventHandler for SessionWatcher {
    fn new_session(&mut self, session: &Session) -> waymux::Result<()> {
        let _ = self.new_sessions.send(session.clone());
        Ok(())
    }

    fn session_closed(&mut self, session: &Session) -> waymux::Result<()> {
        let _ = self.closed_sessions.send(session.id);
        Ok(())
    }
}

fn recv_within<T>(rx: &mpsc::Receiver<T>, what: &str) -> T {
    rx.recv_timeout(Duration::from_secs(10))
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

#[tokio::test]
async fn bootstrap_and_track_sessions() {
    if !tmux_available() {
        eprintln!("tmux not installed; skipping");
        return;
    }

    let socket = socket_name("bootstrap");
    kill_server(&socket);

    let (new_tx, new_rx) = mpsc::channel();
    let (closed_tx, closed_rx) = mpsc::channel();

    let tmux = Tmux::new();
    tmux.set_socket_name(Some(socket.clone())).unwrap();
    tmux.set_handler(Box::new(SessionWatcher {
        new_sessions: new_tx,
        closed_sessions: closed_tx,
    }));

    // No server is running: connect must bootstrap the temp session and
    // report nothing to the host.
    tmux.connect().await.unwrap();
    assert!(tmux.is_connected());
    assert!(
        new_rx.try_recv().is_err(),
        "bootstrap session must not look like a new session"
    );

    // A real session appearing externally fires exactly one NewSession,
    // and the bootstrap session is culled soon after.
    tmux_cmd(&socket, &["new-session", "-d", "-s", "work"]);
    let session = recv_within(&new_rx, "NewSession(work)");
    assert_eq!(session.name, "work");
    assert!(!session.windows.is_empty());

    // The temp session closing never surfaces as SessionClosed; give the
    // cull a moment, then make sure the model holds only `work`.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let sessions = tmux.sessions();
        if sessions.len() == 1 && sessions[0].name == "work" {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "temp session not culled: {sessions:?}"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(closed_rx.try_recv().is_err());

    // Killing the session reports it closed.
    tmux_cmd(&socket, &["kill-session", "-t", "work"]);
    let closed = recv_within(&closed_rx, "SessionClosed(work)");
    assert_eq!(closed, session.id);

    tmux.disconnect().await;
    kill_server(&socket);
}

#[tokio::test]
async fn panes_follow_splits() {
    if !tmux_available() {
        eprintln!("tmux not installed; skipping");
        return;
    }

    let socket = socket_name("split");
    kill_server(&socket);
    tmux_cmd(&socket, &["new-session", "-d", "-s", "main"]);

    let tmux = Tmux::new();
    tmux.set_socket_name(Some(socket.clone())).unwrap();
    tmux.connect().await.unwrap();

    let sessions = tmux.sessions();
    assert_eq!(sessions.len(), 1);
    let window = tmux.window(sessions[0].windows[0]).unwrap();
    assert_eq!(window.panes.len(), 1);
    let first = tmux.pane(window.panes[0]).unwrap();
    assert!(first.w > 0 && first.h > 0, "pane has real geometry");
    assert!(first.pid > 0);

    // Split through our own exec path and wait for the model to follow.
    let output = tmux.exec(&["split-window", "-t", "main", "-d"]).await.unwrap();
    assert_eq!(output.status, 0, "split failed: {}", output.stderr);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let window = tmux.window(sessions[0].windows[0]).unwrap();
        if window.panes.len() == 2 {
            let geometries: Vec<_> = window
                .panes
                .iter()
                .map(|id| tmux.pane(*id).unwrap())
                .collect();
            assert!(geometries.iter().all(|pane| pane.w > 0 && pane.h > 0));
            break;
        }
        assert!(Instant::now() < deadline, "split never showed up");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    tmux.disconnect().await;
    kill_server(&socket);
}

#[tokio::test]
async fn exec_quoting_survives_awkward_arguments() {
    if !tmux_available() {
        eprintln!("tmux not installed; skipping");
        return;
    }

    let socket = socket_name("quoting");
    kill_server(&socket);
    tmux_cmd(&socket, &["new-session", "-d", "-s", "q"]);

    let tmux = Tmux::new();
    tmux.set_socket_name(Some(socket.clone())).unwrap();
    tmux.connect().await.unwrap();

    let output = tmux
        .exec(&["display-message", "-p", "a \"b\" c"])
        .await
        .unwrap();
    assert_eq!(output.status, 0, "stderr: {}", output.stderr);
    assert_eq!(output.stdout.trim_end(), "a \"b\" c");

    tmux.disconnect().await;
    kill_server(&socket);
}
