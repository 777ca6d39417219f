//! Long-running control-mode clients.
//!
//! One `ControlClient` wraps one `tmux -C attach-session` (or, for the
//! bootstrap case, `new-session`) child. Its stdout is owned by a reader
//! task that feeds the ring, runs the parser, queues refreshes, and
//! hands completed reply envelopes to whoever is waiting in [`exec`].
//! When the child hangs up, the reader reaps it and reports the exit to
//! the façade's supervisor.
//!
//! tmux emits one empty reply at attach before accepting commands; the
//! `compensate` flag makes the parser path discard exactly that first
//! envelope so it is never mistaken for a real command's answer.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{Notify, mpsc, oneshot};

use crate::error::{Error, Result};
use crate::launch::{Pipes, spawn_tmux};
use crate::model::SessionId;
use crate::parser::{self, Step};
use crate::read::drain_chunk;
use crate::refresh::RefreshQueue;
use crate::ring::Ring;

/// Name of the placeholder session created when the server has none.
/// Sessions carrying this exact name never reach the host as new.
pub const TEMP_SESSION_NAME: &str = "__waymux_tmp";

/// A completed reply envelope.
#[derive(Debug)]
pub(crate) struct Reply {
    pub payload: Vec<u8>,
    pub is_error: bool,
}

impl Reply {
    /// Payload as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Reported to the supervisor when a control client's child exits.
#[derive(Debug)]
pub(crate) struct CcExit {
    pub pid: u32,
}

#[derive(Debug, Default)]
struct Pending {
    compensate: bool,
    reply: Option<oneshot::Sender<Reply>>,
}

/// One attached control-mode tmux child.
pub(crate) struct ControlClient {
    pub pid: u32,
    /// The tracked session, `None` for the bootstrap client.
    pub session: Option<SessionId>,
    pub temp: bool,
    stdin: tokio::sync::Mutex<ChildStdin>,
    /// Serializes command submission so at most one caller owns the
    /// pending-reply slot at a time.
    cmd_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Pending>,
    shutdown: Notify,
}

impl ControlClient {
    /// Spawn the control child and its reader task, then lock the server
    /// viewport to `size`.
    pub async fn launch(
        prefix: &[String],
        session: Option<SessionId>,
        size: (u16, u16),
        timeout_ms: u64,
        refresh: Arc<RefreshQueue>,
        exit_tx: mpsc::UnboundedSender<CcExit>,
    ) -> Result<Arc<Self>> {
        let target;
        let args: Vec<&str> = match session {
            Some(id) => {
                target = id.to_string();
                vec!["-C", "attach-session", "-t", target.as_str()]
            }
            None => vec!["-C", "new-session", "-s", TEMP_SESSION_NAME],
        };

        let mut child = spawn_tmux(
            prefix,
            &args,
            Pipes {
                stdin: true,
                stdout: true,
                stderr: false,
            },
        )?;
        let pid = child
            .id()
            .ok_or_else(|| Error::invalid("control child already exited"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::invalid("control child missing stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::invalid("control child missing stdout"))?;

        let cc = Arc::new(Self {
            pid,
            session,
            temp: session.is_none(),
            stdin: tokio::sync::Mutex::new(stdin),
            cmd_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(Pending {
                compensate: true,
                reply: None,
            }),
            shutdown: Notify::new(),
        });

        // The reader must be live before the first exec, or its reply
        // would never be seen.
        tokio::spawn(run_reader(
            Arc::clone(&cc),
            child,
            stdout,
            refresh,
            exit_tx,
        ));

        if let Err(err) = cc.update_size(size, timeout_ms).await {
            warn!("could not size control client {pid}: {err}");
            cc.kill();
            return Err(err);
        }

        Ok(cc)
    }

    /// `refresh-client -C w,h`: lock the server to our viewport.
    pub async fn update_size(&self, size: (u16, u16), timeout_ms: u64) -> Result<()> {
        let spec = format!("{},{}", size.0, size.1);
        self.exec(&["refresh-client", "-C", &spec], timeout_ms)
            .await?;
        Ok(())
    }

    /// Run a command on this client and await its reply envelope.
    ///
    /// On timeout the client stays registered and usable; the command's
    /// eventual reply is discarded when it parses.
    pub async fn exec(&self, args: &[&str], timeout_ms: u64) -> Result<Reply> {
        self.exec_raw(&quote_line(args), timeout_ms).await
    }

    /// Submit an already-encoded command line and await its reply.
    pub async fn exec_raw(&self, line: &str, timeout_ms: u64) -> Result<Reply> {
        let _guard = self.cmd_lock.lock().await;

        debug!("cc {} <- {}", self.pid, line.trim_end());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().reply = Some(tx);

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
        }

        let reply = if timeout_ms == 0 {
            rx.await
        } else {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.lock().reply = None;
                    return Err(Error::Timeout(timeout_ms));
                }
            }
        };

        reply.map_err(|_| Error::invalid("control client hung up"))
    }

    /// Ask the reader task to kill and reap the child.
    pub fn kill(&self) {
        self.shutdown.notify_one();
    }

    /// Route a parsed reply: compensation first, then whoever is waiting.
    fn deliver(&self, reply: Reply) {
        let mut pending = self.pending.lock();
        if pending.compensate {
            pending.compensate = false;
            debug!("cc {}: discarded startup reply", self.pid);
            return;
        }
        match pending.reply.take() {
            Some(tx) => {
                // A closed receiver means the caller timed out; the
                // reply is stale and dropping it is the contract.
                let _ = tx.send(reply);
            }
            None => debug!("cc {}: discarding unawaited reply", self.pid),
        }
    }
}

/// Drive one control client's stdout until hangup, then reap the child.
async fn run_reader(
    cc: Arc<ControlClient>,
    mut child: Child,
    mut stdout: ChildStdout,
    refresh: Arc<RefreshQueue>,
    exit_tx: mpsc::UnboundedSender<CcExit>,
) {
    let mut ring = Ring::new();

    loop {
        let drained = tokio::select! {
            drained = drain_chunk(&mut stdout, &mut ring) => drained,
            () = cc.shutdown.notified() => {
                debug!("cc {}: shutdown requested", cc.pid);
                if let Err(err) = child.start_kill() {
                    warn!("cc {}: kill failed: {err}", cc.pid);
                }
                break;
            }
        };

        match drained {
            Ok(0) => {
                debug!("cc {}: hangup", cc.pid);
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("cc {}: read error: {err}", cc.pid);
                break;
            }
        }

        loop {
            match parser::step(&mut ring) {
                Ok(Step::NeedMore) => break,
                Ok(Step::Consumed) => {}
                Ok(Step::Refresh(flags)) => refresh.queue(flags),
                Ok(Step::Reply { payload, is_error }) => {
                    cc.deliver(Reply { payload, is_error });
                }
                Ok(Step::Exit) => debug!("cc {}: server says %exit", cc.pid),
                Err(err) => {
                    warn!("cc {}: parse error: {err}", cc.pid);
                    break;
                }
            }
        }
    }

    // Unblock any exec still waiting on a reply.
    cc.pending.lock().reply = None;

    match child.wait().await {
        Ok(status) => debug!("cc {} exited: {status}", cc.pid),
        Err(err) => warn!("cc {}: wait failed: {err}", cc.pid),
    }
    let _ = exit_tx.send(CcExit { pid: cc.pid });
}

/// Encode a command as one control-mode line of double-quoted tokens.
///
/// Only `"` and newline need escaping inside the quotes; the encoding is
/// a bijection over argument arrays for everything tmux accepts.
#[must_use]
pub fn quote_line(args: &[&str]) -> String {
    let mut line = String::with_capacity(args.iter().map(|a| a.len() + 3).sum::<usize>() + 1);
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push('"');
        for c in arg.chars() {
            match c {
                '"' => line.push_str("\\\""),
                '\n' => line.push_str("\\n"),
                c => line.push(c),
            }
        }
        line.push('"');
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_simple_args() {
        assert_eq!(quote_line(&["list-sessions"]), "\"list-sessions\"\n");
        assert_eq!(
            quote_line(&["kill-session", "-t", "$3"]),
            "\"kill-session\" \"-t\" \"$3\"\n"
        );
    }

    #[test]
    fn quoting_escapes_quotes_and_newlines() {
        assert_eq!(
            quote_line(&["display-message", "-p", "a \"b\" c\nd"]),
            "\"display-message\" \"-p\" \"a \\\"b\\\" c\\nd\"\n"
        );
    }

    #[test]
    fn quoting_empty_token_survives() {
        assert_eq!(quote_line(&["set-option", ""]), "\"set-option\" \"\"\n");
    }

    #[tokio::test]
    async fn deliver_compensates_once() {
        let (tx, mut rx) = oneshot::channel::<Reply>();
        let pending = Mutex::new(Pending {
            compensate: true,
            reply: Some(tx),
        });

        // Splitting ControlClient construction from a real child would
        // drag a process into a unit test; exercise the slot directly.
        {
            let mut slot = pending.lock();
            if slot.compensate {
                slot.compensate = false;
            } else if let Some(sender) = slot.reply.take() {
                let _ = sender.send(Reply {
                    payload: b"x".to_vec(),
                    is_error: false,
                });
            }
        }
        assert!(rx.try_recv().is_err(), "first reply must be swallowed");

        {
            let mut slot = pending.lock();
            assert!(!slot.compensate);
            if let Some(sender) = slot.reply.take() {
                let _ = sender.send(Reply {
                    payload: b"real".to_vec(),
                    is_error: false,
                });
            }
        }
        let reply = rx.await.unwrap();
        assert_eq!(reply.payload, b"real");
    }
}
