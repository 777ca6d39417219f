//! Launching tmux processes.
//!
//! Two flavors exist: long-running control clients (stdin and stdout
//! piped, owned by `cc`) and one-shot commands whose output we collect
//! after they exit. Both are built from the same argv prefix computed at
//! connect time.

use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::read::read_to_end_sanitized;

/// Which stdio streams the caller wants piped back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipes {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

/// Spawn tmux with `prefix + args`.
///
/// Streams not requested in `pipes` are redirected to the null device so
/// a chatty tmux can never block on our side.
pub fn spawn_tmux(prefix: &[String], args: &[&str], pipes: Pipes) -> Result<Child> {
    let (bin, rest) = prefix
        .split_first()
        .ok_or_else(|| Error::invalid("empty argv prefix"))?;

    debug!("spawning {bin} {rest:?} {args:?}");

    let mut command = Command::new(bin);
    command
        .args(rest)
        .args(args)
        .stdin(if pipes.stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(if pipes.stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(if pipes.stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    Ok(command.spawn()?)
}

/// Wait for `child` under the configured ceiling. On timeout the child
/// is killed and reaped before the error is returned, so no zombie
/// outlives the call.
pub async fn wait_bounded(child: &mut Child, timeout_ms: u64) -> Result<std::process::ExitStatus> {
    if timeout_ms == 0 {
        return Ok(child.wait().await?);
    }

    match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!("tmux child unresponsive after {timeout_ms} ms, killing");
            child.start_kill()?;
            child.wait().await?;
            Err(Error::Timeout(timeout_ms))
        }
    }
}

/// Output of a one-shot tmux invocation.
#[derive(Debug, Default)]
pub struct ExecOutput {
    /// Child exit code (0 on clean exit).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `prefix + args` to completion and collect its output.
pub async fn exec_oneshot(prefix: &[String], args: &[&str], timeout_ms: u64) -> Result<ExecOutput> {
    let mut child = spawn_tmux(
        prefix,
        args,
        Pipes {
            stdin: false,
            stdout: true,
            stderr: true,
        },
    )?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain concurrently with the wait; tmux output is tiny but a filled
    // pipe must never deadlock the bounded wait.
    let (status, out, err) = tokio::join!(
        wait_bounded(&mut child, timeout_ms),
        async {
            match stdout.as_mut() {
                Some(stream) => read_to_end_sanitized(stream).await,
                None => Ok(String::new()),
            }
        },
        async {
            match stderr.as_mut() {
                Some(stream) => read_to_end_sanitized(stream).await,
                None => Ok(String::new()),
            }
        },
    );

    let status = status?;
    Ok(ExecOutput {
        status: status.code().unwrap_or(-1),
        stdout: out.unwrap_or_default(),
        stderr: err.unwrap_or_default(),
    })
}

/// Check `tmux -V` output against the minimum supported server.
///
/// Accepts the literal `master` (and tmux's `next-X.Y` development
/// names) or any dotted version newer than 2.4. The comparison is a
/// proper dotted-integer one, so 2.10 correctly outranks 2.4.
pub fn check_version(output: &str) -> Result<()> {
    let raw = output
        .trim_end()
        .rsplit(' ')
        .next()
        .unwrap_or("")
        .to_string();
    if raw.is_empty() {
        return Err(Error::parse(format!("bad tmux -V output {output:?}")));
    }

    if raw == "master" || raw.starts_with("next-") {
        return Ok(());
    }

    let mut parts = raw.split('.').map(|part| {
        // "3" from "3", "4a" -> 4: trailing letter suffixes are release
        // tags, not version components.
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<u32>().ok()
    });

    let major = parts.next().flatten();
    let minor = parts.next().flatten().unwrap_or(0);
    let Some(major) = major else {
        return Err(Error::parse(format!("unparseable tmux version {raw:?}")));
    };

    // Strictly newer than 2.4.
    if major > 2 || (major == 2 && minor > 4) {
        Ok(())
    } else {
        Err(Error::VersionTooOld(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gate_accepts_new_enough() {
        check_version("tmux 2.5").unwrap();
        check_version("tmux 3.4").unwrap();
        check_version("tmux 3.3a").unwrap();
        check_version("tmux master").unwrap();
        check_version("tmux next-3.4").unwrap();
        // The classic float-comparison trap.
        check_version("tmux 2.10").unwrap();
    }

    #[test]
    fn version_gate_rejects_old() {
        assert!(matches!(
            check_version("tmux 2.3"),
            Err(Error::VersionTooOld(_))
        ));
        assert!(matches!(
            check_version("tmux 2.4"),
            Err(Error::VersionTooOld(_))
        ));
        assert!(matches!(
            check_version("tmux 1.9a"),
            Err(Error::VersionTooOld(_))
        ));
    }

    #[test]
    fn version_gate_rejects_garbage() {
        assert!(check_version("").is_err());
        assert!(check_version("tmux").is_err());
        assert!(check_version("tmux x.y").is_err());
    }

    #[tokio::test]
    async fn oneshot_collects_output() {
        let prefix = vec!["/bin/echo".to_string()];
        let output = exec_oneshot(&prefix, &["hello", "world"], 5000).await.unwrap();
        assert_eq!(output.status, 0);
        assert_eq!(output.stdout, "hello world\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn oneshot_reports_exit_status() {
        let prefix = vec!["/bin/sh".to_string(), "-c".to_string()];
        let output = exec_oneshot(&prefix, &["exit 3"], 5000).await.unwrap();
        assert_eq!(output.status, 3);
    }

    #[tokio::test]
    async fn bounded_wait_kills_stuck_children() {
        let prefix = vec!["/bin/sleep".to_string()];
        let err = exec_oneshot(&prefix, &["30"], 50).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(50)));
    }

    #[tokio::test]
    async fn zero_timeout_means_no_ceiling() {
        let prefix = vec!["/bin/sh".to_string(), "-c".to_string()];
        let output = exec_oneshot(&prefix, &["sleep 0.05; echo done"], 0)
            .await
            .unwrap();
        assert_eq!(output.stdout, "done\n");
    }
}
