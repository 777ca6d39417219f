//! Error types for the waymux crate.

use std::io;

/// Errors produced by the tmux tracking core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or contradictory arguments, or unparseable tmux output.
    #[error("invalid: {0}")]
    Invalid(String),

    /// A configuration setter was called while connected.
    #[error("configuration is frozen while connected")]
    Busy,

    /// An I/O failure from the pipes, the child processes, or the runtime.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A bounded wait elapsed before the child or reply arrived.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// The tmux server is too old for control mode tracking.
    #[error("unsupported tmux version {0:?}; need master or newer than 2.4")]
    VersionTooOld(String),

    /// Control-mode output or command output that does not match the
    /// expected grammar.
    #[error("parse error: {0}")]
    Parse(String),

    /// A one-shot tmux invocation exited non-zero where that matters.
    #[error("tmux exited with status {0}")]
    Exited(i32),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
