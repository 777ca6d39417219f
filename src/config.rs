//! Connection configuration and the tmux argv prefix.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default tmux binary when none is configured.
pub const DEFAULT_BIN: &str = "/usr/bin/tmux";

/// Default bounded-wait ceiling in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default virtual viewport of the control clients.
pub const DEFAULT_SIZE: (u16, u16) = (80, 24);

/// Smallest viewport tmux can usefully lay panes out in.
pub const MIN_DIMENSION: u16 = 10;

/// How waymux launches tmux and how long it waits for it.
///
/// Held by the façade; every setter there rejects changes while
/// connected, so a connect cycle always sees one consistent prefix.
#[derive(Debug, Clone)]
pub struct Config {
    /// tmux executable; `None` means [`DEFAULT_BIN`] at connect time.
    pub bin: Option<PathBuf>,
    /// `-L` socket name. Mutually exclusive with `socket_path`.
    pub socket_name: Option<String>,
    /// `-S` socket path. Mutually exclusive with `socket_name`.
    pub socket_path: Option<PathBuf>,
    /// `-f` configuration file.
    pub config_file: Option<PathBuf>,
    /// Ceiling for every bounded wait, in milliseconds. 0 = no timeout.
    pub timeout_ms: u64,
    /// Virtual (width, height) the control clients lock the server to.
    pub size: (u16, u16),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bin: None,
            socket_name: None,
            socket_path: None,
            config_file: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            size: DEFAULT_SIZE,
        }
    }
}

impl Config {
    /// Setting a socket name clears any socket path.
    pub fn set_socket_name(&mut self, name: Option<String>) {
        if name.is_some() {
            self.socket_path = None;
        }
        self.socket_name = name;
    }

    /// Setting a socket path clears any socket name.
    pub fn set_socket_path(&mut self, path: Option<PathBuf>) {
        if path.is_some() {
            self.socket_name = None;
        }
        self.socket_path = path;
    }

    /// Whether either socket selector is set.
    #[must_use]
    pub fn is_socket_set(&self) -> bool {
        self.socket_name.is_some() || self.socket_path.is_some()
    }

    pub fn set_size(&mut self, w: u16, h: u16) -> Result<()> {
        if w < MIN_DIMENSION || h < MIN_DIMENSION {
            return Err(Error::invalid(format!(
                "size {w}x{h} below minimum {MIN_DIMENSION}x{MIN_DIMENSION}"
            )));
        }
        self.size = (w, h);
        Ok(())
    }

    /// The fixed argv prefix for every tmux invocation this connect
    /// cycle: `tmux [-L name | -S path] [-f config]`.
    #[must_use]
    pub fn argv_prefix(&self) -> Vec<String> {
        let bin = self
            .bin
            .as_ref()
            .map_or_else(|| DEFAULT_BIN.to_string(), |p| p.display().to_string());

        let mut argv = vec![bin];
        if let Some(name) = &self.socket_name {
            argv.push("-L".into());
            argv.push(name.clone());
        } else if let Some(path) = &self.socket_path {
            argv.push("-S".into());
            argv.push(path.display().to_string());
        }
        if let Some(config) = &self.config_file {
            argv.push("-f".into());
            argv.push(config.display().to_string());
        }
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_defaults_to_bare_binary() {
        let config = Config::default();
        assert_eq!(config.argv_prefix(), vec![DEFAULT_BIN.to_string()]);
    }

    #[test]
    fn socket_selectors_are_mutually_exclusive() {
        let mut config = Config::default();
        config.set_socket_path(Some("/tmp/sock".into()));
        config.set_socket_name(Some("test".into()));
        assert_eq!(config.socket_name.as_deref(), Some("test"));
        assert!(config.socket_path.is_none());
        assert_eq!(
            config.argv_prefix(),
            vec![DEFAULT_BIN.to_string(), "-L".to_string(), "test".to_string()]
        );

        config.set_socket_path(Some("/tmp/sock".into()));
        assert!(config.socket_name.is_none());
        assert_eq!(
            config.argv_prefix(),
            vec![
                DEFAULT_BIN.to_string(),
                "-S".to_string(),
                "/tmp/sock".to_string()
            ]
        );
    }

    #[test]
    fn config_file_lands_after_socket() {
        let mut config = Config::default();
        config.set_socket_name(Some("wm".into()));
        config.config_file = Some("/etc/tmux.conf".into());
        assert_eq!(
            config.argv_prefix(),
            vec![
                DEFAULT_BIN.to_string(),
                "-L".to_string(),
                "wm".to_string(),
                "-f".to_string(),
                "/etc/tmux.conf".to_string()
            ]
        );
    }

    #[test]
    fn tiny_sizes_are_rejected() {
        let mut config = Config::default();
        assert!(config.set_size(9, 50).is_err());
        assert!(config.set_size(50, 9).is_err());
        config.set_size(10, 10).unwrap();
        assert_eq!(config.size, (10, 10));
    }
}
