//! Shell resolution and launching.
//!
//! [`ShellLauncher`] turns a [`LaunchConfig`] into a concrete command line
//! (program, arguments, working directory, environment) and spawns it in a
//! fresh PTY. The [`Launcher`] trait is the seam the multiplexer depends on,
//! so it can be driven by something other than a real shell.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::geometry::Geometry;
use crate::pty::{CommandSpec, PtyError, PtyHandle, PtyProcess};

#[cfg(target_os = "macos")]
const DEFAULT_SHELL: &str = "/bin/zsh";
#[cfg(all(unix, not(target_os = "macos")))]
const DEFAULT_SHELL: &str = "/bin/bash";
#[cfg(windows)]
const DEFAULT_SHELL: &str = "powershell.exe";

/// `TERM` value advertised to shells unless configured otherwise.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// The process could not be spawned. No session exists for it.
#[derive(Debug, thiserror::Error)]
#[error("failed to launch `{command}`: {source}")]
pub struct LaunchFailure {
    pub command: String,
    #[source]
    pub source: PtyError,
}

/// A freshly spawned process together with how it was launched.
pub struct Launched {
    pub process: Box<dyn PtyProcess>,
    pub command: String,
    pub working_dir: PathBuf,
    pub geometry: Geometry,
}

/// Spawns one process with an attached pseudo-terminal.
pub trait Launcher: Send + Sync {
    /// Spawn a process sized to `geometry`.
    ///
    /// Implementations apply their own clamping; the returned
    /// [`Launched::geometry`] is the size the PTY was actually opened with.
    fn launch(&self, geometry: Geometry) -> Result<Launched, LaunchFailure>;
}

/// User-facing launch overrides. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Shell executable. Falls back to `$SHELL`, then the platform default.
    pub command: Option<String>,
    /// Shell arguments. Falls back to a login flag for known POSIX shells.
    pub args: Option<Vec<String>>,
    /// Starting directory. Falls back to the user's home directory.
    pub cwd: Option<PathBuf>,
    /// `TERM` for the child. Falls back to [`DEFAULT_TERM`].
    pub term: Option<String>,
    /// Extra environment variables on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Resolves the default interactive shell and spawns it in a PTY.
#[derive(Debug, Clone, Default)]
pub struct ShellLauncher {
    config: LaunchConfig,
}

impl ShellLauncher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    /// Build the command line a launch would use right now.
    pub fn resolve(&self) -> CommandSpec {
        let program = self
            .config
            .command
            .clone()
            .unwrap_or_else(default_shell);

        let args = self
            .config
            .args
            .clone()
            .unwrap_or_else(|| login_args(&program));

        let cwd = self
            .config
            .cwd
            .clone()
            .or_else(dirs::home_dir)
            .or_else(|| std::env::current_dir().ok());

        let term = self
            .config
            .term
            .clone()
            .unwrap_or_else(|| DEFAULT_TERM.to_string());

        let mut env = vec![("TERM".to_string(), term)];
        env.extend(
            self.config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        CommandSpec {
            program,
            args,
            cwd,
            env,
        }
    }
}

impl Launcher for ShellLauncher {
    fn launch(&self, geometry: Geometry) -> Result<Launched, LaunchFailure> {
        let spec = self.resolve();
        let geometry = geometry.clamped();
        let command = spec.display();

        let handle = PtyHandle::spawn(&spec, geometry).map_err(|source| LaunchFailure {
            command: command.clone(),
            source,
        })?;

        log::info!(
            "launched `{command}` at {geometry} (pid {:?})",
            handle.process_id()
        );

        Ok(Launched {
            process: Box::new(handle),
            command,
            working_dir: spec.cwd.unwrap_or_else(|| PathBuf::from(".")),
            geometry,
        })
    }
}

/// Returns the user's default shell, falling back to the platform default.
pub fn default_shell() -> String {
    #[cfg(unix)]
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.is_empty() {
            return shell;
        }
    }

    DEFAULT_SHELL.to_string()
}

/// Arguments that start `program` as an interactive login shell.
fn login_args(program: &str) -> Vec<String> {
    let name = Path::new(program)
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    match name {
        "bash" | "zsh" | "fish" | "sh" | "dash" | "ksh" => vec!["-l".to_string()],
        "pwsh" | "powershell" => vec!["-NoLogo".to_string()],
        _ => vec![],
    }
}
