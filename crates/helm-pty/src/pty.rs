use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

use crate::geometry::Geometry;

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to open PTY: {0}")]
    OpenFailed(String),

    #[error("failed to spawn command: {0}")]
    SpawnFailed(String),

    #[error("PTY I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),

    #[error("failed to signal child: {0}")]
    KillFailed(String),
}

/// An owned process with an attached pseudo-terminal.
///
/// The reader and writer halves are handed out once each so they can live on
/// dedicated I/O threads, while the handle itself stays with the session for
/// resize, status queries and termination.
pub trait PtyProcess: Send {
    /// Take the output stream (shell -> us). Returns `None` once taken.
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Take the input stream (us -> shell). Returns `None` once taken.
    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Resize the pseudo-terminal.
    fn resize(&self, geometry: Geometry) -> Result<(), PtyError>;

    /// Exit code of the child, or `None` while it is still running.
    fn try_wait(&mut self) -> Option<u32>;

    /// Ask the child to terminate. Does not wait for it to exit.
    fn kill(&mut self) -> Result<(), PtyError>;

    /// OS process id, if known.
    fn process_id(&self) -> Option<u32>;
}

/// Fully resolved command line for a PTY child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Human-readable command line, used for logging and session info.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn to_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.cwd(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Owns a portable-pty child process, master pair, reader, and writer.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyHandle {
    /// Spawn `command` in a new PTY with the given dimensions.
    ///
    /// The child inherits the caller's environment plus `command.env`.
    pub fn spawn(command: &CommandSpec, geometry: Geometry) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(geometry))
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(command.to_builder())
            .map_err(|e| PtyError::SpawnFailed(format!("{}: {e}", command.program)))?;

        // Only the child needs the slave side from here on.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer: Some(writer),
            child,
        })
    }

    /// Check if the child process is still alive.
    pub fn is_alive(&mut self) -> bool {
        self.try_wait().is_none()
    }
}

impl PtyProcess for PtyHandle {
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    fn resize(&self, geometry: Geometry) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(geometry))
            .map_err(|e| PtyError::ResizeFailed(e.to_string()))
    }

    fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        self.child
            .kill()
            .map_err(|e| PtyError::KillFailed(e.to_string()))
    }

    fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.child.kill() {
                log::debug!("failed to kill PTY child on drop: {e}");
            }
        }
    }
}

fn pty_size(geometry: Geometry) -> PtySize {
    PtySize {
        rows: geometry.rows,
        cols: geometry.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
