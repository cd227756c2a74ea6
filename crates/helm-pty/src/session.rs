use std::io::{Read, Write};
use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::geometry::Geometry;
use crate::pty::{PtyError, PtyProcess};
use crate::shell::Launched;

/// Unique identifier for a terminal session. Never reused within a process.
pub type SessionId = u64;

/// Lifecycle of a session. `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    Exited,
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} has exited")]
    Exited(SessionId),

    #[error("session {0} is not accepting input")]
    InputClosed(SessionId),

    #[error(transparent)]
    Pty(#[from] PtyError),
}

/// Serializable snapshot of a session for the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub command: String,
    pub working_dir: PathBuf,
    pub geometry: Geometry,
    pub pid: Option<u32>,
}

/// One shell process plus its pseudo-terminal channel.
///
/// The session is the only owner of the process handle: nothing else can
/// write to, resize or terminate the process. Output is read on a separate
/// thread from the stream returned by [`Session::take_reader`]; input goes
/// through the channel installed with [`Session::attach_input`] so that a
/// slow child never blocks the caller.
pub struct Session {
    id: SessionId,
    state: SessionState,
    command: String,
    working_dir: PathBuf,
    geometry: Geometry,
    process: Box<dyn PtyProcess>,
    input: Option<mpsc::UnboundedSender<Vec<u8>>>,
    exit_code: Option<u32>,
}

impl Session {
    /// Wrap a launched process. The session starts in `Starting`.
    pub fn new(id: SessionId, launched: Launched) -> Self {
        Self {
            id,
            state: SessionState::Starting,
            command: launched.command,
            working_dir: launched.working_dir,
            geometry: launched.geometry,
            process: launched.process,
            input: None,
            exit_code: None,
        }
    }

    /// Returns the session's unique identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Extract the PTY reader for use in a dedicated I/O thread.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.process.take_reader()
    }

    /// Extract the PTY writer for use in a dedicated I/O thread.
    pub fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.process.take_writer()
    }

    /// Route future [`Session::write_input`] calls into `tx`.
    pub fn attach_input(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) {
        self.input = Some(tx);
    }

    /// Move `Starting -> Running` if the process is confirmed live.
    ///
    /// Returns `false` if the process is already gone; the session then stays
    /// in `Starting` until its exit is processed.
    pub fn confirm_running(&mut self) -> bool {
        if self.state != SessionState::Starting {
            return self.state == SessionState::Running;
        }
        if self.process.process_id().is_some() && self.process.try_wait().is_none() {
            self.state = SessionState::Running;
            true
        } else {
            false
        }
    }

    /// Queue user input for the process.
    pub fn write_input(&self, data: &[u8]) -> Result<(), SessionError> {
        if self.state == SessionState::Exited {
            return Err(SessionError::Exited(self.id));
        }
        let input = self
            .input
            .as_ref()
            .ok_or(SessionError::InputClosed(self.id))?;
        input
            .send(data.to_vec())
            .map_err(|_| SessionError::InputClosed(self.id))
    }

    /// Resize the PTY. `geometry` is recorded only if the resize succeeded.
    pub fn resize(&mut self, geometry: Geometry) -> Result<(), SessionError> {
        if self.state == SessionState::Exited {
            return Err(SessionError::Exited(self.id));
        }
        self.process.resize(geometry)?;
        self.geometry = geometry;
        Ok(())
    }

    /// Request termination and mark the session `Exited` without waiting.
    ///
    /// Fails with [`SessionError::Exited`] if the session already exited.
    pub fn terminate(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Exited {
            return Err(SessionError::Exited(self.id));
        }
        self.state = SessionState::Exited;
        self.input = None;
        self.process.kill()?;
        Ok(())
    }

    /// Record that the output stream ended. Returns the exit code if the
    /// process has already been reaped.
    pub fn mark_exited(&mut self) -> Option<u32> {
        self.state = SessionState::Exited;
        self.input = None;
        if self.exit_code.is_none() {
            self.exit_code = self.process.try_wait();
        }
        self.exit_code
    }

    /// Check if the underlying process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_code.is_none() {
            self.exit_code = self.process.try_wait();
        }
        self.exit_code.is_none()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            state: self.state,
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            geometry: self.geometry,
            pid: self.process.process_id(),
        }
    }
}
