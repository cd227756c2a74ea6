//! helm-pty: pseudo-terminal processes and shell session state for Helm.
//!
//! This crate owns everything that touches a real shell process. The
//! multiplexer in `helm-mux` builds on top of it and never talks to
//! `portable-pty` directly.
//!
//! # Architecture
//!
//! - [`PtyProcess`]: Owned handle abstraction over a process with an attached
//!   pseudo-terminal (reader, writer, resize, status query, kill).
//! - [`PtyHandle`]: The `portable-pty` implementation of `PtyProcess`.
//! - [`ShellLauncher`]: Resolves the default shell, working directory and
//!   environment, and spawns a `PtyHandle` through the [`Launcher`] seam.
//! - [`Session`]: One launched process plus its lifecycle state and geometry.

pub mod geometry;
pub mod pty;
pub mod session;
pub mod shell;

pub use geometry::Geometry;
pub use pty::{CommandSpec, PtyError, PtyHandle, PtyProcess};
pub use session::{Session, SessionError, SessionId, SessionInfo, SessionState};
pub use shell::{LaunchConfig, LaunchFailure, Launched, Launcher, ShellLauncher};
