//! helm-mux: the terminal session multiplexer behind Helm's split panes.
//!
//! Owns every running shell, fans each session's output out to the panes
//! currently bound to it, and routes keystrokes and viewport resizes back to
//! the right process. The display layer only ever talks to [`Multiplexer`].
//!
//! # Architecture
//!
//! - [`SessionRegistry`]: Creates, indexes, kills and reaps sessions.
//! - [`PaneSet`]: The primary and (while split) secondary pane slots and
//!   which session each one shows.
//! - [`OutputRouter`]: Delivers output to bound panes and forwards pane
//!   input/resizes to the bound session.
//! - [`Multiplexer`]: Cloneable facade. All mutation is serialized through a
//!   single coordinator task; PTY reads and writes happen on per-session
//!   OS threads (see [`io_thread`]).
//!
//! Output from a session with no bound pane is discarded. Nothing is buffered
//! for detached sessions, and the event feed applies no backpressure.

pub mod error;
pub mod events;
pub mod io_thread;
pub mod multiplexer;
pub mod pane;
pub mod registry;
pub mod router;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::MuxError;
pub use events::{EventFeed, MuxEvent};
pub use helm_pty::{Geometry, SessionId, SessionInfo, SessionState};
pub use multiplexer::Multiplexer;
pub use pane::{Pane, PaneError, PaneLayout, PaneSet, PaneSlot};
pub use registry::SessionRegistry;
pub use router::OutputRouter;
