//! Notifications from the multiplexer to the display layer.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::pane::PaneSlot;
use helm_pty::SessionId;

/// Receiving end of the multiplexer's event feed.
///
/// Unbounded: a consumer that falls behind is never throttled or dropped.
pub type EventFeed = mpsc::UnboundedReceiver<MuxEvent>;

/// Events sent from the multiplexer to its consumer.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MuxEvent {
    /// One chunk of session output, in production order, for the panes bound
    /// to the session when it arrived. Never sent with an empty `panes`.
    Output {
        session: SessionId,
        panes: Vec<PaneSlot>,
        data: Vec<u8>,
    },
    /// The session's process is gone. Sent exactly once per session; the id
    /// is invalid for every later operation.
    SessionClosed {
        session: SessionId,
        exit_code: Option<u32>,
    },
    /// A pane's binding changed (bind, unbind, split toggle, session exit).
    PaneChanged {
        slot: PaneSlot,
        session: Option<SessionId>,
    },
}
