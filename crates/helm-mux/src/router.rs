use tokio::sync::mpsc;

use helm_pty::{Geometry, SessionId};

use crate::events::MuxEvent;
use crate::pane::{PaneSet, PaneSlot};
use crate::registry::SessionRegistry;

/// Moves bytes between sessions and the panes bound to them.
///
/// Output goes out as [`MuxEvent::Output`] on the event feed; input and
/// resizes go to the session bound to the originating pane. Every operation
/// is best-effort and never blocks on the display layer.
#[derive(Clone)]
pub struct OutputRouter {
    events: mpsc::UnboundedSender<MuxEvent>,
}

impl OutputRouter {
    pub fn new(events: mpsc::UnboundedSender<MuxEvent>) -> Self {
        Self { events }
    }

    /// Send an event to the consumer, if there still is one.
    pub fn emit(&self, event: MuxEvent) {
        let _ = self.events.send(event);
    }

    /// Deliver one output chunk to every pane bound to `session`.
    ///
    /// Returns `false` when no pane is bound, in which case the chunk is
    /// discarded.
    pub fn deliver(&self, panes: &PaneSet, session: SessionId, data: Vec<u8>) -> bool {
        let slots = panes.slots_bound_to(session);
        if slots.is_empty() {
            return false;
        }
        self.emit(MuxEvent::Output {
            session,
            panes: slots,
            data,
        });
        true
    }

    /// Write pane input to the session bound to `slot`. No-op if unbound.
    pub fn forward_input(
        &self,
        panes: &PaneSet,
        registry: &SessionRegistry,
        slot: PaneSlot,
        data: &[u8],
    ) -> bool {
        match panes.bound(slot) {
            Some(session) => registry.write(session, data),
            None => false,
        }
    }

    /// Record `slot`'s new viewport and resize its bound session to match.
    ///
    /// Returns `true` only if a bound session was actually resized.
    pub fn forward_resize(
        &self,
        panes: &mut PaneSet,
        registry: &mut SessionRegistry,
        slot: PaneSlot,
        geometry: Geometry,
    ) -> bool {
        if panes.set_viewport(slot, geometry).is_err() {
            return false;
        }
        self.refit(panes, registry, slot)
    }

    /// Resize the session bound to `slot` to the pane's last known viewport.
    pub fn refit(&self, panes: &PaneSet, registry: &mut SessionRegistry, slot: PaneSlot) -> bool {
        let Some(pane) = panes.pane(slot) else {
            return false;
        };
        match (pane.bound(), pane.last_geometry()) {
            (Some(session), Some(geometry)) => registry.resize(session, geometry),
            _ => false,
        }
    }
}
