//! Pane slots and their session bindings.
//!
//! There is always a primary pane. A secondary pane exists only while split
//! mode is active. Panes reference sessions by id and never own them:
//! dropping a pane or its binding leaves the session running headless.

use serde::{Deserialize, Serialize};

use helm_pty::{Geometry, SessionId};

/// One of the two attachment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneSlot {
    Primary,
    Secondary,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaneError {
    #[error("{0:?} pane does not exist (split mode is off)")]
    Missing(PaneSlot),
}

/// A logical attachment slot showing at most one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pane {
    slot: PaneSlot,
    bound: Option<SessionId>,
    last_geometry: Option<Geometry>,
}

impl Pane {
    fn new(slot: PaneSlot) -> Self {
        Self {
            slot,
            bound: None,
            last_geometry: None,
        }
    }

    pub fn bound(&self) -> Option<SessionId> {
        self.bound
    }

    /// Viewport size last reported by the display layer.
    pub fn last_geometry(&self) -> Option<Geometry> {
        self.last_geometry
    }
}

/// Serializable view of the current pane bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaneLayout {
    pub split: bool,
    pub primary: Option<SessionId>,
    pub secondary: Option<SessionId>,
}

/// The primary pane plus the optional split pane.
#[derive(Debug, Clone)]
pub struct PaneSet {
    primary: Pane,
    secondary: Option<Pane>,
}

impl PaneSet {
    pub fn new() -> Self {
        Self {
            primary: Pane::new(PaneSlot::Primary),
            secondary: None,
        }
    }

    pub fn split_active(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn pane(&self, slot: PaneSlot) -> Option<&Pane> {
        match slot {
            PaneSlot::Primary => Some(&self.primary),
            PaneSlot::Secondary => self.secondary.as_ref(),
        }
    }

    fn pane_mut(&mut self, slot: PaneSlot) -> Result<&mut Pane, PaneError> {
        match slot {
            PaneSlot::Primary => Ok(&mut self.primary),
            PaneSlot::Secondary => self.secondary.as_mut().ok_or(PaneError::Missing(slot)),
        }
    }

    /// Session currently shown in `slot`, if the slot exists and is bound.
    pub fn bound(&self, slot: PaneSlot) -> Option<SessionId> {
        self.pane(slot).and_then(Pane::bound)
    }

    /// Bind `slot` to `session`, returning the session it showed before.
    pub fn bind(
        &mut self,
        slot: PaneSlot,
        session: SessionId,
    ) -> Result<Option<SessionId>, PaneError> {
        let pane = self.pane_mut(slot)?;
        Ok(pane.bound.replace(session))
    }

    /// Clear `slot`, returning the session it showed before.
    pub fn unbind(&mut self, slot: PaneSlot) -> Result<Option<SessionId>, PaneError> {
        let pane = self.pane_mut(slot)?;
        Ok(pane.bound.take())
    }

    /// Record the viewport geometry reported for `slot`.
    pub fn set_viewport(&mut self, slot: PaneSlot, geometry: Geometry) -> Result<(), PaneError> {
        self.pane_mut(slot)?.last_geometry = Some(geometry);
        Ok(())
    }

    /// Create the secondary pane and auto-bind it.
    ///
    /// `running` lists live sessions in creation order. The secondary pane
    /// takes the most recently created one that the primary pane is not
    /// showing; if there is none it stays unbound. Returns the chosen session.
    /// Does nothing if split mode is already on.
    pub fn activate_split(&mut self, running: &[SessionId]) -> Option<SessionId> {
        if let Some(secondary) = &self.secondary {
            return secondary.bound;
        }

        let primary = self.primary.bound;
        let choice = running
            .iter()
            .rev()
            .copied()
            .find(|id| Some(*id) != primary);

        let mut pane = Pane::new(PaneSlot::Secondary);
        pane.bound = choice;
        self.secondary = Some(pane);
        choice
    }

    /// Destroy the secondary pane, returning the session it showed.
    pub fn deactivate_split(&mut self) -> Option<SessionId> {
        self.secondary.take().and_then(|pane| pane.bound)
    }

    /// Every slot currently showing `session`, primary first.
    pub fn slots_bound_to(&self, session: SessionId) -> Vec<PaneSlot> {
        [Some(&self.primary), self.secondary.as_ref()]
            .into_iter()
            .flatten()
            .filter(|pane| pane.bound == Some(session))
            .map(|pane| pane.slot)
            .collect()
    }

    /// Unbind `session` from every slot showing it. Returns those slots.
    pub fn unbind_session(&mut self, session: SessionId) -> Vec<PaneSlot> {
        let slots = self.slots_bound_to(session);
        for slot in &slots {
            let _ = self.unbind(*slot);
        }
        slots
    }

    pub fn layout(&self) -> PaneLayout {
        PaneLayout {
            split: self.split_active(),
            primary: self.primary.bound,
            secondary: self.secondary.as_ref().and_then(|p| p.bound),
        }
    }
}

impl Default for PaneSet {
    fn default() -> Self {
        Self::new()
    }
}
