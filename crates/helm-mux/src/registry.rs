use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;

use helm_pty::{Geometry, LaunchFailure, Launcher, PtyError, Session, SessionId, SessionInfo};

use crate::io_thread::{start_reader_thread, start_writer_thread, IoEvent};

/// Owns every session the multiplexer has created and not yet reaped.
///
/// Live sessions are indexed by id, which is also creation order. A killed
/// session leaves the live index at once but stays parked here until its
/// output stream ends, so its process handle is never dropped early and its
/// closure is still reported exactly once.
pub struct SessionRegistry {
    launcher: Arc<dyn Launcher>,
    live: BTreeMap<SessionId, Session>,
    parked: HashMap<SessionId, Session>,
    /// Sessions whose process was found gone on the last [`reap_exited`] pass.
    ///
    /// [`reap_exited`]: SessionRegistry::reap_exited
    exit_seen: HashSet<SessionId>,
    io_events: mpsc::UnboundedSender<IoEvent>,
    next_id: SessionId,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions report I/O to `io_events`.
    pub fn new(launcher: Arc<dyn Launcher>, io_events: mpsc::UnboundedSender<IoEvent>) -> Self {
        Self {
            launcher,
            live: BTreeMap::new(),
            parked: HashMap::new(),
            exit_seen: HashSet::new(),
            io_events,
            next_id: 1,
        }
    }

    /// Launch a new shell and start streaming its output.
    ///
    /// The id is allocated before launching, so a failed launch still
    /// consumes one. Ids are never handed out twice.
    pub fn create(&mut self, geometry: Geometry) -> Result<SessionId, LaunchFailure> {
        let id = self.next_id;
        self.next_id += 1;

        let launched = self.launcher.launch(geometry)?;
        let command = launched.command.clone();
        let mut session = Session::new(id, launched);

        let (reader, writer) = match (session.take_reader(), session.take_writer()) {
            (Some(reader), Some(writer)) => (reader, writer),
            _ => {
                return Err(LaunchFailure {
                    command,
                    source: PtyError::SpawnFailed("PTY streams unavailable".to_string()),
                })
            }
        };

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        start_writer_thread(id, writer, input_rx)
            .and_then(|()| start_reader_thread(id, reader, self.io_events.clone()))
            .map_err(|e| LaunchFailure {
                command: command.clone(),
                source: PtyError::IoError(e),
            })?;
        session.attach_input(input_tx);

        if !session.confirm_running() {
            log::warn!("session {id}: `{command}` exited during startup");
        }

        log::info!(
            "created session {id}: `{command}` at {}, total sessions: {}",
            session.geometry(),
            self.live.len() + 1
        );
        self.live.insert(id, session);
        Ok(id)
    }

    /// Live session ids in creation order.
    pub fn list(&self) -> Vec<SessionId> {
        self.live.keys().copied().collect()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.live.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn info(&self, id: SessionId) -> Option<SessionInfo> {
        self.live.get(&id).map(Session::info)
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Request termination of a live session without waiting for it.
    ///
    /// Returns `false` if `id` is unknown or already exited.
    pub fn kill(&mut self, id: SessionId) -> bool {
        let Some(mut session) = self.live.remove(&id) else {
            return false;
        };

        if let Err(e) = session.terminate() {
            // Already on its way out; the reader will still hit EOF.
            log::debug!("session {id}: kill raced exit: {e}");
        }
        log::info!("killed session {id}, remaining: {}", self.live.len());
        self.parked.insert(id, session);
        true
    }

    /// Queue input for a live session. Returns `false` if it was dropped.
    pub fn write(&self, id: SessionId, data: &[u8]) -> bool {
        match self.live.get(&id) {
            Some(session) => match session.write_input(data) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("session {id}: write dropped: {e}");
                    false
                }
            },
            None => false,
        }
    }

    /// Resize a live session's PTY. Failures are logged and reported as `false`.
    pub fn resize(&mut self, id: SessionId, geometry: Geometry) -> bool {
        match self.live.get_mut(&id) {
            Some(session) => match session.resize(geometry) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("session {id}: resize to {geometry} failed: {e}");
                    false
                }
            },
            None => false,
        }
    }

    /// Reap sessions whose process is gone but whose output stream is still
    /// open, e.g. because a background job holds the terminal.
    ///
    /// A session is reaped on the second consecutive pass that finds its
    /// process exited, so output already in flight is delivered first.
    /// Returns `(id, exit_code)` for each reaped session.
    pub fn reap_exited(&mut self) -> Vec<(SessionId, Option<u32>)> {
        let exited: HashSet<SessionId> = self
            .live
            .iter_mut()
            .chain(self.parked.iter_mut())
            .filter_map(|(id, session)| (!session.is_alive()).then_some(*id))
            .collect();
        let due: Vec<SessionId> = exited.intersection(&self.exit_seen).copied().collect();
        self.exit_seen = exited;

        due.into_iter()
            .filter_map(|id| {
                log::debug!("session {id}: process exited with its output still open");
                self.finish(id).map(|exit_code| (id, exit_code))
            })
            .collect()
    }

    /// Reap a session whose output stream ended.
    ///
    /// Returns `Some(exit_code)` the first time for a known session and
    /// `None` otherwise. The session and its process handle are dropped.
    pub fn finish(&mut self, id: SessionId) -> Option<Option<u32>> {
        let mut session = self
            .live
            .remove(&id)
            .or_else(|| self.parked.remove(&id))?;
        self.exit_seen.remove(&id);

        if session.is_alive() {
            // Output closed but the process lingers; don't leave it orphaned.
            let _ = session.terminate();
        }
        let exit_code = session.mark_exited();
        log::info!("session {id} exited with {exit_code:?}");
        Some(exit_code)
    }

    /// Kill every live and parked session. Returns the ids that were live.
    pub fn shutdown(&mut self) -> Vec<SessionId> {
        let ids = self.list();
        for (id, mut session) in std::mem::take(&mut self.live) {
            log::info!("shutting down session {id}");
            let _ = session.terminate();
        }
        self.parked.clear();
        self.exit_seen.clear();
        ids
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            self.shutdown();
        }
    }
}
