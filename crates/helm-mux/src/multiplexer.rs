//! The [`Multiplexer`] facade and the coordinator task behind it.
//!
//! Every facade call becomes a [`Command`] on a channel consumed by a single
//! tokio task, which is the only code that mutates the registry and the pane
//! set. Reader threads post output and end-of-stream notifications to the
//! same task, so per-session output order is the order of arrival.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use helm_pty::{Geometry, LaunchFailure, Launcher, SessionId, SessionInfo};

use crate::error::MuxError;
use crate::events::{EventFeed, MuxEvent};
use crate::io_thread::IoEvent;
use crate::pane::{PaneLayout, PaneSet, PaneSlot};
use crate::registry::SessionRegistry;
use crate::router::OutputRouter;

/// How often the coordinator checks for processes that exited while their
/// output stream stays open.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

enum Command {
    Create {
        geometry: Geometry,
        reply: oneshot::Sender<Result<SessionId, LaunchFailure>>,
    },
    List {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Info {
        session: SessionId,
        reply: oneshot::Sender<Option<SessionInfo>>,
    },
    Kill {
        session: SessionId,
        reply: oneshot::Sender<bool>,
    },
    Write {
        session: SessionId,
        data: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    Resize {
        session: SessionId,
        geometry: Geometry,
        reply: oneshot::Sender<bool>,
    },
    Bind {
        slot: PaneSlot,
        session: SessionId,
        reply: oneshot::Sender<bool>,
    },
    Unbind {
        slot: PaneSlot,
        reply: oneshot::Sender<bool>,
    },
    ToggleSplit {
        reply: oneshot::Sender<bool>,
    },
    PaneInput {
        slot: PaneSlot,
        data: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    Viewport {
        slot: PaneSlot,
        geometry: Geometry,
        reply: oneshot::Sender<bool>,
    },
    Panes {
        reply: oneshot::Sender<PaneLayout>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running multiplexer. Cheap to clone.
///
/// Operations on unknown or exited sessions return `false`/`None` and never
/// fail hard. Once every handle is dropped, or [`Multiplexer::shutdown`] is
/// called, all sessions are killed and the coordinator stops.
#[derive(Clone)]
pub struct Multiplexer {
    commands: mpsc::UnboundedSender<Command>,
}

impl Multiplexer {
    /// Start the coordinator on the current tokio runtime.
    ///
    /// Returns the facade and the event feed carrying output, pane and
    /// closure notifications.
    pub fn start<L: Launcher + 'static>(launcher: L) -> (Self, EventFeed) {
        Self::with_launcher(Arc::new(launcher))
    }

    pub fn with_launcher(launcher: Arc<dyn Launcher>) -> (Self, EventFeed) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (io_tx, io_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            registry: SessionRegistry::new(launcher, io_tx),
            panes: PaneSet::new(),
            router: OutputRouter::new(event_tx),
        };
        tokio::spawn(coordinator.run(command_rx, io_rx));

        (
            Self {
                commands: command_tx,
            },
            event_rx,
        )
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(command(reply)).ok()?;
        rx.await.ok()
    }

    /// Launch a new shell. `0` for either axis means "use the default".
    pub async fn create_session(&self, cols: u16, rows: u16) -> Result<SessionId, MuxError> {
        let geometry = Geometry::for_launch(cols, rows);
        self.request(|reply| Command::Create { geometry, reply })
            .await
            .ok_or(MuxError::Closed)?
            .map_err(MuxError::from)
    }

    /// Live session ids in creation order.
    pub async fn list_sessions(&self) -> Vec<SessionId> {
        self.request(|reply| Command::List { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn session_info(&self, session: SessionId) -> Option<SessionInfo> {
        self.request(|reply| Command::Info { session, reply })
            .await
            .flatten()
    }

    /// Terminate a session. `true` only for the first call on a live session.
    ///
    /// Returns before the process has exited; `SessionClosed` follows on the
    /// event feed once it has.
    pub async fn kill_session(&self, session: SessionId) -> bool {
        self.request(|reply| Command::Kill { session, reply })
            .await
            .unwrap_or(false)
    }

    /// Queue input for a session. `true` if it was handed to the process.
    pub async fn write_input(&self, session: SessionId, data: impl Into<Vec<u8>>) -> bool {
        let data = data.into();
        self.request(|reply| Command::Write {
            session,
            data,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Resize a session's PTY. Best-effort.
    pub async fn resize_session(&self, session: SessionId, cols: u16, rows: u16) -> bool {
        let geometry = Geometry::new(cols, rows).clamped();
        self.request(|reply| Command::Resize {
            session,
            geometry,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Show `session` in `slot`, resizing it to the pane's viewport.
    pub async fn bind_pane(&self, slot: PaneSlot, session: SessionId) -> bool {
        self.request(|reply| Command::Bind {
            slot,
            session,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Clear `slot`. `true` if it was showing a session.
    pub async fn unbind_pane(&self, slot: PaneSlot) -> bool {
        self.request(|reply| Command::Unbind { slot, reply })
            .await
            .unwrap_or(false)
    }

    /// Turn split mode on or off. Returns whether it is now on.
    pub async fn toggle_split(&self) -> bool {
        self.request(|reply| Command::ToggleSplit { reply })
            .await
            .unwrap_or(false)
    }

    /// Keystrokes typed into `slot`, forwarded to its bound session.
    pub async fn pane_input(&self, slot: PaneSlot, data: impl Into<Vec<u8>>) -> bool {
        let data = data.into();
        self.request(|reply| Command::PaneInput { slot, data, reply })
            .await
            .unwrap_or(false)
    }

    /// The display layer measured `slot`'s viewport at `cols` x `rows`.
    pub async fn report_viewport(&self, slot: PaneSlot, cols: u16, rows: u16) -> bool {
        let geometry = Geometry::new(cols, rows).clamped();
        self.request(|reply| Command::Viewport {
            slot,
            geometry,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn panes(&self) -> PaneLayout {
        self.request(|reply| Command::Panes { reply })
            .await
            .unwrap_or(PaneLayout {
                split: false,
                primary: None,
                secondary: None,
            })
    }

    /// Kill every session and stop the coordinator.
    pub async fn shutdown(&self) {
        let _ = self.request(|reply| Command::Shutdown { reply }).await;
    }
}

struct Coordinator {
    registry: SessionRegistry,
    panes: PaneSet,
    router: OutputRouter,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut io: mpsc::UnboundedReceiver<IoEvent>,
    ) {
        let mut exit_poll = tokio::time::interval(EXIT_POLL_INTERVAL);
        exit_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = io.recv() => self.handle_io(event),
                _ = exit_poll.tick() => {
                    for (session, exit_code) in self.registry.reap_exited() {
                        self.closed(session, exit_code);
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            return;
                        }
                    }
                    None => {
                        self.shutdown();
                        return;
                    }
                },
            }
        }
    }

    fn handle_io(&mut self, event: IoEvent) {
        match event {
            IoEvent::Output { session, data } => {
                self.router.deliver(&self.panes, session, data);
            }
            IoEvent::Eof { session } => {
                if let Some(exit_code) = self.registry.finish(session) {
                    self.closed(session, exit_code);
                }
            }
        }
    }

    /// Apply one facade command. Returns `false` once the coordinator should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Create { geometry, reply } => {
                let result = self.registry.create(geometry);
                if let Err(e) = &result {
                    log::warn!("session launch failed: {e}");
                }
                let _ = reply.send(result);
            }
            Command::List { reply } => {
                let _ = reply.send(self.registry.list());
            }
            Command::Info { session, reply } => {
                let _ = reply.send(self.registry.info(session));
            }
            Command::Kill { session, reply } => {
                let killed = self.registry.kill(session);
                if killed {
                    self.detach(session);
                }
                let _ = reply.send(killed);
            }
            Command::Write {
                session,
                data,
                reply,
            } => {
                let _ = reply.send(self.registry.write(session, &data));
            }
            Command::Resize {
                session,
                geometry,
                reply,
            } => {
                let _ = reply.send(self.registry.resize(session, geometry));
            }
            Command::Bind {
                slot,
                session,
                reply,
            } => {
                let _ = reply.send(self.bind(slot, session));
            }
            Command::Unbind { slot, reply } => {
                let unbound = matches!(self.panes.unbind(slot), Ok(Some(_)));
                if unbound {
                    self.pane_changed(slot);
                }
                let _ = reply.send(unbound);
            }
            Command::ToggleSplit { reply } => {
                let _ = reply.send(self.toggle_split());
            }
            Command::PaneInput { slot, data, reply } => {
                let sent = self
                    .router
                    .forward_input(&self.panes, &self.registry, slot, &data);
                let _ = reply.send(sent);
            }
            Command::Viewport {
                slot,
                geometry,
                reply,
            } => {
                let resized =
                    self.router
                        .forward_resize(&mut self.panes, &mut self.registry, slot, geometry);
                let _ = reply.send(resized);
            }
            Command::Panes { reply } => {
                let _ = reply.send(self.panes.layout());
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn bind(&mut self, slot: PaneSlot, session: SessionId) -> bool {
        if !self.registry.contains(session) {
            return false;
        }
        match self.panes.bind(slot, session) {
            Ok(previous) => {
                if previous != Some(session) {
                    self.pane_changed(slot);
                }
                // Fit the session to this pane's viewport.
                self.router.refit(&self.panes, &mut self.registry, slot);
                true
            }
            Err(e) => {
                log::debug!("bind {slot:?} -> {session} rejected: {e}");
                false
            }
        }
    }

    fn toggle_split(&mut self) -> bool {
        if self.panes.split_active() {
            if self.panes.deactivate_split().is_some() {
                self.router.emit(MuxEvent::PaneChanged {
                    slot: PaneSlot::Secondary,
                    session: None,
                });
            }
            false
        } else {
            let running = self.registry.list();
            if self.panes.activate_split(&running).is_some() {
                self.pane_changed(PaneSlot::Secondary);
            }
            true
        }
    }

    fn closed(&mut self, session: SessionId, exit_code: Option<u32>) {
        self.detach(session);
        self.router.emit(MuxEvent::SessionClosed { session, exit_code });
    }

    /// Unbind a dead session from every pane, announcing each change.
    fn detach(&mut self, session: SessionId) {
        for slot in self.panes.unbind_session(session) {
            self.pane_changed(slot);
        }
    }

    fn pane_changed(&self, slot: PaneSlot) {
        self.router.emit(MuxEvent::PaneChanged {
            slot,
            session: self.panes.bound(slot),
        });
    }

    fn shutdown(&mut self) {
        let ids = self.registry.shutdown();
        log::info!("multiplexer shut down, killed {} session(s)", ids.len());
    }
}
