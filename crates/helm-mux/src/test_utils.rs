//! In-memory stand-ins for shell processes, used by the multiplexer tests.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helm_pty::{Geometry, LaunchFailure, Launched, Launcher, PtyError, PtyProcess};

use crate::events::{EventFeed, MuxEvent};

/// Blocking reader fed chunk by chunk from a channel. EOF once the sender drops.
pub struct ChannelReader {
    rx: std_mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ChannelReader {
    pub fn new() -> (Self, std_mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = std_mpsc::channel();
        (
            Self {
                rx,
                pending: Vec::new(),
            },
            tx,
        )
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Writer whose contents can be inspected from the test.
#[derive(Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    /// Poll until the written bytes equal `expected`.
    pub async fn wait_for(&self, expected: &[u8], limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.contents() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.contents() == expected
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct ProcessState {
    exit_code: Option<u32>,
    killed: bool,
    hold_output_on_kill: bool,
    fail_resize: bool,
    resizes: Vec<Geometry>,
}

/// Test-side handle to a fake process: emit output, exit, inspect input.
#[derive(Clone)]
pub struct FakeControl {
    output: Arc<Mutex<Option<std_mpsc::Sender<Vec<u8>>>>>,
    state: Arc<Mutex<ProcessState>>,
    input: SharedWriter,
}

impl FakeControl {
    /// Produce one output chunk.
    pub fn emit(&self, data: &[u8]) {
        if let Some(tx) = self.output.lock().unwrap().as_ref() {
            let _ = tx.send(data.to_vec());
        }
    }

    /// Exit on its own with `code` and close the output stream.
    pub fn exit(&self, code: u32) {
        self.state.lock().unwrap().exit_code = Some(code);
        self.output.lock().unwrap().take();
    }

    /// Exit with `code` but keep the output stream open, as when a
    /// background job still holds the terminal.
    pub fn exit_holding_output(&self, code: u32) {
        self.state.lock().unwrap().exit_code = Some(code);
    }

    /// Make a later kill leave the output stream open.
    pub fn hold_output_on_kill(&self) {
        self.state.lock().unwrap().hold_output_on_kill = true;
    }

    pub fn killed(&self) -> bool {
        self.state.lock().unwrap().killed
    }

    pub fn fail_resizes(&self) {
        self.state.lock().unwrap().fail_resize = true;
    }

    pub fn resizes(&self) -> Vec<Geometry> {
        self.state.lock().unwrap().resizes.clone()
    }

    pub fn input(&self) -> &SharedWriter {
        &self.input
    }
}

struct FakeProcess {
    id: u32,
    reader: Option<ChannelReader>,
    writer: Option<SharedWriter>,
    control: FakeControl,
}

impl PtyProcess for FakeProcess {
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader
            .take()
            .map(|r| Box::new(r) as Box<dyn Read + Send>)
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer
            .take()
            .map(|w| Box::new(w) as Box<dyn Write + Send>)
    }

    fn resize(&self, geometry: Geometry) -> Result<(), PtyError> {
        let mut state = self.control.state.lock().unwrap();
        if state.fail_resize || state.exit_code.is_some() {
            return Err(PtyError::ResizeFailed("process has exited".to_string()));
        }
        state.resizes.push(geometry);
        Ok(())
    }

    fn try_wait(&mut self) -> Option<u32> {
        self.control.state.lock().unwrap().exit_code
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        let hold_output = {
            let mut state = self.control.state.lock().unwrap();
            state.killed = true;
            state.exit_code.get_or_insert(143);
            state.hold_output_on_kill
        };
        if !hold_output {
            self.control.output.lock().unwrap().take();
        }
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        Some(self.id)
    }
}

/// Launcher producing [`FakeProcess`]es, one [`FakeControl`] per launch.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    controls: Arc<Mutex<Vec<FakeControl>>>,
    fail_next: Arc<Mutex<bool>>,
}

impl FakeLauncher {
    /// Control for the `n`th successful launch (0-based).
    pub fn control(&self, n: usize) -> FakeControl {
        self.controls.lock().unwrap()[n].clone()
    }

    pub fn fail_next_launch(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, geometry: Geometry) -> Result<Launched, LaunchFailure> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(LaunchFailure {
                command: "fake-shell".to_string(),
                source: PtyError::SpawnFailed("no such file".to_string()),
            });
        }

        let (reader, output) = ChannelReader::new();
        let control = FakeControl {
            output: Arc::new(Mutex::new(Some(output))),
            state: Arc::new(Mutex::new(ProcessState::default())),
            input: SharedWriter::default(),
        };

        let mut controls = self.controls.lock().unwrap();
        let process = FakeProcess {
            id: 1000 + controls.len() as u32,
            reader: Some(reader),
            writer: Some(control.input.clone()),
            control: control.clone(),
        };
        controls.push(control);

        Ok(Launched {
            process: Box::new(process),
            command: "fake-shell".to_string(),
            working_dir: PathBuf::from("/home/fake"),
            geometry: geometry.clamped(),
        })
    }
}

/// Next event from the feed, failing the test after two seconds.
pub async fn next_event(feed: &mut EventFeed) -> MuxEvent {
    tokio::time::timeout(Duration::from_secs(2), feed.recv())
        .await
        .expect("timed out waiting for a multiplexer event")
        .expect("event feed closed")
}

/// Skip events until the next `Output`, returning `(session, panes, data)`.
pub async fn next_output(
    feed: &mut EventFeed,
) -> (helm_pty::SessionId, Vec<crate::pane::PaneSlot>, Vec<u8>) {
    loop {
        if let MuxEvent::Output {
            session,
            panes,
            data,
        } = next_event(feed).await
        {
            return (session, panes, data);
        }
    }
}
