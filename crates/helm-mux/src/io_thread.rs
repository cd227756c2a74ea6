//! Per-session I/O threads.
//!
//! PTY reads and writes are blocking, so every session gets one dedicated OS
//! thread for each direction. Neither thread touches session state: the
//! reader posts [`IoEvent`]s to the coordinator, and the writer drains a
//! channel of input chunks queued by [`Session::write_input`].
//!
//! [`Session::write_input`]: helm_pty::Session::write_input

use std::io::{ErrorKind, Read, Write};

use tokio::sync::mpsc;

use helm_pty::SessionId;

/// Output-side notifications from a session's reader thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    /// A chunk of output, in the order the process produced it.
    Output { session: SessionId, data: Vec<u8> },
    /// The output stream ended. Sent once, after the last `Output`.
    Eof { session: SessionId },
}

/// Start the read loop for a session on a dedicated OS thread.
pub fn start_reader_thread(
    session_id: SessionId,
    reader: Box<dyn Read + Send>,
    events: mpsc::UnboundedSender<IoEvent>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-read-{session_id}"))
        .spawn(move || read_loop(session_id, reader, events))?;
    Ok(())
}

/// Start the write loop for a session on a dedicated OS thread.
///
/// The thread exits when the sending half is dropped or a write fails.
pub fn start_writer_thread(
    session_id: SessionId,
    writer: Box<dyn Write + Send>,
    input: mpsc::UnboundedReceiver<Vec<u8>>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-write-{session_id}"))
        .spawn(move || write_loop(session_id, writer, input))?;
    Ok(())
}

fn read_loop(
    session_id: SessionId,
    mut reader: Box<dyn Read + Send>,
    events: mpsc::UnboundedSender<IoEvent>,
) {
    let mut buf = [0u8; 65536];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break, // EOF, PTY closed
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // EIO is how Linux reports a closed slave side.
            Err(e) => {
                log::debug!("session {session_id}: read ended: {e}");
                break;
            }
        };

        let chunk = IoEvent::Output {
            session: session_id,
            data: buf[..n].to_vec(),
        };
        if events.send(chunk).is_err() {
            // Coordinator is gone; nobody will ever read this.
            return;
        }
    }

    let _ = events.send(IoEvent::Eof {
        session: session_id,
    });
}

fn write_loop(
    session_id: SessionId,
    mut writer: Box<dyn Write + Send>,
    mut input: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(data) = input.blocking_recv() {
        let result = writer.write_all(&data).and_then(|()| writer.flush());
        if let Err(e) = result {
            // Writes racing a process exit are expected.
            log::debug!("session {session_id}: input dropped: {e}");
            return;
        }
    }
}
