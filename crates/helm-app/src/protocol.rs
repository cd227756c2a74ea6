//! JSON-lines wire format between the helm host and its display layer.
//!
//! Requests arrive one object per line, tagged by `op`, with an optional
//! `seq` that is echoed back in the reply. Everything the host writes is
//! tagged by `type`: either a `reply` or one of the multiplexer's events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use helm_mux::{MuxEvent, PaneSlot, SessionId};

/// A request from the display layer.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    New {
        #[serde(default)]
        cols: u16,
        #[serde(default)]
        rows: u16,
    },
    List,
    Kill {
        id: SessionId,
    },
    Write {
        id: SessionId,
        data: String,
    },
    Resize {
        id: SessionId,
        cols: u16,
        rows: u16,
    },
    Bind {
        slot: PaneSlot,
        id: SessionId,
    },
    Unbind {
        slot: PaneSlot,
    },
    Split,
    PaneInput {
        slot: PaneSlot,
        data: String,
    },
    Viewport {
        slot: PaneSlot,
        cols: u16,
        rows: u16,
    },
    Info {
        id: SessionId,
    },
    Panes,
    Shutdown,
}

/// Parse one request line. The `seq` is recovered even when the request
/// itself is malformed, so the error reply can still be correlated.
pub fn parse_line(line: &str) -> (Option<u64>, Result<Request, String>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return (None, Err(format!("invalid JSON: {e}"))),
    };
    let seq = value.get("seq").and_then(Value::as_u64);
    let request = Request::deserialize(&value).map_err(|e| format!("invalid request: {e}"));
    (seq, request)
}

/// Everything the host writes to stdout.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outgoing {
    Reply {
        seq: Option<u64>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Data {
        id: SessionId,
        panes: Vec<PaneSlot>,
        data: String,
    },
    Closed {
        id: SessionId,
        exit_code: Option<u32>,
    },
    Pane {
        slot: PaneSlot,
        id: Option<SessionId>,
    },
}

impl Outgoing {
    pub fn success(seq: Option<u64>, result: Value) -> Self {
        Outgoing::Reply {
            seq,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(seq: Option<u64>, error: impl Into<String>) -> Self {
        Outgoing::Reply {
            seq,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Turns multiplexer events into wire messages.
///
/// Output chunks are raw bytes and may end in the middle of a UTF-8
/// sequence. The incomplete tail is held back per session and prepended to
/// that session's next chunk. Output is dropped while a session has no
/// bound pane, so its tail is discarded once its last pane lets go of it.
#[derive(Default)]
pub struct EventEncoder {
    remainders: HashMap<SessionId, Vec<u8>>,
    bound: HashMap<PaneSlot, SessionId>,
}

impl EventEncoder {
    /// Encode an event. Returns `None` when a chunk held nothing but an
    /// incomplete character.
    pub fn encode(&mut self, event: MuxEvent) -> Option<Outgoing> {
        match event {
            MuxEvent::Output {
                session,
                panes,
                data,
            } => {
                let data = self.decode(session, data);
                if data.is_empty() {
                    return None;
                }
                Some(Outgoing::Data {
                    id: session,
                    panes,
                    data,
                })
            }
            MuxEvent::SessionClosed { session, exit_code } => {
                self.remainders.remove(&session);
                Some(Outgoing::Closed {
                    id: session,
                    exit_code,
                })
            }
            MuxEvent::PaneChanged { slot, session } => {
                let previous = match session {
                    Some(id) => self.bound.insert(slot, id),
                    None => self.bound.remove(&slot),
                };
                if let Some(previous) = previous {
                    if !self.bound.values().any(|id| *id == previous) {
                        self.remainders.remove(&previous);
                    }
                }
                Some(Outgoing::Pane { slot, id: session })
            }
        }
    }

    fn decode(&mut self, session: SessionId, data: Vec<u8>) -> String {
        let mut bytes = match self.remainders.remove(&session) {
            Some(mut pending) => {
                pending.extend_from_slice(&data);
                pending
            }
            None => data,
        };

        let end = utf8_safe_boundary(&bytes);
        if end < bytes.len() {
            self.remainders.insert(session, bytes.split_off(end));
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Length of the longest prefix of `buf` that does not end inside a
/// multi-byte UTF-8 sequence.
fn utf8_safe_boundary(buf: &[u8]) -> usize {
    // Walk back over at most three continuation bytes to the lead byte.
    let mut start = buf.len();
    while start > 0 && buf.len() - start < 3 && buf[start - 1] & 0xC0 == 0x80 {
        start -= 1;
    }
    if start == 0 {
        return buf.len();
    }

    let lead = buf[start - 1];
    let expected = match lead {
        b if b & 0x80 == 0 => return buf.len(),
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        b if b & 0xF8 == 0xF0 => 4,
        // Not a valid lead byte; let the lossy conversion deal with it.
        _ => return buf.len(),
    };

    let available = buf.len() - (start - 1);
    if available < expected {
        start - 1
    } else {
        buf.len()
    }
}
