//! The host channel: the framed, length-prefixed message bus that carries
//! ciphertext and lifecycle notifications across the trust boundary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::session::SessionId;

/// A message written towards the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// Ciphertext to transmit on behalf of `session_id`.
    TlsOutbound { session_id: SessionId, bytes: Vec<u8> },
    /// `session_id` reached a terminal, clean close.
    TlsClosed { session_id: SessionId },
    /// `session_id` reached a terminal, faulty state (auth failure or any
    /// other fatal engine error).
    TlsError { session_id: SessionId },
}

impl HostMessage {
    pub fn session_id(&self) -> SessionId {
        match self {
            HostMessage::TlsOutbound { session_id, .. } => *session_id,
            HostMessage::TlsClosed { session_id } => *session_id,
            HostMessage::TlsError { session_id } => *session_id,
        }
    }
}

const TAG_TLS_OUTBOUND: u8 = 0x01;
const TAG_TLS_CLOSED: u8 = 0x02;
const TAG_TLS_ERROR: u8 = 0x03;

/// Encode a [`HostMessage`] as `tag ‖ u64 session_id [‖ u32 len ‖ bytes]`,
/// little-endian, for transports that need a byte wire format rather than
/// an in-process value (the actual ring-buffer transport is a collaborator;
/// this encoding exists so this crate's contract is testable end to end
/// without that collaborator).
pub fn encode_frame(message: &HostMessage) -> Vec<u8> {
    let mut out = Vec::new();
    match message {
        HostMessage::TlsOutbound { session_id, bytes } => {
            out.push(TAG_TLS_OUTBOUND);
            out.write_u64::<LittleEndian>(session_id.0).unwrap();
            out.write_u32::<LittleEndian>(bytes.len() as u32).unwrap();
            out.extend_from_slice(bytes);
        }
        HostMessage::TlsClosed { session_id } => {
            out.push(TAG_TLS_CLOSED);
            out.write_u64::<LittleEndian>(session_id.0).unwrap();
        }
        HostMessage::TlsError { session_id } => {
            out.push(TAG_TLS_ERROR);
            out.write_u64::<LittleEndian>(session_id.0).unwrap();
        }
    }
    out
}

/// The framed writer every session holds a shared handle to.
///
/// `try_write` is the non-blocking, atomic primitive the engine's outbound
/// BIO uses: it either accepts the whole message or rejects it outright,
/// never partially. `write` is for host notifications, which this crate
/// never wants to drop on back-pressure (terminal notifications matter more
/// than the transport's momentary fullness), so it's allowed to block the
/// caller's worker task briefly — callers needing a non-blocking version
/// can retry `try_write` themselves.
pub trait HostChannel: Send + Sync {
    /// Attempt to write `message` without blocking. Returns `false` if the
    /// host channel is full and the message was not written.
    fn try_write(&self, message: HostMessage) -> bool;

    /// Write `message`, retrying until the channel accepts it.
    fn write(&self, message: HostMessage) {
        while !self.try_write(message.clone()) {
            std::thread::yield_now();
        }
    }
}

/// An in-memory [`HostChannel`] for tests and small embeddings.
///
/// `reject_next` lets a test script simulate a host transport that is
/// momentarily full: each `try_write` decrements the counter and fails
/// until it reaches zero.
pub struct InMemoryHostChannel {
    state: Mutex<InMemoryState>,
}

struct InMemoryState {
    messages: VecDeque<HostMessage>,
    reject_next: usize,
}

impl InMemoryHostChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryHostChannel {
            state: Mutex::new(InMemoryState {
                messages: VecDeque::new(),
                reject_next: 0,
            }),
        })
    }

    /// Cause the next `n` calls to `try_write` to fail, simulating a full
    /// host transport.
    pub fn reject_next(&self, n: usize) {
        self.state.lock().unwrap().reject_next = n;
    }

    /// Drain and return every message written so far, in order.
    pub fn drain(&self) -> Vec<HostMessage> {
        self.state.lock().unwrap().messages.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().messages.is_empty()
    }
}

impl HostChannel for InMemoryHostChannel {
    fn try_write(&self, message: HostMessage) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_next > 0 {
            state.reject_next -= 1;
            return false;
        }
        state.messages.push_back(message);
        true
    }
}

/// A [`HostChannel`] backed by an unbounded `tokio` channel, for embedding a
/// [`crate::registry::SessionRegistry`] inside an async host process that
/// drains `HostMessage`s on its own task.
pub struct ChannelHostChannel {
    sender: tokio::sync::mpsc::UnboundedSender<HostMessage>,
}

impl ChannelHostChannel {
    pub fn new(
        sender: tokio::sync::mpsc::UnboundedSender<HostMessage>,
    ) -> Arc<Self> {
        Arc::new(ChannelHostChannel { sender })
    }
}

impl HostChannel for ChannelHostChannel {
    fn try_write(&self, message: HostMessage) -> bool {
        // An unbounded channel never exerts back-pressure; this
        // implementation is for host processes whose own admission control
        // happens upstream of the registry, not inside it.
        self.sender.send(message).is_ok()
    }
}
