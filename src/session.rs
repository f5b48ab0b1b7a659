//! The per-session finite-state controller: `Handshake -> Ready -> {Closed,
//! AuthFail, Errored}`. A `Session` owns its engine and its three buffers
//! exclusively; the only shared state is `pending_in`, handed to the
//! engine's `EngineIo` as a clone of the same `Arc<Mutex<CryptoVec>>`.

use std::sync::Arc;

use cryptovec::CryptoVec;
use log::{debug, trace, warn};

use crate::buffer::SessionBuffer;
use crate::engine::{AuthFailKind, CloseStatus, CryptoEngine, HandshakeStatus, ReadStatus, WriteStatus};
use crate::host::{HostChannel, HostMessage};
use crate::io::EngineIo;

/// A stable, process-unique session identifier. Assigned by
/// [`crate::registry::SessionRegistry`] from a monotonic counter and never
/// reused during a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// A session's place in the handshake/ready/terminal lifecycle. Monotone:
/// once a session reaches one of the three terminal variants it never
/// leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Handshake,
    Ready,
    Closed,
    AuthFail,
    Errored,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Closed | Status::AuthFail | Status::Errored)
    }
}

/// An exact read came up short without the engine going terminal; the bound
/// exists so a misbehaving engine that reports progress without ever
/// signalling `WantRead` cannot spin the caller's task forever.
const MAX_EXACT_READ_RETRIES: usize = 64;

/// One end of one TLS connection: an engine, three buffers, and the status
/// that gates which operations on them are legal.
pub struct Session {
    id: SessionId,
    status: Status,
    engine: Box<dyn CryptoEngine>,
    buffer: SessionBuffer,
    host: Arc<dyn HostChannel>,
    notified_terminal: bool,
    consensus: bool,
}

impl Session {
    /// Build a session around an already-constructed engine. `pending_in`'s
    /// shared cell must already be the same one the engine's `EngineIo` was
    /// built from — see [`crate::registry::SessionRegistry`] for the wiring.
    pub fn new(id: SessionId, engine: Box<dyn CryptoEngine>, host: Arc<dyn HostChannel>) -> Self {
        Session {
            id,
            status: Status::Handshake,
            engine,
            buffer: SessionBuffer::new(),
            host,
            notified_terminal: false,
            consensus: false,
        }
    }

    /// Build a session whose `pending_in` is already shared with the
    /// engine's `EngineIo` (constructed from a clone of the same cell
    /// before the engine itself was built).
    pub fn new_with_pending_in(
        id: SessionId,
        engine: Box<dyn CryptoEngine>,
        host: Arc<dyn HostChannel>,
        pending_in: std::sync::Arc<std::sync::Mutex<CryptoVec>>,
    ) -> Self {
        Session {
            id,
            status: Status::Handshake,
            engine,
            buffer: SessionBuffer::with_pending_in(pending_in),
            host,
            notified_terminal: false,
            consensus: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Mark this session to route delivered plaintext through
    /// `RequestDispatcher::process_consensus` instead of `process`.
    pub fn with_consensus(mut self) -> Self {
        self.consensus = true;
        self
    }

    pub fn is_consensus(&self) -> bool {
        self.consensus
    }

    /// Peer's DER-encoded leaf certificate. Only meaningful in `Ready`.
    pub fn peer_cert(&self) -> Option<Vec<u8>> {
        if self.status == Status::Ready {
            self.engine.peer_cert()
        } else {
            None
        }
    }

    /// Negotiated hostname (SNI for servers, verified name for clients).
    /// Only meaningful in `Ready`.
    pub fn hostname(&self) -> Option<String> {
        if self.status == Status::Ready {
            self.engine.host()
        } else {
            None
        }
    }

    /// Handle to the shared inbound-ciphertext cell, for wiring a fresh
    /// engine's `EngineIo` to the same queue this session appends to.
    pub fn pending_in_handle(&self) -> std::sync::Arc<std::sync::Mutex<CryptoVec>> {
        self.buffer.pending_in.clone()
    }

    /// Append host ciphertext, pump the handshake, and — once `Ready` —
    /// return any plaintext the engine has available for delivery.
    pub fn recv(&mut self, bytes: &[u8]) -> CryptoVec {
        self.recv_buffered(bytes);
        if self.status == Status::Ready {
            let avail = self.engine.available_bytes();
            if avail > 0 {
                return self.read(avail, false);
            }
        }
        CryptoVec::new()
    }

    /// Append host ciphertext and pump the handshake, without synchronously
    /// draining plaintext. Used when the caller will flush a batch of host
    /// messages and read once at the end.
    pub fn recv_buffered(&mut self, bytes: &[u8]) {
        if self.status.is_terminal() {
            return;
        }
        self.buffer.append_pending_in(bytes);
        if self.status == Status::Handshake {
            self.pump_handshake();
        }
    }

    fn pump_handshake(&mut self) {
        match self.engine.handshake() {
            HandshakeStatus::Done => {
                debug!("session {:?}: handshake complete", self.id);
                self.status = Status::Ready;
            }
            HandshakeStatus::WantRead | HandshakeStatus::WantWrite => {
                trace!("session {:?}: handshake stalled, awaiting more data", self.id);
            }
            HandshakeStatus::AuthFail(kind) => {
                if let AuthFailKind::CertificateChainVerificationFailed { verify_result } = &kind {
                    let info = self.engine.verify_info(*verify_result);
                    warn!(
                        "session {:?}: authentication failed: {} ({})",
                        self.id, kind, info
                    );
                } else {
                    warn!("session {:?}: authentication failed: {}", self.id, kind);
                }
                self.transition_terminal(Status::AuthFail);
            }
            HandshakeStatus::PeerClosed => {
                debug!("session {:?}: peer closed during handshake", self.id);
                self.transition_terminal(Status::Closed);
            }
            HandshakeStatus::Fatal(msg) => {
                warn!("session {:?}: fatal handshake error: {}", self.id, msg);
                self.transition_terminal(Status::Errored);
            }
        }
    }

    /// Produce up to `up_to` plaintext bytes. If `exact`, either returns
    /// exactly `up_to` bytes or returns empty, preserving whatever was
    /// already decrypted in `ready_in`.
    pub fn read(&mut self, up_to: usize, exact: bool) -> CryptoVec {
        if up_to == 0 {
            return CryptoVec::new();
        }

        let mut retries = 0;
        loop {
            if self.status == Status::Handshake {
                self.pump_handshake();
            }
            if self.status != Status::Ready {
                return CryptoVec::new();
            }

            self.flush();

            let mut out = self.buffer.take_ready(up_to);
            if out.len() == up_to {
                return out;
            }

            let want = up_to - out.len();
            let mut scratch = vec![0u8; want];
            match self.engine.read(&mut scratch) {
                ReadStatus::Data(0) => {
                    self.transition_terminal(Status::Closed);
                    return if exact {
                        self.buffer.push_front_ready(&out);
                        CryptoVec::new()
                    } else {
                        out
                    };
                }
                ReadStatus::Data(n) => {
                    out.extend(&scratch[..n]);
                    if out.len() == up_to {
                        return out;
                    }
                    if !exact {
                        return out;
                    }
                    retries += 1;
                    if retries >= MAX_EXACT_READ_RETRIES {
                        warn!(
                            "session {:?}: exact read gave up after {} retries",
                            self.id, retries
                        );
                        self.buffer.push_front_ready(&out);
                        return CryptoVec::new();
                    }
                    self.buffer.push_front_ready(&out);
                    continue;
                }
                ReadStatus::WantRead | ReadStatus::WantWrite => {
                    if exact {
                        self.buffer.push_front_ready(&out);
                        return CryptoVec::new();
                    }
                    return out;
                }
                ReadStatus::PeerClosed | ReadStatus::ConnReset => {
                    self.transition_terminal(Status::Closed);
                    return if exact {
                        self.buffer.push_front_ready(&out);
                        CryptoVec::new()
                    } else {
                        out
                    };
                }
                ReadStatus::Fatal(msg) => {
                    warn!("session {:?}: fatal read error: {}", self.id, msg);
                    self.transition_terminal(Status::Errored);
                    return CryptoVec::new();
                }
            }
        }
    }

    /// Append `plaintext` and, if `Ready`, attempt to flush immediately.
    /// Silently dropped once terminal.
    pub fn send(&mut self, plaintext: &[u8]) {
        if self.status.is_terminal() || plaintext.is_empty() {
            return;
        }
        self.buffer.pending_out.extend(plaintext);
        if self.status == Status::Ready {
            self.flush();
        }
    }

    /// Append `plaintext` without attempting to flush.
    pub fn send_buffered(&mut self, plaintext: &[u8]) {
        if self.status.is_terminal() || plaintext.is_empty() {
            return;
        }
        self.buffer.pending_out.extend(plaintext);
    }

    /// Drain `pending_out` through the engine while `Ready` and the engine
    /// keeps accepting bytes.
    pub fn flush(&mut self) {
        while self.status == Status::Ready && !self.buffer.pending_out.is_empty() {
            match self.engine.write(&self.buffer.pending_out) {
                WriteStatus::Accepted(n) => {
                    if n == 0 {
                        break;
                    }
                    self.buffer.consume_pending_out(n);
                }
                WriteStatus::WantRead | WriteStatus::WantWrite => break,
                WriteStatus::Fatal(msg) => {
                    warn!("session {:?}: fatal write error: {}", self.id, msg);
                    self.transition_terminal(Status::Errored);
                }
            }
        }
    }

    /// Request a clean shutdown. A no-op once terminal; skips the
    /// close-notify handshake entirely if still mid-handshake.
    pub fn close(&mut self) {
        match self.status {
            Status::Handshake => {
                self.transition_terminal(Status::Closed);
            }
            Status::Ready => match self.engine.close() {
                CloseStatus::Done | CloseStatus::WantRead | CloseStatus::WantWrite => {
                    self.transition_terminal(Status::Closed);
                }
                CloseStatus::Fatal(msg) => {
                    warn!("session {:?}: fatal close error: {}", self.id, msg);
                    self.transition_terminal(Status::Errored);
                }
            },
            Status::Closed | Status::AuthFail | Status::Errored => {}
        }
    }

    /// Reserved for timers installed by collaborators (e.g. a handshake
    /// timeout watchdog upstream of `SessionRegistry`). No-op by itself.
    pub fn tick(&mut self, _elapsed: std::time::Duration) {}

    fn transition_terminal(&mut self, status: Status) {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if self.notified_terminal {
            return;
        }
        self.notified_terminal = true;
        let message = match status {
            Status::Closed => HostMessage::TlsClosed { session_id: self.id },
            Status::AuthFail | Status::Errored => HostMessage::TlsError { session_id: self.id },
            _ => unreachable!("transition_terminal called with a non-terminal status"),
        };
        self.host.write(message);
    }
}

/// Build the `EngineIo` a fresh engine should be constructed with, sharing
/// `session.pending_in_handle()` so the session's `recv` and the engine's
/// reads observe the same queue.
pub fn engine_io_for(
    session_id: SessionId,
    pending_in: std::sync::Arc<std::sync::Mutex<CryptoVec>>,
    host: Arc<dyn HostChannel>,
) -> EngineIo {
    EngineIo::new(pending_in, host, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHostChannel;
    use crate::testing::ScriptedEngine;

    fn ready_session() -> (Session, Arc<InMemoryHostChannel>) {
        let host = InMemoryHostChannel::new();
        let mut engine = ScriptedEngine::standalone();
        engine.handshake_script.push(HandshakeStatus::Done);
        let mut session = Session::new(SessionId(1), Box::new(engine), host.clone());
        session.recv_buffered(b"clienthello");
        assert_eq!(session.status(), Status::Ready);
        (session, host)
    }

    #[test]
    fn handshake_done_transitions_to_ready() {
        let (session, _host) = ready_session();
        assert_eq!(session.status(), Status::Ready);
    }

    #[test]
    fn handshake_auth_fail_emits_single_notification() {
        let host = InMemoryHostChannel::new();
        let mut engine = ScriptedEngine::standalone();
        engine
            .handshake_script
            .push(HandshakeStatus::AuthFail(AuthFailKind::MissingClientCertificate));
        let mut session = Session::new(SessionId(2), Box::new(engine), host.clone());
        session.recv_buffered(b"clienthello");
        assert_eq!(session.status(), Status::AuthFail);
        let messages = host.drain();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], HostMessage::TlsError { .. }));

        // A second terminal-triggering call must not emit a second notification.
        session.close();
        assert!(host.is_empty());
    }

    #[test]
    fn read_zero_up_to_returns_empty_without_touching_engine() {
        let (mut session, _host) = ready_session();
        let out = session.read(0, false);
        assert_eq!(out.len(), 0);
    }

    #[test]
    fn exact_read_returns_empty_and_preserves_partial_on_want_read() {
        let host = InMemoryHostChannel::new();
        let mut engine = ScriptedEngine::standalone();
        engine.handshake_script.push(HandshakeStatus::Done);
        engine.available = 10;
        engine.read_script.push(ReadStatus::Data(3));
        engine.read_script.push(ReadStatus::WantRead);
        let mut session = Session::new(SessionId(3), Box::new(engine), host);
        session.recv_buffered(b"clienthello");

        let out = session.read(5, true);
        assert_eq!(out.len(), 0);
    }

    #[test]
    fn exact_read_spans_two_records_without_want_read() {
        let host = InMemoryHostChannel::new();
        let mut engine = ScriptedEngine::standalone();
        engine.handshake_script.push(HandshakeStatus::Done);
        engine.available = 32;
        // Two successive records decrypt to completion with no WantRead in
        // between, the retry loop's success path rather than its give-up
        // path (see `exact_read_returns_empty_and_preserves_partial_on_want_read`).
        engine.read_script.push(ReadStatus::Data(20));
        engine.read_script.push(ReadStatus::Data(12));
        let mut session = Session::new(SessionId(9), Box::new(engine), host);
        session.recv_buffered(b"clienthello");

        let out = session.read(32, true);
        assert_eq!(out.len(), 32);
        assert_eq!(session.buffer.ready_in.len(), 0);
    }

    #[test]
    fn non_exact_read_returns_whatever_was_accumulated_on_want_read() {
        let host = InMemoryHostChannel::new();
        let mut engine = ScriptedEngine::standalone();
        engine.handshake_script.push(HandshakeStatus::Done);
        engine.available = 10;
        engine.read_script.push(ReadStatus::Data(3));
        engine.read_script.push(ReadStatus::WantRead);
        let mut session = Session::new(SessionId(4), Box::new(engine), host);
        session.recv_buffered(b"clienthello");

        let out = session.read(5, false);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn peer_close_during_ready_emits_closed_once() {
        let host = InMemoryHostChannel::new();
        let mut engine = ScriptedEngine::standalone();
        engine.read_script.push(ReadStatus::PeerClosed);
        let mut session = Session::new(SessionId(5), Box::new(engine), host.clone());
        session.status = Status::Ready;
        let out = session.read(4, false);
        assert_eq!(out.len(), 0);
        assert_eq!(session.status(), Status::Closed);
        assert_eq!(host.drain().len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut session, host) = ready_session();
        session.close();
        assert_eq!(session.status(), Status::Closed);
        assert_eq!(host.drain().len(), 1);
        session.close();
        assert!(host.is_empty());
    }

    #[test]
    fn close_during_handshake_skips_close_notify() {
        let host = InMemoryHostChannel::new();
        let engine = ScriptedEngine::standalone();
        let mut session = Session::new(SessionId(6), Box::new(engine), host.clone());
        assert_eq!(session.status(), Status::Handshake);
        session.close();
        assert_eq!(session.status(), Status::Closed);
        assert_eq!(host.drain().len(), 1);
    }

    #[test]
    fn send_before_ready_is_buffered_not_dropped() {
        let host = InMemoryHostChannel::new();
        let engine = ScriptedEngine::standalone();
        let mut session = Session::new(SessionId(7), Box::new(engine), host);
        session.send(b"hello");
        assert_eq!(&session.buffer.pending_out[..], b"hello");
    }

    #[test]
    fn flush_stops_on_back_pressure_without_losing_bytes() {
        let mut engine = ScriptedEngine::standalone();
        engine.write_script.push(WriteStatus::WantWrite);
        let mut session = Session::new(SessionId(8), Box::new(engine), InMemoryHostChannel::new());
        session.status = Status::Ready;
        session.send(b"payload");
        assert_eq!(&session.buffer.pending_out[..], b"payload");
    }
}
