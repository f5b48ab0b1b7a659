//! Test doubles shared between this crate's own unit tests and its
//! `tests/` integration suite. Not behind `#[cfg(test)]` because
//! integration tests live in a separate crate and need these types
//! exported from the library proper.

use std::sync::{Arc, Mutex};

use cryptovec::CryptoVec;

use crate::engine::{CloseStatus, CryptoEngine, HandshakeStatus, ReadStatus, WriteStatus};
use crate::host::HostChannel;
use crate::io::EngineIo;
use crate::session::SessionId;

/// A [`CryptoEngine`] driven by a scripted sequence of statuses rather than
/// real cryptography, so the session state machine can be tested without
/// `OpensslEngine`. When a script runs dry, `read`/`write` fall through to
/// the real [`EngineIo`], so a test can leave the scripts empty and instead
/// exercise genuine host back-pressure (e.g. via
/// `InMemoryHostChannel::reject_next`) through the same `push`/`pull` path
/// `OpensslEngine` uses.
pub struct ScriptedEngine {
    pub handshake_script: Vec<HandshakeStatus>,
    pub read_script: Vec<ReadStatus>,
    pub write_script: Vec<WriteStatus>,
    pub close_script: Vec<CloseStatus>,
    pub available: usize,
    pub peer_cert: Option<Vec<u8>>,
    pub host: Option<String>,
    pub fill_byte: u8,
    io: EngineIo,
}

impl ScriptedEngine {
    pub fn new(pending_in: Arc<Mutex<CryptoVec>>, host: Arc<dyn HostChannel>, id: SessionId) -> Self {
        ScriptedEngine {
            handshake_script: Vec::new(),
            read_script: Vec::new(),
            write_script: Vec::new(),
            close_script: Vec::new(),
            available: 0,
            peer_cert: None,
            host: None,
            fill_byte: b'x',
            io: EngineIo::new(pending_in, host, id),
        }
    }

    /// Build a self-contained `ScriptedEngine` with its own fresh
    /// `pending_in` cell and an [`crate::host::InMemoryHostChannel`], for
    /// tests that only care about scripted statuses, not real host frames.
    pub fn standalone() -> Self {
        let host = crate::host::InMemoryHostChannel::new();
        ScriptedEngine::new(Arc::new(Mutex::new(CryptoVec::new())), host, SessionId(0))
    }
}

impl CryptoEngine for ScriptedEngine {
    fn handshake(&mut self) -> HandshakeStatus {
        if self.handshake_script.is_empty() {
            HandshakeStatus::WantRead
        } else {
            self.handshake_script.remove(0)
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        if !self.read_script.is_empty() {
            return match self.read_script.remove(0) {
                ReadStatus::Data(n) => {
                    let n = n.min(buf.len());
                    buf[..n].fill(self.fill_byte);
                    self.available = self.available.saturating_sub(n);
                    ReadStatus::Data(n)
                }
                other => other,
            };
        }
        match self.io.pull(buf) {
            Ok(n) => ReadStatus::Data(n),
            Err(_) => ReadStatus::WantRead,
        }
    }

    fn write(&mut self, buf: &[u8]) -> WriteStatus {
        if !self.write_script.is_empty() {
            return self.write_script.remove(0);
        }
        match self.io.push(buf) {
            Ok(n) => WriteStatus::Accepted(n),
            Err(_) => WriteStatus::WantWrite,
        }
    }

    fn available_bytes(&self) -> usize {
        self.available
    }

    fn close(&mut self) -> CloseStatus {
        if self.close_script.is_empty() {
            CloseStatus::Done
        } else {
            self.close_script.remove(0)
        }
    }

    fn peer_cert(&self) -> Option<Vec<u8>> {
        self.peer_cert.clone()
    }

    fn host(&self) -> Option<String> {
        self.host.clone()
    }

    fn verify_result(&self) -> i64 {
        0
    }

    fn verify_info(&self, _flags: i64) -> String {
        String::new()
    }
}
