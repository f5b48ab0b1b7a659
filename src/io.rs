//! The BIO glue: the only path by which ciphertext crosses the trust
//! boundary.
//!
//! `EngineIo` is the Rust-idiomatic replacement for the reference
//! implementation's `set_bio(send_cb, recv_cb, dbg_cb, context)`: a single
//! concrete value, installed once at engine construction, standing in for
//! the pair of C callbacks and their opaque context pointer. It implements
//! `std::io::Read`/`std::io::Write` so [`crate::openssl_engine::OpensslEngine`]
//! can use it directly as OpenSSL's underlying stream type.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use cryptovec::CryptoVec;

use crate::host::{HostChannel, HostMessage};
use crate::session::SessionId;

/// Byte-level I/O an engine performs against its owning session's buffers.
pub struct EngineIo {
    pending_in: Arc<Mutex<CryptoVec>>,
    host: Arc<dyn HostChannel>,
    session_id: SessionId,
}

impl EngineIo {
    pub fn new(
        pending_in: Arc<Mutex<CryptoVec>>,
        host: Arc<dyn HostChannel>,
        session_id: SessionId,
    ) -> Self {
        EngineIo {
            pending_in,
            host,
            session_id,
        }
    }

    /// Write ciphertext towards the host. Must be atomic: either the whole
    /// of `buf` is accepted (`Ok(buf.len())`) or nothing is (`WouldBlock`).
    pub fn push(&mut self, buf: &[u8]) -> io::Result<usize> {
        let message = HostMessage::TlsOutbound {
            session_id: self.session_id,
            bytes: buf.to_vec(),
        };
        if self.host.try_write(message) {
            Ok(buf.len())
        } else {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "host channel full"))
        }
    }

    /// Read ciphertext coming from the host. Returns as many bytes as are
    /// currently buffered, up to `buf.len()`; `WouldBlock` if none are.
    pub fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pending_in = self.pending_in.lock().unwrap();
        if pending_in.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no inbound ciphertext"));
        }
        let n = buf.len().min(pending_in.len());
        buf[..n].copy_from_slice(&pending_in[..n]);
        drain_front(&mut pending_in, n);
        Ok(n)
    }
}

fn drain_front(buf: &mut CryptoVec, n: usize) {
    if n == 0 {
        return;
    }
    if n >= buf.len() {
        buf.clear();
        return;
    }
    let remaining = CryptoVec::from_slice(&buf[n..]);
    buf.clear();
    buf.extend(&remaining);
}

impl Read for EngineIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pull(buf)
    }
}

impl Write for EngineIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHostChannel;

    #[test]
    fn pull_drains_pending_in_in_order() {
        let pending_in = Arc::new(Mutex::new(CryptoVec::new()));
        pending_in.lock().unwrap().extend(b"abcdef");
        let host = InMemoryHostChannel::new();
        let mut io = EngineIo::new(pending_in.clone(), host, SessionId(1));

        let mut buf = [0u8; 3];
        let n = io.pull(&mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(&pending_in.lock().unwrap()[..], b"def");
    }

    #[test]
    fn pull_would_block_when_empty() {
        let pending_in = Arc::new(Mutex::new(CryptoVec::new()));
        let host = InMemoryHostChannel::new();
        let mut io = EngineIo::new(pending_in, host, SessionId(1));
        let mut buf = [0u8; 3];
        let err = io.pull(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn push_reports_would_block_on_back_pressure() {
        let pending_in = Arc::new(Mutex::new(CryptoVec::new()));
        let host = InMemoryHostChannel::new();
        host.reject_next(1);
        let mut io = EngineIo::new(pending_in, host, SessionId(1));
        let err = io.push(b"hello").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
