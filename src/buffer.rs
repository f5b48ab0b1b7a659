use std::sync::{Arc, Mutex};

use cryptovec::CryptoVec;

/// The three byte queues owned by a single session.
///
/// `pending_in` is shared (`Arc<Mutex<..>>`) with the engine's `EngineIo`:
/// the session appends host ciphertext to it, the engine drains it. Neither
/// side owns the other, so this is shared data, not a cycle (see
/// DESIGN.md). A `Mutex` rather than a `RefCell` because a session's
/// `Box<dyn CryptoEngine>` must stay `Send` to be moved into its worker
/// task; contention is a non-issue since only that one task and its own
/// engine ever touch the cell. `ready_in` and `pending_out` are only ever
/// touched by the session itself — the engine's `read`/`write` take
/// explicit borrowed buffers instead.
///
/// None of the three queues impose a size bound themselves — an admission
/// layer in front of the registry is expected to cap how much unread
/// ciphertext/plaintext a session may accumulate.
pub struct SessionBuffer {
    pub pending_in: Arc<Mutex<CryptoVec>>,
    /// Plaintext produced by the engine, not yet delivered to the dispatcher.
    pub ready_in: CryptoVec,
    /// Plaintext submitted by the dispatcher, not yet accepted by the engine.
    pub pending_out: CryptoVec,
}

impl SessionBuffer {
    pub fn new() -> Self {
        SessionBuffer::with_pending_in(Arc::new(Mutex::new(CryptoVec::new())))
    }

    /// Build around an already-shared `pending_in` cell, for wiring a
    /// session to an engine whose `EngineIo` was built from a clone of the
    /// same cell ahead of the session's own construction.
    pub fn with_pending_in(pending_in: Arc<Mutex<CryptoVec>>) -> Self {
        SessionBuffer {
            pending_in,
            ready_in: CryptoVec::new(),
            pending_out: CryptoVec::new(),
        }
    }

    pub fn append_pending_in(&self, bytes: &[u8]) {
        self.pending_in.lock().unwrap().extend(bytes);
    }

    /// Remove and return up to `n` bytes from the front of `ready_in`.
    pub fn take_ready(&mut self, n: usize) -> CryptoVec {
        let n = n.min(self.ready_in.len());
        let mut out = CryptoVec::new();
        out.extend(&self.ready_in[..n]);
        drain_front(&mut self.ready_in, n);
        out
    }

    /// Push bytes back onto the front of `ready_in` (used when an exact
    /// read comes up short and must preserve what it already has).
    pub fn push_front_ready(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut merged = CryptoVec::new();
        merged.extend(bytes);
        merged.extend(&self.ready_in);
        self.ready_in = merged;
    }

    /// Drop the first `n` bytes of `pending_out` after the engine accepted
    /// them.
    pub fn consume_pending_out(&mut self, n: usize) {
        drain_front(&mut self.pending_out, n);
    }
}

/// `CryptoVec` has no `drain`/`split_off` of its own; this mirrors the
/// `erase(begin, begin + n)` idiom the reference implementation uses on
/// `std::vector`.
pub(crate) fn drain_front(buf: &mut CryptoVec, n: usize) {
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
