//! The cryptographic engine boundary.
//!
//! `CryptoEngine` is the trait the session state machine drives; it is the
//! only place this crate talks about handshakes, records or certificates.
//! Everything else in the crate is oblivious to which TLS library backs a
//! session. `openssl_engine` provides the production implementation.

use std::fmt;

/// Why a handshake was rejected on authentication grounds.
#[derive(Debug, Clone)]
pub enum AuthFailKind {
    /// The peer did not present a client certificate when one was required.
    MissingClientCertificate,
    /// The peer's certificate was presented but failed verification for a
    /// reason other than chain validation (e.g. hostname mismatch).
    PeerVerificationFailed,
    /// X.509 chain verification failed. Carries the engine's raw
    /// verify-result code so the caller can retrieve a diagnostic string
    /// via [`CryptoEngine::verify_info`].
    CertificateChainVerificationFailed { verify_result: i64 },
}

impl fmt::Display for AuthFailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailKind::MissingClientCertificate => {
                write!(f, "missing client certificate")
            }
            AuthFailKind::PeerVerificationFailed => write!(f, "peer verification failed"),
            AuthFailKind::CertificateChainVerificationFailed { verify_result } => {
                write!(f, "certificate chain verification failed ({verify_result})")
            }
        }
    }
}

/// Outcome of pumping the handshake once.
#[derive(Debug)]
pub enum HandshakeStatus {
    Done,
    WantRead,
    WantWrite,
    AuthFail(AuthFailKind),
    PeerClosed,
    Fatal(String),
}

/// Outcome of a single `engine.read` call.
#[derive(Debug)]
pub enum ReadStatus {
    /// `n` plaintext bytes were written into the caller's buffer. `n == 0`
    /// is a clean EOF, handled the same as `PeerClosed`.
    Data(usize),
    WantRead,
    WantWrite,
    PeerClosed,
    ConnReset,
    Fatal(String),
}

/// Outcome of a single `engine.write` call.
#[derive(Debug)]
pub enum WriteStatus {
    /// `n` plaintext bytes were accepted (encrypted and handed to `push`).
    Accepted(usize),
    WantRead,
    WantWrite,
    Fatal(String),
}

/// Outcome of a single `engine.close` call.
#[derive(Debug)]
pub enum CloseStatus {
    /// A close-notify was sent, or the engine declined to send one — the
    /// two cases are indistinguishable and treated identically (see
    /// DESIGN.md's record of this open question).
    Done,
    WantRead,
    WantWrite,
    Fatal(String),
}

/// The pluggable cryptographic engine a [`crate::session::Session`] drives.
///
/// The engine's byte-level I/O (the BIO glue described in `io.rs`) is wired
/// up once at construction time, mirroring `set_bio` being installed once
/// in the C original rather than threaded through every call. Only
/// `CryptoEngine` and [`crate::dispatcher::RequestDispatcher`] are trait
/// boundaries in this crate; everything an engine needs to reach the
/// session's buffers is a concrete `EngineIo` value it owns.
pub trait CryptoEngine: Send {
    fn handshake(&mut self) -> HandshakeStatus;

    fn read(&mut self, buf: &mut [u8]) -> ReadStatus;

    fn write(&mut self, buf: &[u8]) -> WriteStatus;

    /// Decrypted bytes buffered inside the engine but not yet returned via
    /// `read`. Used by `Session::recv` to decide whether to eagerly drain
    /// the engine after appending fresh ciphertext.
    fn available_bytes(&self) -> usize;

    fn close(&mut self) -> CloseStatus;

    /// DER-encoded peer leaf certificate, if the peer presented one.
    fn peer_cert(&self) -> Option<Vec<u8>>;

    /// Negotiated hostname (SNI for servers, verified name for clients).
    fn host(&self) -> Option<String>;

    /// Raw verify-result code from the underlying library (`0` means ok).
    fn verify_result(&self) -> i64;

    /// Render `flags` (typically `verify_result()`) as a diagnostic string.
    fn verify_info(&self, flags: i64) -> String;
}
