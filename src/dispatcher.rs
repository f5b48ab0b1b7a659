//! The request-dispatch contract: how a `Ready` session hands decrypted
//! frames to the trusted request-processing core and gets a reply back.

use std::time::Duration;

use crate::session::SessionId;

/// Everything a dispatcher knows about the session a request arrived on.
#[derive(Debug, Clone)]
pub struct RpcContext {
    pub session_id: SessionId,
    /// DER-encoded peer leaf certificate, when the handshake produced one.
    pub peer_cert: Option<Vec<u8>>,
    /// Negotiated hostname (SNI for servers, verified name for clients).
    pub hostname: Option<String>,
}

/// A pluggable request handler. A `Ready` session calls [`process`] for
/// every contiguous chunk of delivered plaintext by default; a session
/// marked [`crate::session::Session::with_consensus`] calls
/// [`process_consensus`] instead and publishes the returned digest through
/// a caller-supplied [`DigestSink`] rather than interpreting it — the
/// replication layer that consumes the digest is a collaborator outside
/// this crate.
///
/// [`process`]: RequestDispatcher::process
/// [`process_consensus`]: RequestDispatcher::process_consensus
pub trait RequestDispatcher: Send + Sync {
    fn process(&self, ctx: &RpcContext, plaintext: &[u8]) -> Vec<u8>;

    fn process_consensus(&self, ctx: &RpcContext, plaintext: &[u8]) -> (Vec<u8>, [u8; 32]);

    /// Called on every `HostEvent::Tick`. Default no-op.
    #[allow(unused_variables)]
    fn tick(&self, elapsed: Duration) {}
}

/// Where a consensus session's reply digest goes once `process_consensus`
/// returns it. The registry never interprets the digest itself, only
/// forwards it — any `Fn(SessionId, [u8; 32]) + Send + Sync` closure
/// implements this via the blanket impl below, so a host process can pass
/// one directly without naming a type.
pub trait DigestSink: Send + Sync {
    fn publish(&self, session_id: SessionId, digest: [u8; 32]);
}

impl<F> DigestSink for F
where
    F: Fn(SessionId, [u8; 32]) + Send + Sync,
{
    fn publish(&self, session_id: SessionId, digest: [u8; 32]) {
        self(session_id, digest)
    }
}
