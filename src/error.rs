use thiserror::Error;

use crate::engine::AuthFailKind;
use crate::session::SessionId;

/// Errors that have no live session to report through.
///
/// Once a session exists, engine-originated failure is absorbed by the state
/// machine and surfaced only as a terminal [`crate::session::Status`] plus a
/// host notification — see `Session::recv`/`flush`/`close`. `Error` is
/// reserved for construction-time failures (bad certificate material) and
/// registry-routing mistakes (an event naming an unknown session).
#[derive(Debug, Error)]
pub enum Error {
    /// The engine could not be constructed from the supplied crypto
    /// parameters (bad certificate, bad key, unsupported algorithm, ...).
    #[error("failed to set up TLS engine")]
    EngineSetup(#[from] openssl::error::ErrorStack),

    /// A handshake failed authentication before any session existed to
    /// notify. In practice sessions are always created before a handshake
    /// runs, so this variant is used by engine constructors that perform
    /// eager validation (e.g. a client-side pinned-cert check at dial time).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(AuthFailKind),

    /// Any other unrecoverable protocol failure surfaced before a session
    /// could be created.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A `HostEvent` named a session id the registry has no entry for.
    #[error("unknown session {0:?}")]
    UnknownSession(SessionId),
}
