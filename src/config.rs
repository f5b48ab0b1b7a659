//! Construction-time parameters for a session.
//!
//! This is deliberately not a configuration-file or CLI layer (those are
//! named out of scope): it's the in-memory shape a host process hands the
//! registry for each `SessionStart` event. Loading these values from disk,
//! a certificate store, or a CLI flag is the host's job.

/// Whether a session is the TLS client or the TLS server side of the
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Client,
    Server,
}

/// Material needed to stand up a [`crate::engine::CryptoEngine`] for one
/// session.
#[derive(Clone)]
pub struct CryptoParams {
    /// PEM-encoded certificate chain, leaf first. Required for `Server`,
    /// optional for `Client` (client certificate authentication).
    pub certificate_chain_pem: Option<Vec<u8>>,
    /// PEM-encoded private key matching `certificate_chain_pem`'s leaf.
    pub private_key_pem: Option<Vec<u8>>,
    /// PEM-encoded trust roots used to verify the peer.
    pub trusted_roots_pem: Vec<u8>,
    /// Server role only: reject handshakes from peers that don't present a
    /// client certificate.
    pub require_client_certificate: bool,
    /// Client role only: the name to verify the server's certificate
    /// against, and to send as SNI.
    pub server_name: Option<String>,
}

impl CryptoParams {
    /// A client configuration that verifies the peer against `trusted_roots_pem`
    /// and checks its certificate matches `server_name`.
    pub fn client(trusted_roots_pem: Vec<u8>, server_name: impl Into<String>) -> Self {
        CryptoParams {
            certificate_chain_pem: None,
            private_key_pem: None,
            trusted_roots_pem,
            require_client_certificate: false,
            server_name: Some(server_name.into()),
        }
    }

    /// A server configuration presenting `certificate_chain_pem`/`private_key_pem`
    /// and optionally demanding a verified client certificate.
    pub fn server(
        certificate_chain_pem: Vec<u8>,
        private_key_pem: Vec<u8>,
        trusted_roots_pem: Vec<u8>,
        require_client_certificate: bool,
    ) -> Self {
        CryptoParams {
            certificate_chain_pem: Some(certificate_chain_pem),
            private_key_pem: Some(private_key_pem),
            trusted_roots_pem,
            require_client_certificate,
            server_name: None,
        }
    }
}
