//! An isolated TLS session endpoint, sitting between an untrusted host I/O
//! layer and a trusted request-processing core.
//!
//! A host process drives [`SessionRegistry`] with [`HostEvent`]s as
//! ciphertext arrives; the registry allocates a [`Session`] per connection,
//! each backed by an [`OpensslEngine`] and running on its own `tokio` task.
//! Once a session's handshake completes, decrypted plaintext is handed to a
//! caller-supplied [`RequestDispatcher`], and its reply is encrypted and
//! queued back onto the host channel.
//!
//! # Writing a host process
//!
//! ```no_run
//! use std::sync::Arc;
//! use tls_endpoint_core::config::{CryptoParams, SessionRole};
//! use tls_endpoint_core::dispatcher::{RequestDispatcher, RpcContext};
//! use tls_endpoint_core::host::InMemoryHostChannel;
//! use tls_endpoint_core::registry::{HostEvent, SessionRegistry};
//! use tls_endpoint_core::session::SessionId;
//!
//! struct Echo;
//! impl RequestDispatcher for Echo {
//!     fn process(&self, _ctx: &RpcContext, plaintext: &[u8]) -> Vec<u8> {
//!         plaintext.to_vec()
//!     }
//!     fn process_consensus(&self, _ctx: &RpcContext, plaintext: &[u8]) -> (Vec<u8>, [u8; 32]) {
//!         (plaintext.to_vec(), [0u8; 32])
//!     }
//! }
//!
//! # async fn run(trusted_roots_pem: Vec<u8>, chain_pem: Vec<u8>, key_pem: Vec<u8>) {
//! let host = InMemoryHostChannel::new();
//! let registry = SessionRegistry::new(
//!     host,
//!     Arc::new(Echo),
//!     Arc::new(|_: SessionId, _: [u8; 32]| {}),
//! );
//! let params = CryptoParams::server(chain_pem, key_pem, trusted_roots_pem, false);
//! let _id = registry
//!     .dispatch(HostEvent::SessionStart { role: SessionRole::Server, crypto_params: params })
//!     .unwrap();
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod host;
pub mod io;
pub mod openssl_engine;
pub mod registry;
pub mod session;
pub mod testing;

pub use config::{CryptoParams, SessionRole};
pub use dispatcher::{DigestSink, RequestDispatcher, RpcContext};
pub use engine::{AuthFailKind, CloseStatus, CryptoEngine, HandshakeStatus, ReadStatus, WriteStatus};
pub use error::Error;
pub use host::{HostChannel, HostMessage};
pub use openssl_engine::OpensslEngine;
pub use registry::{HostEvent, SessionRegistry};
pub use session::{Session, SessionId, Status};
