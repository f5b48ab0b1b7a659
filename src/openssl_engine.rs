//! The production [`CryptoEngine`] implementation, backed by `openssl`.
//!
//! `openssl`'s non-blocking handshake API already speaks the `WantRead` /
//! `WantWrite` vocabulary this crate's state machine expects, so this module
//! is mostly a translation layer: `HandshakeError::WouldBlock` becomes
//! `HandshakeStatus::WantRead`/`WantWrite` depending on which side stalled,
//! and `openssl::ssl::Error::code()` drives the same split for `ssl_read`/
//! `ssl_write`.

use openssl::error::ErrorStack;
use openssl::pkey::PKey;
use openssl::ssl::{
    ErrorCode, HandshakeError, MidHandshakeSslStream, NameType, Ssl, SslContext,
    SslContextBuilder, SslMethod, SslStream, SslVerifyMode, SslVersion,
};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509VerifyResult};

use crate::config::{CryptoParams, SessionRole};
use crate::engine::{
    AuthFailKind, CloseStatus, CryptoEngine, HandshakeStatus, ReadStatus, WriteStatus,
};
use crate::io::EngineIo;

/// Where a session currently sits relative to the `openssl` handshake.
enum State {
    /// `handshake()` has not yet been called, or last returned `WantRead`/
    /// `WantWrite`. `None` once a non-recoverable handshake failure has
    /// already been reported once.
    Handshaking(Option<MidHandshakeSslStream<EngineIo>>),
    Established(SslStream<EngineIo>),
}

pub struct OpensslEngine {
    state: State,
}

impl OpensslEngine {
    /// Build the `SslContext` for `role`/`params`, then immediately begin
    /// the handshake against `io`. The first [`CryptoEngine::handshake`]
    /// call drains whatever progress this constructor's own accept/connect
    /// attempt made, mirroring the reference implementation calling
    /// `do_handshake` once from its constructor.
    pub fn new(role: SessionRole, params: &CryptoParams, io: EngineIo) -> Result<Self, ErrorStack> {
        let ssl = build_ssl(role, params)?;
        let state = match role {
            SessionRole::Server => match ssl.accept(io) {
                Ok(stream) => State::Established(stream),
                Err(HandshakeError::WouldBlock(mid)) => State::Handshaking(Some(mid)),
                Err(HandshakeError::Failure(mid)) => State::Handshaking(Some(mid)),
                Err(HandshakeError::SetupFailure(e)) => return Err(e),
            },
            SessionRole::Client => match ssl.connect(io) {
                Ok(stream) => State::Established(stream),
                Err(HandshakeError::WouldBlock(mid)) => State::Handshaking(Some(mid)),
                Err(HandshakeError::Failure(mid)) => State::Handshaking(Some(mid)),
                Err(HandshakeError::SetupFailure(e)) => return Err(e),
            },
        };
        Ok(OpensslEngine { state })
    }
}

fn build_ssl(role: SessionRole, params: &CryptoParams) -> Result<Ssl, ErrorStack> {
    let mut builder = SslContextBuilder::new(SslMethod::tls())?;
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;

    let mut roots = X509StoreBuilder::new()?;
    for cert in X509::stack_from_pem(&params.trusted_roots_pem)? {
        roots.add_cert(cert)?;
    }
    builder.set_cert_store(roots.build());

    match role {
        SessionRole::Server => {
            let chain_pem = params
                .certificate_chain_pem
                .as_deref()
                .expect("server role requires certificate_chain_pem");
            let key_pem = params
                .private_key_pem
                .as_deref()
                .expect("server role requires private_key_pem");
            let mut chain = X509::stack_from_pem(chain_pem)?.into_iter();
            let leaf = chain.next().expect("certificate_chain_pem has no certificates");
            builder.set_certificate(&leaf)?;
            for intermediate in chain {
                builder.add_extra_chain_cert(intermediate)?;
            }
            let private_key = PKey::private_key_from_pem(key_pem)?;
            builder.set_private_key(&private_key)?;
            builder.check_private_key()?;
            if params.require_client_certificate {
                builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
            } else {
                builder.set_verify(SslVerifyMode::NONE);
            }
        }
        SessionRole::Client => {
            builder.set_verify(SslVerifyMode::PEER);
        }
    }

    let ctx: SslContext = builder.build();
    let mut ssl = Ssl::new(&ctx)?;
    if let (SessionRole::Client, Some(name)) = (role, params.server_name.as_deref()) {
        // SNI alone doesn't make openssl check the peer's certificate against
        // `name` — that's param_mut().set_host, a separate call.
        ssl.set_hostname(name)?;
        ssl.param_mut().set_host(name)?;
    }
    Ok(ssl)
}

impl CryptoEngine for OpensslEngine {
    fn handshake(&mut self) -> HandshakeStatus {
        let mid = match &mut self.state {
            State::Established(_) => return HandshakeStatus::Done,
            State::Handshaking(mid) => mid.take(),
        };
        let Some(mid) = mid else {
            return HandshakeStatus::Fatal("handshake polled after a prior fatal failure".into());
        };
        match mid.handshake() {
            Ok(stream) => {
                self.state = State::Established(stream);
                HandshakeStatus::Done
            }
            Err(HandshakeError::WouldBlock(mid)) => {
                let status = match classify(mid.error()) {
                    Some(Want::Read) | None => HandshakeStatus::WantRead,
                    Some(Want::Write) => HandshakeStatus::WantWrite,
                };
                self.state = State::Handshaking(Some(mid));
                status
            }
            Err(HandshakeError::Failure(mid)) => {
                let verify_result = mid.ssl().verify_result();
                let status = if verify_result != X509VerifyResult::OK {
                    HandshakeStatus::AuthFail(AuthFailKind::CertificateChainVerificationFailed {
                        verify_result: verify_result.as_raw() as i64,
                    })
                } else {
                    HandshakeStatus::Fatal(mid.error().to_string())
                };
                self.state = State::Handshaking(None);
                status
            }
            Err(HandshakeError::SetupFailure(e)) => {
                self.state = State::Handshaking(None);
                HandshakeStatus::Fatal(e.to_string())
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        let State::Established(stream) = &mut self.state else {
            return ReadStatus::WantRead;
        };
        match stream.ssl_read(buf) {
            Ok(n) => ReadStatus::Data(n),
            Err(e) => match e.code() {
                ErrorCode::WANT_READ => ReadStatus::WantRead,
                ErrorCode::WANT_WRITE => ReadStatus::WantWrite,
                ErrorCode::ZERO_RETURN => ReadStatus::PeerClosed,
                ErrorCode::SYSCALL if e.io_error().is_none() => ReadStatus::ConnReset,
                _ => ReadStatus::Fatal(e.to_string()),
            },
        }
    }

    fn write(&mut self, buf: &[u8]) -> WriteStatus {
        let State::Established(stream) = &mut self.state else {
            return WriteStatus::WantRead;
        };
        match stream.ssl_write(buf) {
            Ok(n) => WriteStatus::Accepted(n),
            Err(e) => match e.code() {
                ErrorCode::WANT_READ => WriteStatus::WantRead,
                ErrorCode::WANT_WRITE => WriteStatus::WantWrite,
                _ => WriteStatus::Fatal(e.to_string()),
            },
        }
    }

    fn available_bytes(&self) -> usize {
        match &self.state {
            State::Established(stream) => stream.ssl().pending(),
            State::Handshaking(_) => 0,
        }
    }

    fn close(&mut self) -> CloseStatus {
        let State::Established(stream) = &mut self.state else {
            return CloseStatus::Done;
        };
        match stream.shutdown() {
            Ok(_) => CloseStatus::Done,
            Err(e) => match e.code() {
                ErrorCode::WANT_READ => CloseStatus::WantRead,
                ErrorCode::WANT_WRITE => CloseStatus::WantWrite,
                _ => CloseStatus::Fatal(e.to_string()),
            },
        }
    }

    fn peer_cert(&self) -> Option<Vec<u8>> {
        match &self.state {
            State::Established(stream) => stream
                .ssl()
                .peer_certificate()
                .and_then(|cert| cert.to_der().ok()),
            State::Handshaking(_) => None,
        }
    }

    fn host(&self) -> Option<String> {
        match &self.state {
            State::Established(stream) => stream
                .ssl()
                .servername(NameType::HOST_NAME)
                .map(str::to_owned),
            State::Handshaking(_) => None,
        }
    }

    fn verify_result(&self) -> i64 {
        match &self.state {
            State::Established(stream) => stream.ssl().verify_result().as_raw() as i64,
            State::Handshaking(_) => 0,
        }
    }

    fn verify_info(&self, flags: i64) -> String {
        unsafe { X509VerifyResult::from_raw(flags as i32) }
            .error_string()
            .to_owned()
    }
}

enum Want {
    Read,
    Write,
}

fn classify(e: &openssl::ssl::Error) -> Option<Want> {
    match e.code() {
        ErrorCode::WANT_READ => Some(Want::Read),
        ErrorCode::WANT_WRITE => Some(Want::Write),
        _ => None,
    }
}
