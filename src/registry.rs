//! The process-wide session table: routes host events to the right
//! session's worker task and owns the monotonic id allocator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{trace, warn};
use tokio::sync::mpsc;

use crate::config::{CryptoParams, SessionRole};
use crate::dispatcher::{DigestSink, RequestDispatcher, RpcContext};
use crate::error::Error;
use crate::host::HostChannel;
use crate::openssl_engine::OpensslEngine;
use crate::session::{Session, SessionId};

/// A host-originated occurrence the registry routes to the right session
/// (or broadcasts to all of them, for `Tick`).
pub enum HostEvent {
    SessionStart {
        role: SessionRole,
        crypto_params: CryptoParams,
    },
    SessionInbound {
        session_id: SessionId,
        bytes: Vec<u8>,
    },
    SessionClose {
        session_id: SessionId,
    },
    Tick {
        elapsed: Duration,
    },
}

/// A message sent to a single session's worker task.
enum WorkerCommand {
    Inbound(Vec<u8>),
    Close,
    Tick(Duration),
}

/// Maps live `SessionId`s to their worker task's command channel. Mutation
/// of an individual session happens only inside that session's own task;
/// the map itself is the only state shared across sessions, and insertions/
/// removals are serialised by an `RwLock` (lookups, the hot path, take only
/// a read lock).
pub struct SessionRegistry {
    next_id: AtomicU64,
    workers: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<WorkerCommand>>>>,
    host: Arc<dyn HostChannel>,
    dispatcher: Arc<dyn RequestDispatcher>,
    digest_sink: Arc<dyn DigestSink>,
}

impl SessionRegistry {
    /// `digest_sink` receives the reply digest of every session marked
    /// `with_consensus`; sessions that never call `with_consensus` never
    /// touch it. Pass `Arc::new(|_: SessionId, _: [u8; 32]| {})` when no
    /// session uses consensus mode.
    pub fn new(
        host: Arc<dyn HostChannel>,
        dispatcher: Arc<dyn RequestDispatcher>,
        digest_sink: Arc<dyn DigestSink>,
    ) -> Self {
        SessionRegistry {
            next_id: AtomicU64::new(1),
            workers: Arc::new(RwLock::new(HashMap::new())),
            host,
            dispatcher,
            digest_sink,
        }
    }

    pub fn session_count(&self) -> usize {
        self.workers.read().unwrap().len()
    }

    /// Route one host event. `SessionStart` allocates a fresh id and spawns
    /// the session's worker task; a `SessionInbound`/`SessionClose` for an
    /// id with no live worker is logged and dropped per `Error::UnknownSession`.
    pub fn dispatch(&self, event: HostEvent) -> Result<Option<SessionId>, Error> {
        match event {
            HostEvent::SessionStart { role, crypto_params } => {
                let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
                self.spawn_session(id, role, crypto_params)?;
                Ok(Some(id))
            }
            HostEvent::SessionInbound { session_id, bytes } => {
                self.send_command(session_id, WorkerCommand::Inbound(bytes))?;
                Ok(None)
            }
            HostEvent::SessionClose { session_id } => {
                self.send_command(session_id, WorkerCommand::Close)?;
                Ok(None)
            }
            HostEvent::Tick { elapsed } => {
                let workers = self.workers.read().unwrap();
                for sender in workers.values() {
                    let _ = sender.send(WorkerCommand::Tick(elapsed));
                }
                Ok(None)
            }
        }
    }

    fn send_command(&self, session_id: SessionId, command: WorkerCommand) -> Result<(), Error> {
        let workers = self.workers.read().unwrap();
        match workers.get(&session_id) {
            Some(sender) => {
                let _ = sender.send(command);
                Ok(())
            }
            None => {
                warn!("host event for unknown session {:?}", session_id);
                Err(Error::UnknownSession(session_id))
            }
        }
    }

    fn spawn_session(
        &self,
        id: SessionId,
        role: SessionRole,
        crypto_params: CryptoParams,
    ) -> Result<(), Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.workers.write().unwrap().insert(id, tx);

        // The engine needs EngineIo wired to the session's pending_in cell
        // before the session itself exists, so the shared cell is created
        // here and handed to both.
        let pending_in = Arc::new(std::sync::Mutex::new(cryptovec::CryptoVec::new()));
        let io = crate::session::engine_io_for(id, pending_in.clone(), self.host.clone());
        let engine = OpensslEngine::new(role, &crypto_params, io).map_err(Error::EngineSetup)?;

        let session =
            Session::new_with_pending_in(id, Box::new(engine), self.host.clone(), pending_in);

        let dispatcher = self.dispatcher.clone();
        let digest_sink = self.digest_sink.clone();
        let workers = self.workers.clone();
        tokio::spawn(run_worker(id, session, rx, dispatcher, digest_sink, workers));
        Ok(())
    }
}

async fn run_worker(
    id: SessionId,
    mut session: Session,
    mut rx: mpsc::UnboundedReceiver<WorkerCommand>,
    dispatcher: Arc<dyn RequestDispatcher>,
    digest_sink: Arc<dyn DigestSink>,
    workers: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<WorkerCommand>>>>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WorkerCommand::Inbound(bytes) => {
                let plaintext = session.recv(&bytes);
                if !plaintext.is_empty() {
                    deliver(&mut session, &dispatcher, &digest_sink, &plaintext);
                }
            }
            WorkerCommand::Close => session.close(),
            WorkerCommand::Tick(elapsed) => {
                session.tick(elapsed);
                dispatcher.tick(elapsed);
            }
        }
        if session.status().is_terminal() {
            break;
        }
    }
    session.flush();
    trace!("session {:?}: worker exiting", id);
    workers.write().unwrap().remove(&id);
}

fn deliver(
    session: &mut Session,
    dispatcher: &Arc<dyn RequestDispatcher>,
    digest_sink: &Arc<dyn DigestSink>,
    plaintext: &[u8],
) {
    let ctx = RpcContext {
        session_id: session.id(),
        peer_cert: session.peer_cert(),
        hostname: session.hostname(),
    };
    if session.is_consensus() {
        let (reply, digest) = dispatcher.process_consensus(&ctx, plaintext);
        digest_sink.publish(session.id(), digest);
        session.send(&reply);
    } else {
        let reply = dispatcher.process(&ctx, plaintext);
        session.send(&reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHostChannel;

    struct EchoDispatcher;

    impl RequestDispatcher for EchoDispatcher {
        fn process(&self, _ctx: &RpcContext, plaintext: &[u8]) -> Vec<u8> {
            plaintext.to_vec()
        }

        fn process_consensus(&self, _ctx: &RpcContext, plaintext: &[u8]) -> (Vec<u8>, [u8; 32]) {
            (plaintext.to_vec(), [0u8; 32])
        }
    }

    #[test]
    fn session_ids_are_monotonically_assigned() {
        let registry = SessionRegistry::new(
            InMemoryHostChannel::new(),
            Arc::new(EchoDispatcher),
            Arc::new(|_: SessionId, _: [u8; 32]| {}),
        );
        assert_eq!(registry.next_id.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dispatch_to_unknown_session_is_an_error() {
        let registry = SessionRegistry::new(
            InMemoryHostChannel::new(),
            Arc::new(EchoDispatcher),
            Arc::new(|_: SessionId, _: [u8; 32]| {}),
        );
        let result = registry.dispatch(HostEvent::SessionInbound {
            session_id: SessionId(999),
            bytes: vec![1, 2, 3],
        });
        assert!(matches!(result, Err(Error::UnknownSession(SessionId(999)))));
    }

    #[test]
    fn consensus_session_publishes_digest_instead_of_discarding_it() {
        use crate::testing::ScriptedEngine;

        let host = InMemoryHostChannel::new();
        let engine = ScriptedEngine::standalone();
        let mut session = Session::new(SessionId(1), Box::new(engine), host).with_consensus();

        let published = Arc::new(std::sync::Mutex::new(None));
        let recorder = published.clone();
        let digest_sink: Arc<dyn DigestSink> = Arc::new(
            move |id: SessionId, digest: [u8; 32]| *recorder.lock().unwrap() = Some((id, digest)),
        );
        let dispatcher: Arc<dyn RequestDispatcher> = Arc::new(EchoDispatcher);

        deliver(&mut session, &dispatcher, &digest_sink, b"request");

        assert_eq!(*published.lock().unwrap(), Some((SessionId(1), [0u8; 32])));
    }
}
