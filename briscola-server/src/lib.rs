pub mod errors;
pub mod registry;

mod engine;
mod session;
mod signals;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use briscola::message::SOCKET_PATH;
use briscola::Deck;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::net::UnixListener;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use engine::MatchSetup;
use registry::{Registry, SessionId};
use session::Conn;

/// The registry is checkpointed here on SIGUSR1.
pub const CHECKPOINT_PATH: &str = "briscola.checkpoint";

/// Per-match transcripts are named `BRS-<serial>.log` under the configured
/// transcript directory.
pub(crate) const TRANSCRIPT_PREFIX: &str = "BRS-";
pub(crate) const TRANSCRIPT_SUFFIX: &str = ".log";

#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem path of the listening socket.
    pub socket_path: PathBuf,
    /// Deal every match from a deck seeded with its serial instead of OS
    /// entropy, so test runs are reproducible.
    pub deterministic_decks: bool,
    /// Directory the per-match transcripts are written to.
    pub transcript_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: PathBuf::from(SOCKET_PATH),
            deterministic_decks: false,
            transcript_dir: PathBuf::from("."),
        }
    }
}

/// State shared by every worker: the user registry, the parked connections
/// of waiting users, and the session and match counters.
pub struct Server {
    config: Config,
    registry: RwLock<Registry>,
    /// Connections of waiting users, keyed by the session id stored in the
    /// owner's registry entry. Each one is consumed exactly once: by the
    /// challenger that picks the owner, or by the shutdown drain.
    parked: Mutex<HashMap<SessionId, Conn>>,
    next_session: AtomicU64,
    matches_started: AtomicU64,
}

impl Server {
    pub fn new(config: Config, registry: Registry) -> Arc<Self> {
        Arc::new(Server {
            config,
            registry: RwLock::new(registry),
            parked: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            matches_started: AtomicU64::new(0),
        })
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn registry(&self) -> &RwLock<Registry> {
        &self.registry
    }

    pub(crate) async fn park(&self, id: SessionId, conn: Conn) {
        self.parked.lock().await.insert(id, conn);
    }

    pub(crate) async fn take_parked(&self, id: SessionId) -> Option<Conn> {
        self.parked.lock().await.remove(&id)
    }

    /// Serial, deck, and transcript path for the next match.
    pub(crate) fn match_setup(&self) -> MatchSetup {
        let serial = self.matches_started.fetch_add(1, Ordering::Relaxed) + 1;
        let deck = if self.config.deterministic_decks {
            Deck::shuffled(&mut ChaCha20Rng::seed_from_u64(serial))
        } else {
            Deck::shuffled(&mut rand::thread_rng())
        };
        MatchSetup {
            serial,
            deck,
            transcript: self
                .config
                .transcript_dir
                .join(format!("{TRANSCRIPT_PREFIX}{serial}{TRANSCRIPT_SUFFIX}")),
        }
    }
}

/// Accept connections until a shutdown signal arrives, then join every
/// worker and return the final registry for persisting.
pub async fn run(registry: Registry, config: Config) -> std::io::Result<Registry> {
    let socket_path = config.socket_path.clone();
    let listener = UnixListener::bind(&socket_path)?;
    log::info!("listening on {}", socket_path.display());

    let server = Server::new(config, registry);
    // The termination flag: set once by the signaler (or by an accept
    // failure), never cleared.
    let shutdown = Arc::new(watch::channel(false).0);
    let mut stopping = shutdown.subscribe();
    let signaler = tokio::spawn(signals::run(server.clone(), shutdown.clone()));

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let id = server.next_session_id();
                    log::debug!("accepted connection, session {id}");
                    let server = server.clone();
                    workers.push(tokio::spawn(async move {
                        session::handle(server, Box::new(stream), id).await;
                    }));
                }
                Err(err) => {
                    log::error!("accept failed: {err}");
                    shutdown.send_replace(true);
                    break;
                }
            },
            _ = stopping.changed() => break,
        }
    }

    drop(listener);
    let _ = std::fs::remove_file(&socket_path);
    log::info!("closing: joining {} workers", workers.len());
    for worker in workers {
        let _ = worker.await;
    }
    // Waiting users' connections outlive their workers; close them now.
    server.parked.lock().await.clear();
    let _ = signaler.await;

    let registry = server.registry.read().await.clone();
    Ok(registry)
}
