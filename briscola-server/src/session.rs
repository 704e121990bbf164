//! One worker per accepted connection.
//!
//! A worker serves exactly one request: registration, cancellation, forced
//! disconnect, or the connect-and-pair handshake. A challenger's worker
//! also runs the whole match, taking over the parked connection of the
//! waiting opponent; a waiting user's worker parks its connection and
//! returns, leaving the stream open for a future challenger.

use std::sync::Arc;

use briscola::message::{self, Kind, Message};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::SessionError;
use crate::registry::{Credentials, SessionId, Status};
use crate::{engine, Server};

/// Server side of one client connection, boxed so the workers, the match
/// engine, and the in-memory test harness share a single stream type.
pub(crate) trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

pub(crate) type Conn = Box<dyn Stream>;

const BAD_CREDENTIALS: &str = "could not parse the credentials (name or password empty or too long)";
const USER_ALREADY: &str = "user already registered";
const NO_USER: &str = "no user with this username";
const WRONG_PASSWORD: &str = "wrong password";
const ALREADY_CONNECTED: &str = "already connected";
const NOT_SUPPORTED: &str = "not supported";

pub(crate) async fn handle(server: Arc<Server>, conn: Conn, id: SessionId) {
    if let Err(err) = serve(&server, conn, id).await {
        log::warn!("session {id}: {err}");
    }
}

async fn serve(server: &Server, mut conn: Conn, id: SessionId) -> Result<(), SessionError> {
    let first = message::recv(&mut conn).await?;
    let reply = match first.kind {
        Kind::Register => register(server, &first.text()).await,
        Kind::Cancel => cancel(server, &first.text()).await,
        Kind::Disconnect => force_disconnect(server, &first.text()).await,
        Kind::Connect => return connect(server, conn, id, &first.text()).await,
        _ => Message::new(Kind::Err, NOT_SUPPORTED),
    };
    message::send(&mut conn, &reply).await?;
    Ok(())
}

async fn register(server: &Server, payload: &str) -> Message {
    let credentials = match Credentials::parse(payload) {
        Ok(credentials) => credentials,
        Err(_) => return Message::new(Kind::Err, BAD_CREDENTIALS),
    };
    let name = credentials.name().to_owned();
    match server.registry().write().await.add(credentials) {
        Ok(()) => {
            log::info!("registered user {name}");
            Message::empty(Kind::Ok)
        }
        Err(_) => Message::new(Kind::No, USER_ALREADY),
    }
}

async fn cancel(server: &Server, payload: &str) -> Message {
    let credentials = match Credentials::parse(payload) {
        Ok(credentials) => credentials,
        Err(_) => return Message::new(Kind::Err, BAD_CREDENTIALS),
    };
    match server.registry().write().await.remove(&credentials) {
        Ok(()) => {
            log::info!("cancelled user {}", credentials.name());
            Message::empty(Kind::Ok)
        }
        Err(err) => Message::new(Kind::No, err.to_string()),
    }
}

async fn force_disconnect(server: &Server, payload: &str) -> Message {
    let credentials = match Credentials::parse(payload) {
        Ok(credentials) => credentials,
        Err(_) => return Message::new(Kind::Err, BAD_CREDENTIALS),
    };
    let mut registry = server.registry().write().await;
    if !registry.contains(credentials.name()) {
        return Message::new(Kind::No, NO_USER);
    }
    if !registry.check_password(&credentials) {
        return Message::new(Kind::No, WRONG_PASSWORD);
    }
    registry.disconnect(credentials.name());
    log::info!("forced user {} back to disconnected", credentials.name());
    Message::empty(Kind::Ok)
}

enum Setup {
    Refused(Message),
    Waiting,
    Choosing(String),
}

async fn connect(
    server: &Server,
    mut conn: Conn,
    id: SessionId,
    payload: &str,
) -> Result<(), SessionError> {
    let credentials = match Credentials::parse(payload) {
        Ok(credentials) => credentials,
        Err(_) => {
            message::send(&mut conn, &Message::new(Kind::Err, BAD_CREDENTIALS)).await?;
            return Ok(());
        }
    };
    let name = credentials.name().to_owned();

    let setup = {
        let mut registry = server.registry().write().await;
        if !registry.contains(&name) {
            Setup::Refused(Message::new(Kind::No, NO_USER))
        } else if !registry.check_password(&credentials) {
            Setup::Refused(Message::new(Kind::No, WRONG_PASSWORD))
        } else if matches!(
            registry.status(&name),
            Some(Status::Waiting | Status::Playing)
        ) {
            Setup::Refused(Message::new(Kind::Err, ALREADY_CONNECTED))
        } else {
            match registry.list(Status::Waiting) {
                None => {
                    registry.set_status(&name, Status::Waiting);
                    registry.set_channel(&name, Some(id));
                    Setup::Waiting
                }
                Some(waiting) => Setup::Choosing(waiting),
            }
        }
    };

    match setup {
        Setup::Refused(reply) => {
            message::send(&mut conn, &reply).await?;
            Ok(())
        }
        Setup::Waiting => {
            if let Err(err) = message::send(&mut conn, &Message::empty(Kind::Wait)).await {
                server.registry().write().await.disconnect(&name);
                return Err(err.into());
            }
            server.park(id, conn).await;
            log::info!("user {name} is waiting for a challenger");
            Ok(())
        }
        Setup::Choosing(waiting) => {
            message::send(&mut conn, &Message::new(Kind::Ok, waiting)).await?;
            choose(server, conn, id, &name).await
        }
    }
}

/// Second half of the connect handshake: the client either queues up or
/// names an opponent from the waiting list.
async fn choose(server: &Server, mut conn: Conn, id: SessionId, name: &str) -> Result<(), SessionError> {
    let answer = message::recv(&mut conn).await?;
    match answer.kind {
        Kind::Wait => {
            {
                let mut registry = server.registry().write().await;
                registry.set_status(name, Status::Waiting);
                registry.set_channel(name, Some(id));
            }
            if let Err(err) = message::send(&mut conn, &Message::empty(Kind::Ok)).await {
                server.registry().write().await.disconnect(name);
                return Err(err.into());
            }
            server.park(id, conn).await;
            log::info!("user {name} is waiting for a challenger");
            Ok(())
        }
        Kind::Ok => {
            let opponent = answer.text().into_owned();
            // Claim the opponent under one registry lock so two challengers
            // cannot pick the same waiting user.
            let claimed = {
                let mut registry = server.registry().write().await;
                match (registry.status(&opponent), registry.channel(&opponent)) {
                    (Some(Status::Waiting), Some(channel)) => {
                        registry.set_status(&opponent, Status::Playing);
                        registry.set_status(name, Status::Playing);
                        registry.set_channel(name, Some(id));
                        Some(channel)
                    }
                    _ => None,
                }
            };
            let Some(channel) = claimed else {
                message::send(&mut conn, &Message::new(Kind::No, NO_USER)).await?;
                return Ok(());
            };
            let Some(opponent_conn) = server.take_parked(channel).await else {
                // The waiting connection was drained by a shutdown race.
                let mut registry = server.registry().write().await;
                registry.disconnect(name);
                registry.disconnect(&opponent);
                drop(registry);
                message::send(&mut conn, &Message::new(Kind::No, NO_USER)).await?;
                return Ok(());
            };
            let outcome = match message::send(&mut conn, &Message::empty(Kind::Ok)).await {
                Ok(()) => {
                    log::info!("pairing {name} against {opponent}");
                    engine::play(server.match_setup(), conn, opponent_conn, name, &opponent)
                        .await
                        .map_err(SessionError::from)
                }
                Err(err) => Err(err.into()),
            };
            // Single reset path for both players, success or failure; the
            // connections were dropped (closed) by the engine.
            let mut registry = server.registry().write().await;
            registry.disconnect(name);
            registry.disconnect(&opponent);
            outcome
        }
        _ => {
            message::send(&mut conn, &Message::new(Kind::Err, NOT_SUPPORTED)).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use briscola::message::StartGame;
    use tokio::io::DuplexStream;

    use crate::registry::Registry;
    use crate::Config;

    use super::*;

    fn test_server(users: &[(&str, &str)]) -> Arc<Server> {
        let mut registry = Registry::new();
        for (name, password) in users {
            registry
                .add(Credentials::new(*name, *password).unwrap())
                .unwrap();
        }
        let config = Config {
            socket_path: "unused.skt".into(),
            deterministic_decks: true,
            transcript_dir: std::env::temp_dir(),
        };
        Server::new(config, registry)
    }

    async fn request(server: &Arc<Server>, id: SessionId, message: Message) -> Message {
        let (mut client, worker_side) = tokio::io::duplex(1024);
        let worker = tokio::spawn(handle(server.clone(), Box::new(worker_side), id));
        message::send(&mut client, &message).await.unwrap();
        let reply = message::recv(&mut client).await.unwrap();
        drop(client);
        worker.await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_refused() {
        let server = test_server(&[("alice", "pw")]);
        let reply = request(&server, 1, Message::new(Kind::Register, "alice:pw")).await;
        assert_eq!(reply.kind, Kind::No);
        assert_eq!(reply.text(), USER_ALREADY);
    }

    #[tokio::test]
    async fn test_registration_inserts_the_user() {
        let server = test_server(&[]);
        let reply = request(&server, 1, Message::new(Kind::Register, "alice:pw")).await;
        assert_eq!(reply.kind, Kind::Ok);
        assert!(server.registry().read().await.contains("alice"));
    }

    #[tokio::test]
    async fn test_cancel_requires_the_right_password() {
        let server = test_server(&[("alice", "pw")]);
        let reply = request(&server, 1, Message::new(Kind::Cancel, "alice:nope")).await;
        assert_eq!(reply.kind, Kind::No);
        assert_eq!(reply.text(), "wrong password");
        let reply = request(&server, 2, Message::new(Kind::Cancel, "alice:pw")).await;
        assert_eq!(reply.kind, Kind::Ok);
        assert!(!server.registry().read().await.contains("alice"));
    }

    #[tokio::test]
    async fn test_forced_disconnect_resets_the_entry() {
        let server = test_server(&[("alice", "pw")]);
        {
            let mut registry = server.registry().write().await;
            registry.set_status("alice", Status::Waiting);
            registry.set_channel("alice", Some(9));
        }
        let reply = request(&server, 1, Message::new(Kind::Disconnect, "alice:pw")).await;
        assert_eq!(reply.kind, Kind::Ok);
        let registry = server.registry().read().await;
        assert_eq!(registry.status("alice"), Some(Status::Disconnected));
        assert_eq!(registry.channel("alice"), None);
    }

    #[tokio::test]
    async fn test_unsupported_first_message() {
        let server = test_server(&[]);
        let reply = request(&server, 1, Message::empty(Kind::Play)).await;
        assert_eq!(reply.kind, Kind::Err);
        assert_eq!(reply.text(), NOT_SUPPORTED);
    }

    /// Connect a user and leave them parked; returns the client side of the
    /// parked stream.
    async fn park_user(server: &Arc<Server>, id: SessionId, credentials: &str) -> DuplexStream {
        let (mut client, worker_side) = tokio::io::duplex(1024);
        let worker = tokio::spawn(handle(server.clone(), Box::new(worker_side), id));
        message::send(&mut client, &Message::new(Kind::Connect, credentials))
            .await
            .unwrap();
        let reply = message::recv(&mut client).await.unwrap();
        assert_eq!(reply.kind, Kind::Wait);
        worker.await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_connect_with_no_waiters_queues_the_user() {
        let server = test_server(&[("alice", "pw")]);
        let _alice = park_user(&server, 1, "alice:pw").await;
        let registry = server.registry().read().await;
        assert_eq!(registry.status("alice"), Some(Status::Waiting));
        assert_eq!(registry.channel("alice"), Some(1));
        drop(registry);
        assert!(server.take_parked(1).await.is_some());
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_credentials() {
        let server = test_server(&[("alice", "pw")]);
        let reply = request(&server, 1, Message::new(Kind::Connect, "bob:pw")).await;
        assert_eq!(reply.kind, Kind::No);
        assert_eq!(reply.text(), NO_USER);
        let reply = request(&server, 2, Message::new(Kind::Connect, "alice:nope")).await;
        assert_eq!(reply.kind, Kind::No);
        assert_eq!(reply.text(), WRONG_PASSWORD);
    }

    #[tokio::test]
    async fn test_connect_twice_is_an_error() {
        let server = test_server(&[("alice", "pw")]);
        let _alice = park_user(&server, 1, "alice:pw").await;
        let reply = request(&server, 2, Message::new(Kind::Connect, "alice:pw")).await;
        assert_eq!(reply.kind, Kind::Err);
        assert_eq!(reply.text(), ALREADY_CONNECTED);
    }

    #[tokio::test]
    async fn test_challenger_sees_the_waiting_list_and_can_queue_instead() {
        let server = test_server(&[("alice", "pw"), ("bob", "pw")]);
        let _alice = park_user(&server, 1, "alice:pw").await;

        let (mut bob, worker_side) = tokio::io::duplex(1024);
        let worker = tokio::spawn(handle(server.clone(), Box::new(worker_side), 2));
        message::send(&mut bob, &Message::new(Kind::Connect, "bob:pw"))
            .await
            .unwrap();
        let reply = message::recv(&mut bob).await.unwrap();
        assert_eq!(reply.kind, Kind::Ok);
        assert_eq!(reply.text(), "alice");
        message::send(&mut bob, &Message::empty(Kind::Wait)).await.unwrap();
        let reply = message::recv(&mut bob).await.unwrap();
        assert_eq!(reply.kind, Kind::Ok);
        worker.await.unwrap();

        let registry = server.registry().read().await;
        assert_eq!(registry.status("bob"), Some(Status::Waiting));
        assert_eq!(registry.channel("bob"), Some(2));
    }

    #[tokio::test]
    async fn test_pairing_starts_a_match_and_peer_loss_resets_both() {
        let server = test_server(&[("alice", "pw"), ("bob", "pw")]);
        let mut alice = park_user(&server, 1, "alice:pw").await;

        let (mut bob, worker_side) = tokio::io::duplex(1024);
        let worker = tokio::spawn(handle(server.clone(), Box::new(worker_side), 2));
        message::send(&mut bob, &Message::new(Kind::Connect, "bob:pw"))
            .await
            .unwrap();
        let reply = message::recv(&mut bob).await.unwrap();
        assert_eq!(reply.kind, Kind::Ok);
        message::send(&mut bob, &Message::new(Kind::Ok, "alice")).await.unwrap();
        let reply = message::recv(&mut bob).await.unwrap();
        assert_eq!(reply.kind, Kind::Ok);

        // Both endpoints get their STARTGAME, bob's hand first in the deal.
        let start = message::recv(&mut bob).await.unwrap();
        assert_eq!(start.kind, Kind::StartGame);
        let start = StartGame::parse(&start.text()).unwrap();
        assert_eq!(start.opponent, "alice");
        let start = message::recv(&mut alice).await.unwrap();
        assert_eq!(start.kind, Kind::StartGame);
        let start = StartGame::parse(&start.text()).unwrap();
        assert_eq!(start.opponent, "bob");

        // Peer loss: both clients vanish mid-match; the worker resets both
        // users on its single cleanup path.
        drop(alice);
        drop(bob);
        worker.await.unwrap();
        let registry = server.registry().read().await;
        assert_eq!(registry.status("alice"), Some(Status::Disconnected));
        assert_eq!(registry.status("bob"), Some(Status::Disconnected));
        assert_eq!(registry.channel("alice"), None);
        assert_eq!(registry.channel("bob"), None);
    }

    #[tokio::test]
    async fn test_choosing_an_absent_opponent_is_refused() {
        let server = test_server(&[("alice", "pw"), ("bob", "pw")]);
        let _alice = park_user(&server, 1, "alice:pw").await;

        let (mut bob, worker_side) = tokio::io::duplex(1024);
        let worker = tokio::spawn(handle(server.clone(), Box::new(worker_side), 2));
        message::send(&mut bob, &Message::new(Kind::Connect, "bob:pw"))
            .await
            .unwrap();
        let reply = message::recv(&mut bob).await.unwrap();
        assert_eq!(reply.kind, Kind::Ok);
        message::send(&mut bob, &Message::new(Kind::Ok, "carol")).await.unwrap();
        let reply = message::recv(&mut bob).await.unwrap();
        assert_eq!(reply.kind, Kind::No);
        assert_eq!(reply.text(), NO_USER);
        worker.await.unwrap();
        // The waiting user is untouched.
        let registry = server.registry().read().await;
        assert_eq!(registry.status("alice"), Some(Status::Waiting));
        assert_eq!(registry.status("bob"), Some(Status::Disconnected));
    }
}
