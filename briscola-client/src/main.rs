use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use briscola::message::{
    self, DealtCard, GameResult, Kind, Message, StartGame, DRAW, SOCKET_PATH,
};
use briscola::{Card, Hand, WireError};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::UnixStream;

const CONNECT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const WAIT_KEYWORD: &str = "WAIT";

/// Terminal client for the Briscola match broker.
#[derive(Debug, Parser)]
#[command(name = "briscola-client", version)]
struct Args {
    username: String,
    password: String,

    /// Register the user instead of connecting.
    #[arg(short = 'r', group = "mode")]
    register: bool,

    /// Cancel the registration.
    #[arg(short = 'c', group = "mode")]
    cancel: bool,

    /// Force the user back to disconnected.
    #[arg(short = 'd', group = "mode")]
    disconnect: bool,

    /// Path of the server socket.
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut conn = connect(&args.socket).await?;

    let kind = if args.register {
        Kind::Register
    } else if args.cancel {
        Kind::Cancel
    } else if args.disconnect {
        Kind::Disconnect
    } else {
        Kind::Connect
    };
    let credentials = format!("{}:{}", args.username, args.password);
    send(&mut conn, &Message::new(kind, credentials)).await?;
    let reply = recv(&mut conn).await?;

    if kind != Kind::Connect {
        explain(&reply);
        return Ok(());
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    match reply.kind {
        Kind::Wait => {
            println!("connected; nobody is waiting for a match, you have been queued");
            play(&mut conn, false, &mut input).await
        }
        Kind::Ok => {
            println!("connected; players waiting for a match:");
            println!("{}", reply.text());
            println!("name an opponent, or {WAIT_KEYWORD} to queue up:");
            let choice = read_line(&mut input).await?;
            if choice == WAIT_KEYWORD {
                send(&mut conn, &Message::empty(Kind::Wait)).await?;
                let reply = recv(&mut conn).await?;
                if reply.kind != Kind::Ok {
                    bail!("unexpected {:?} reply while queuing up", reply.kind);
                }
                println!("you have been queued");
                play(&mut conn, false, &mut input).await
            } else {
                send(&mut conn, &Message::new(Kind::Ok, choice)).await?;
                let reply = recv(&mut conn).await?;
                if reply.kind != Kind::Ok {
                    explain(&reply);
                    return Ok(());
                }
                play(&mut conn, true, &mut input).await
            }
        }
        Kind::No => {
            println!("connection refused: {}", reply.text());
            Ok(())
        }
        Kind::Err => {
            explain(&reply);
            Ok(())
        }
        other => bail!("unexpected {other:?} reply to the connection request"),
    }
}

async fn connect(path: &Path) -> anyhow::Result<UnixStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(_) if attempt < CONNECT_ATTEMPTS => tokio::time::sleep(RETRY_DELAY).await,
            Err(err) => {
                return Err(err).with_context(|| format!("connecting to {}", path.display()))
            }
        }
    }
}

/// A peer closure means the server went away or the opponent left; every
/// other failure is reported as-is.
fn closed(err: WireError) -> anyhow::Error {
    match err {
        WireError::Closed => anyhow!("the server was terminated or the opponent disconnected"),
        other => other.into(),
    }
}

async fn send(conn: &mut UnixStream, message: &Message) -> anyhow::Result<()> {
    message::send(conn, message).await.map_err(closed)
}

async fn recv(conn: &mut UnixStream) -> anyhow::Result<Message> {
    message::recv(conn).await.map_err(closed)
}

async fn read_line(input: &mut Input) -> anyhow::Result<String> {
    let line = input
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("standard input closed"))?;
    Ok(line.trim().to_owned())
}

fn explain(reply: &Message) {
    let verdict = match reply.kind {
        Kind::Ok => "operation completed",
        Kind::No => "operation refused",
        Kind::Err => "operation failed",
        _ => "unexpected reply",
    };
    if reply.payload.is_empty() {
        println!("{verdict}.");
    } else {
        println!("{verdict}: {}", reply.text());
    }
}

async fn play(conn: &mut UnixStream, mut leads: bool, input: &mut Input) -> anyhow::Result<()> {
    let start = recv(conn).await?;
    if start.kind != Kind::StartGame {
        bail!("unexpected {:?} message instead of the match start", start.kind);
    }
    let start = StartGame::parse(&start.text())
        .map_err(|_| anyhow!("unreadable match start from the server"))?;
    println!(
        "playing against {}; the trump suit is {}",
        start.opponent,
        start.trump.letter()
    );
    let mut hand = Hand::new(start.hand);

    loop {
        println!("your cards: {hand}");
        let played = if leads {
            lead_turn(conn, input, &start.opponent).await?
        } else {
            follow_turn(conn, input, &start.opponent).await?
        };
        let Some(played) = played else {
            return Ok(());
        };

        let tail = recv(conn).await?;
        match tail.kind {
            Kind::NewCard => {
                let dealt = DealtCard::parse(&tail.text())
                    .map_err(|_| anyhow!("unreadable drawn card from the server"))?;
                hand.replace(dealt.card, played);
                leads = dealt.leads_next;
            }
            Kind::EndGame => return announce(&tail),
            other => bail!("unexpected {other:?} message at the end of a trick"),
        }
    }
}

/// Lead the trick: keep prompting until the server accepts a card, then
/// wait for the opponent's answer. Returns `None` when the match ended.
async fn lead_turn(
    conn: &mut UnixStream,
    input: &mut Input,
    opponent: &str,
) -> anyhow::Result<Option<Card>> {
    loop {
        println!("your turn; play a card:");
        let token = read_line(input).await?;
        send(conn, &Message::new(Kind::Play, token.clone())).await?;
        let reply = recv(conn).await?;
        match reply.kind {
            Kind::Err => println!("rejected: {}", reply.text()),
            Kind::Play => {
                println!("{opponent} answers {}", reply.text());
                let played = token
                    .parse::<Card>()
                    .map_err(|_| anyhow!("the server accepted an unreadable card"))?;
                return Ok(Some(played));
            }
            Kind::EndGame => {
                announce(&reply)?;
                return Ok(None);
            }
            other => bail!("unexpected {other:?} reply to a play"),
        }
    }
}

/// Follow the trick: see the opponent's card first, then keep prompting
/// until the server accepts ours. Returns `None` when the match ended.
async fn follow_turn(
    conn: &mut UnixStream,
    input: &mut Input,
    opponent: &str,
) -> anyhow::Result<Option<Card>> {
    let lead = recv(conn).await?;
    match lead.kind {
        Kind::Play => println!("{opponent} plays {}", lead.text()),
        Kind::EndGame => {
            announce(&lead)?;
            return Ok(None);
        }
        other => bail!("unexpected {other:?} message while waiting for the opponent"),
    }
    loop {
        println!("your turn; play a card:");
        let token = read_line(input).await?;
        send(conn, &Message::new(Kind::Play, token.clone())).await?;
        let reply = recv(conn).await?;
        match reply.kind {
            Kind::Err => println!("rejected: {}", reply.text()),
            Kind::Ok => {
                let played = token
                    .parse::<Card>()
                    .map_err(|_| anyhow!("the server accepted an unreadable card"))?;
                return Ok(Some(played));
            }
            Kind::EndGame => {
                announce(&reply)?;
                return Ok(None);
            }
            other => bail!("unexpected {other:?} reply to a play"),
        }
    }
}

fn announce(message: &Message) -> anyhow::Result<()> {
    let result = GameResult::parse(&message.text())
        .map_err(|_| anyhow!("unreadable match result from the server"))?;
    if result.winner == DRAW {
        println!("draw: {} points each", result.points);
    } else {
        println!("{} wins with {} points", result.winner, result.points);
    }
    Ok(())
}
