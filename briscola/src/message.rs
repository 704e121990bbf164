//! Typed, framed messages exchanged between server and client.
//!
//! Each frame is a single tag byte, a big-endian 4-byte payload length, and
//! the payload itself; a length of zero is legal. The structured payloads
//! (STARTGAME, CARD, ENDGAME) have builders and parsers here so the two
//! sides cannot drift apart.

use std::borrow::Cow;
use std::io;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Card, InvalidPayload, Suit, WireError};

/// Fixed filesystem path where the server listens by default.
pub const SOCKET_PATH: &str = "/tmp/briscola.skt";

/// Payload token standing in for a card when the deck is exhausted.
pub const NO_CARD: &str = "NN";

/// Winner name sent in an ENDGAME payload when the match is tied.
pub const DRAW: &str = "draw";

/// Frames larger than this are rejected outright.
pub const MAX_PAYLOAD: u32 = 64 * 1024;

/// Single-byte message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `R` — register a new user.
    Register,
    /// `Q` — cancel a registration.
    Cancel,
    /// `D` — force a user back to disconnected.
    Disconnect,
    /// `C` — connect and ask for a match.
    Connect,
    /// `W` — wait for a challenger.
    Wait,
    /// `K` — acceptance.
    Ok,
    /// `N` — refusal.
    No,
    /// `E` — error.
    Err,
    /// `S` — match setup: trump, hand, opponent.
    StartGame,
    /// `Z` — match result.
    EndGame,
    /// `P` — a played card.
    Play,
    /// `A` — the card drawn after a trick.
    NewCard,
}

impl Kind {
    pub fn as_byte(self) -> u8 {
        match self {
            Kind::Register => b'R',
            Kind::Cancel => b'Q',
            Kind::Disconnect => b'D',
            Kind::Connect => b'C',
            Kind::Wait => b'W',
            Kind::Ok => b'K',
            Kind::No => b'N',
            Kind::Err => b'E',
            Kind::StartGame => b'S',
            Kind::EndGame => b'Z',
            Kind::Play => b'P',
            Kind::NewCard => b'A',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Kind> {
        match byte {
            b'R' => Some(Kind::Register),
            b'Q' => Some(Kind::Cancel),
            b'D' => Some(Kind::Disconnect),
            b'C' => Some(Kind::Connect),
            b'W' => Some(Kind::Wait),
            b'K' => Some(Kind::Ok),
            b'N' => Some(Kind::No),
            b'E' => Some(Kind::Err),
            b'S' => Some(Kind::StartGame),
            b'Z' => Some(Kind::EndGame),
            b'P' => Some(Kind::Play),
            b'A' => Some(Kind::NewCard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: Kind, payload: impl Into<Vec<u8>>) -> Self {
        Message {
            kind,
            payload: payload.into(),
        }
    }

    pub fn empty(kind: Kind) -> Self {
        Message {
            kind,
            payload: Vec::new(),
        }
    }

    /// The payload as text; undecodable bytes are replaced rather than
    /// trusted.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Write one frame. The frame is assembled up front and written in a single
/// call so a concurrent writer never interleaves with it.
pub async fn send<W>(writer: &mut W, message: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(5 + message.payload.len());
    frame.push(message.kind.as_byte());
    frame.extend_from_slice(&(message.payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&message.payload);
    writer.write_all(&frame).await.map_err(map_io)?;
    writer.flush().await.map_err(map_io)?;
    Ok(())
}

/// Read one frame. A peer that has closed the stream surfaces as
/// [`WireError::Closed`], distinguishable from every other failure.
pub async fn recv<R>(reader: &mut R) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 5];
    reader.read_exact(&mut header).await.map_err(map_io)?;
    let kind = Kind::from_byte(header[0]).ok_or(WireError::UnknownTag(header[0]))?;
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if length > MAX_PAYLOAD {
        return Err(WireError::Oversized(length));
    }
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await.map_err(map_io)?;
    Ok(Message { kind, payload })
}

fn map_io(err: io::Error) -> WireError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => WireError::Closed,
        _ => WireError::Io(err),
    }
}

/// STARTGAME payload: `<trump>:<c1><c2><c3>:<opponent>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartGame {
    pub trump: Suit,
    pub hand: [Card; 3],
    pub opponent: String,
}

impl StartGame {
    pub fn to_payload(&self) -> String {
        format!(
            "{}:{}{}{}:{}",
            self.trump.letter(),
            self.hand[0],
            self.hand[1],
            self.hand[2],
            self.opponent
        )
    }

    pub fn parse(payload: &str) -> Result<Self, InvalidPayload> {
        let mut parts = payload.splitn(3, ':');
        let trump = parts.next().ok_or(InvalidPayload)?;
        let cards = parts.next().ok_or(InvalidPayload)?;
        let opponent = parts.next().ok_or(InvalidPayload)?;
        let trump = match trump.as_bytes() {
            [letter] => Suit::from_letter(*letter).ok_or(InvalidPayload)?,
            _ => return Err(InvalidPayload),
        };
        if cards.len() != 6 || !cards.is_ascii() || opponent.is_empty() {
            return Err(InvalidPayload);
        }
        let token = |range| Card::from_str(&cards[range]).map_err(|_| InvalidPayload);
        let hand = [token(0..2)?, token(2..4)?, token(4..6)?];
        Ok(StartGame {
            trump,
            hand,
            opponent: opponent.to_owned(),
        })
    }
}

/// CARD payload: `t:<cc>` to whoever leads the next trick, `a:<cc>` to the
/// other player; the card is `NN` once the deck is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealtCard {
    pub leads_next: bool,
    pub card: Option<Card>,
}

impl DealtCard {
    pub fn to_payload(&self) -> String {
        let role = if self.leads_next { 't' } else { 'a' };
        match self.card {
            Some(card) => format!("{role}:{card}"),
            None => format!("{role}:{NO_CARD}"),
        }
    }

    pub fn parse(payload: &str) -> Result<Self, InvalidPayload> {
        let (role, token) = payload.split_once(':').ok_or(InvalidPayload)?;
        let leads_next = match role {
            "t" => true,
            "a" => false,
            _ => return Err(InvalidPayload),
        };
        let card = if token == NO_CARD {
            None
        } else {
            Some(Card::from_str(token).map_err(|_| InvalidPayload)?)
        };
        Ok(DealtCard { leads_next, card })
    }
}

/// ENDGAME payload: `<winner>:<points>`, with winner [`DRAW`] on a tie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub winner: String,
    pub points: u32,
}

impl GameResult {
    pub fn to_payload(&self) -> String {
        format!("{}:{}", self.winner, self.points)
    }

    pub fn parse(payload: &str) -> Result<Self, InvalidPayload> {
        let (winner, points) = payload.split_once(':').ok_or(InvalidPayload)?;
        if winner.is_empty() {
            return Err(InvalidPayload);
        }
        let points = points.parse().map_err(|_| InvalidPayload)?;
        Ok(GameResult {
            winner: winner.to_owned(),
            points,
        })
    }
}
