/// The token did not name a card: unknown rank letter, unknown suit letter,
/// or not exactly two characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not a valid card token")]
pub struct InvalidCard;

/// A deck can only be built from all 40 distinct cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a deck must hold all 40 distinct cards")]
pub struct InvalidDeck;

/// A structured payload (STARTGAME, CARD, ENDGAME) did not match its
/// expected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed message payload")]
pub struct InvalidPayload;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("peer closed the connection")]
    Closed,
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    #[error("frame of {0} bytes exceeds the payload limit")]
    Oversized(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
