use std::fmt;
use std::str::FromStr;

pub use deck::{Deck, DECK_SIZE};
pub use errors::{InvalidCard, InvalidDeck, InvalidPayload, WireError};
pub use hand::{match_over, Hand};

pub mod deck;
mod errors;
pub mod hand;
pub mod message;

/// Card values of a 40-card Italian deck. The declaration order is the plain
/// ordinal order used by the same-suit comparison; Ace and Three are
/// special-cased there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Jack,
    Queen,
    King,
}

impl Value {
    pub const ALL: [Value; 10] = [
        Value::Ace,
        Value::Two,
        Value::Three,
        Value::Four,
        Value::Five,
        Value::Six,
        Value::Seven,
        Value::Jack,
        Value::Queen,
        Value::King,
    ];

    /// Card points under Briscola scoring. The whole deck totals 120.
    pub fn points(self) -> u32 {
        match self {
            Value::Ace => 11,
            Value::Three => 10,
            Value::King => 4,
            Value::Queen => 3,
            Value::Jack => 2,
            _ => 0,
        }
    }

    fn letter(self) -> char {
        match self {
            Value::Ace => 'A',
            Value::Two => '2',
            Value::Three => '3',
            Value::Four => '4',
            Value::Five => '5',
            Value::Six => '6',
            Value::Seven => '7',
            Value::Jack => 'J',
            Value::Queen => 'Q',
            Value::King => 'K',
        }
    }

    fn from_letter(letter: u8) -> Option<Value> {
        match letter {
            b'A' => Some(Value::Ace),
            b'2' => Some(Value::Two),
            b'3' => Some(Value::Three),
            b'4' => Some(Value::Four),
            b'5' => Some(Value::Five),
            b'6' => Some(Value::Six),
            b'7' => Some(Value::Seven),
            b'J' => Some(Value::Jack),
            b'Q' => Some(Value::Queen),
            b'K' => Some(Value::King),
            _ => None,
        }
    }
}

/// Suits, rendered with their Italian initials (Cuori, Quadri, Fiori,
/// Picche) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    pub fn letter(self) -> char {
        match self {
            Suit::Hearts => 'C',
            Suit::Diamonds => 'Q',
            Suit::Clubs => 'F',
            Suit::Spades => 'P',
        }
    }

    pub fn from_letter(letter: u8) -> Option<Suit> {
        match letter {
            b'C' => Some(Suit::Hearts),
            b'Q' => Some(Suit::Diamonds),
            b'F' => Some(Suit::Clubs),
            b'P' => Some(Suit::Spades),
            _ => None,
        }
    }
}

/// A playing card. The external form is a two-character token, rank letter
/// first: `AC` is the Ace of Hearts, `2P` the Two of Spades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub value: Value,
    pub suit: Suit,
}

impl Card {
    pub const fn new(value: Value, suit: Suit) -> Self {
        Card { value, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value.letter(), self.suit.letter())
    }
}

impl FromStr for Card {
    type Err = InvalidCard;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [rank, suit] => {
                let value = Value::from_letter(*rank).ok_or(InvalidCard)?;
                let suit = Suit::from_letter(*suit).ok_or(InvalidCard)?;
                Ok(Card::new(value, suit))
            }
            _ => Err(InvalidCard),
        }
    }
}

/// Decide whether the card that led the trick takes it over the card that
/// followed. Trump beats any other suit; between distinct non-trump suits
/// the lead wins regardless of rank; within one suit the Ace beats
/// everything, the Three everything but the Ace, and higher ordinals win
/// otherwise.
pub fn first_takes(trump: Suit, first: Card, second: Card) -> bool {
    if first.suit == second.suit {
        same_suit_takes(first.value, second.value)
    } else if first.suit == trump {
        true
    } else {
        second.suit != trump
    }
}

fn same_suit_takes(first: Value, second: Value) -> bool {
    match (first, second) {
        (Value::Ace, _) => true,
        (Value::Three, second) => second != Value::Ace,
        (first, second) => second != Value::Ace && second != Value::Three && first > second,
    }
}

/// Total points of a multiset of captured cards.
pub fn points<I>(cards: I) -> u32
where
    I: IntoIterator<Item = Card>,
{
    cards.into_iter().map(|card| card.value.points()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_on_the_full_deck() {
        for suit in Suit::ALL {
            for value in Value::ALL {
                let card = Card::new(value, suit);
                let token = card.to_string();
                assert_eq!(token.len(), 2);
                assert_eq!(token.parse::<Card>(), Ok(card), "token {token}");
            }
        }
    }

    #[test]
    fn test_bad_tokens_are_rejected() {
        for token in ["", "A", "AX", "1C", "XX", "ACC", "ca"] {
            assert_eq!(token.parse::<Card>(), Err(InvalidCard), "token {token:?}");
        }
    }

    #[test]
    fn test_full_deck_scores_120() {
        let everything = Suit::ALL
            .into_iter()
            .flat_map(|suit| Value::ALL.into_iter().map(move |value| Card::new(value, suit)));
        assert_eq!(points(everything), 120);
    }

    #[test]
    fn test_trump_dominates_other_suits() {
        let trump = Suit::Spades;
        // Ace of Hearts led, Two of Spades follows: trump takes it.
        let first = Card::new(Value::Ace, Suit::Hearts);
        let second = Card::new(Value::Two, Suit::Spades);
        assert!(!first_takes(trump, first, second));
        // Trump led keeps the trick against any off-suit card.
        let first = Card::new(Value::Two, Suit::Spades);
        let second = Card::new(Value::Ace, Suit::Hearts);
        assert!(first_takes(trump, first, second));
    }

    #[test]
    fn test_off_suit_follow_loses_regardless_of_rank() {
        let trump = Suit::Spades;
        for value in Value::ALL {
            let first = Card::new(Value::Two, Suit::Hearts);
            let second = Card::new(value, Suit::Clubs);
            assert!(first_takes(trump, first, second), "follow {value:?}");
        }
    }

    #[test]
    fn test_same_suit_comparison() {
        let cases = [
            (Value::Ace, Value::Three, true),
            (Value::Three, Value::Ace, false),
            (Value::Three, Value::King, true),
            (Value::King, Value::Three, false),
            (Value::King, Value::Queen, true),
            (Value::Queen, Value::King, false),
            (Value::Jack, Value::Seven, true),
            (Value::Seven, Value::Jack, false),
            (Value::Seven, Value::Two, true),
            (Value::Two, Value::Seven, false),
            (Value::Ace, Value::Two, true),
            (Value::Two, Value::Ace, false),
        ];
        for (first, second, expected) in cases {
            let first = Card::new(first, Suit::Clubs);
            let second = Card::new(second, Suit::Clubs);
            assert_eq!(
                first_takes(Suit::Hearts, first, second),
                expected,
                "comparison failed for {first} and {second}"
            );
            // The outcome is the same when the shared suit is the trump.
            assert_eq!(
                first_takes(Suit::Clubs, first, second),
                expected,
                "trump comparison failed for {first} and {second}"
            );
        }
    }
}
