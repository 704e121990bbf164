use std::fmt;

use crate::Card;

/// A player's three card slots. A slot only becomes empty once the deck has
/// run out at refill time, so a match ends exactly when both hands are empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hand([Option<Card>; 3]);

impl Hand {
    pub fn new(cards: [Card; 3]) -> Self {
        Hand(cards.map(Some))
    }

    /// Occupied slots, in slot order.
    pub fn cards(&self) -> impl Iterator<Item = Card> + '_ {
        self.0.iter().flatten().copied()
    }

    /// Membership is by value and suit, not slot identity.
    pub fn contains(&self, card: Card) -> bool {
        self.0.contains(&Some(card))
    }

    /// Swap the slot holding `old` for `new`; `None` (the deck was
    /// exhausted) empties the slot instead.
    pub fn replace(&mut self, new: Option<Card>, old: Card) {
        for slot in &mut self.0 {
            if *slot == Some(old) {
                *slot = new;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Slot-wise exchange of two hands. Empty slots travel like any other,
    /// so no card is lost when the hands have emptied unevenly.
    pub fn swap(first: &mut Hand, second: &mut Hand) {
        for (a, b) in first.0.iter_mut().zip(second.0.iter_mut()) {
            std::mem::swap(a, b);
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separate = false;
        for card in self.cards() {
            if separate {
                write!(f, " ")?;
            }
            write!(f, "{card}")?;
            separate = true;
        }
        Ok(())
    }
}

/// A match is over once every slot of both hands is empty.
pub fn match_over(first: &Hand, second: &Hand) -> bool {
    first.is_empty() && second.is_empty()
}
