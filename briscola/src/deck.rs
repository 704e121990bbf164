use rand::seq::SliceRandom;
use rand::Rng;

use crate::{Card, InvalidDeck, Suit, Value};

/// Number of cards in a Briscola deck.
pub const DECK_SIZE: usize = 40;

/// A shuffled 40-card deck with a draw cursor. The trump suit is the suit of
/// the last card and is fixed at construction.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    next: usize,
    trump: Suit,
}

impl Deck {
    /// Build a uniformly shuffled deck. Pass a seeded
    /// [`rand_chacha::ChaCha20Rng`] for a reproducible order.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut cards: Vec<Card> = Suit::ALL
            .into_iter()
            .flat_map(|suit| Value::ALL.into_iter().map(move |value| Card::new(value, suit)))
            .collect();
        cards.shuffle(rng);
        let trump = cards[DECK_SIZE - 1].suit;
        Deck {
            cards,
            next: 0,
            trump,
        }
    }

    /// Build a deck with a forced order. Errors unless `cards` holds all 40
    /// distinct cards.
    pub fn from_cards(cards: Vec<Card>) -> Result<Self, InvalidDeck> {
        if cards.len() != DECK_SIZE {
            return Err(InvalidDeck);
        }
        let mut seen = [false; DECK_SIZE];
        for card in &cards {
            let slot = card.suit as usize * Value::ALL.len() + card.value as usize;
            if seen[slot] {
                return Err(InvalidDeck);
            }
            seen[slot] = true;
        }
        let trump = cards[DECK_SIZE - 1].suit;
        Ok(Deck {
            cards,
            next: 0,
            trump,
        })
    }

    pub fn trump(&self) -> Suit {
        self.trump
    }

    /// Next card, or `None` once all 40 have been drawn. Exhaustion is a
    /// normal outcome, not an error.
    pub fn draw(&mut self) -> Option<Card> {
        let card = self.cards.get(self.next).copied();
        if card.is_some() {
            self.next += 1;
        }
        card
    }

    pub fn remaining(&self) -> usize {
        DECK_SIZE - self.next
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn test_deck_holds_all_distinct_cards() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut deck = Deck::shuffled(&mut rng);
        let mut drawn = Vec::new();
        while let Some(card) = deck.draw() {
            assert!(!drawn.contains(&card), "duplicate {card}");
            drawn.push(card);
        }
        assert_eq!(drawn.len(), DECK_SIZE);
    }

    #[test]
    fn test_trump_is_the_last_card_suit() {
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let mut deck = Deck::shuffled(&mut rng);
        let trump = deck.trump();
        let mut last = None;
        while let Some(card) = deck.draw() {
            last = Some(card);
        }
        assert_eq!(last.unwrap().suit, trump);
    }

    #[test]
    fn test_draw_past_the_end_keeps_returning_none() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let mut deck = Deck::shuffled(&mut rng);
        for _ in 0..DECK_SIZE {
            assert!(deck.draw().is_some());
        }
        assert_eq!(deck.remaining(), 0);
        assert_eq!(deck.draw(), None);
        assert_eq!(deck.draw(), None);
    }

    #[test]
    fn test_seeded_shuffles_are_reproducible() {
        let mut first = Deck::shuffled(&mut ChaCha20Rng::seed_from_u64(42));
        let mut second = Deck::shuffled(&mut ChaCha20Rng::seed_from_u64(42));
        for _ in 0..DECK_SIZE {
            assert_eq!(first.draw(), second.draw());
        }
    }

    #[test]
    fn test_forced_decks_must_be_complete() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let mut deck = Deck::shuffled(&mut rng);
        let mut cards = Vec::new();
        while let Some(card) = deck.draw() {
            cards.push(card);
        }
        assert!(Deck::from_cards(cards.clone()).is_ok());
        assert!(Deck::from_cards(cards[..39].to_vec()).is_err());
        cards[0] = cards[1];
        assert!(Deck::from_cards(cards).is_err());
    }
}
