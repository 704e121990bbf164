//! The server side of one match.
//!
//! The engine labels the two endpoints "first" (leads the trick) and
//! "second" (follows). When the follower takes a trick the hands, names,
//! and connections are swapped so the per-trick logic stays symmetric;
//! capture piles are keyed to the players' identities and never move.

use std::path::PathBuf;

use briscola::message::{self, DealtCard, GameResult, Kind, Message, StartGame, DRAW};
use briscola::{first_takes, match_over, points, Card, Deck, Hand, DECK_SIZE};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::errors::MatchError;
use crate::session::Conn;

const BAD_CARD: &str = "bad card format";
const NOT_IN_HAND: &str = "card not in hand";

/// Everything a match needs besides its endpoints.
pub(crate) struct MatchSetup {
    pub serial: u64,
    pub deck: Deck,
    pub transcript: PathBuf,
}

pub(crate) async fn play(
    setup: MatchSetup,
    mut first_conn: Conn,
    mut second_conn: Conn,
    challenger: &str,
    awaited: &str,
) -> Result<(), MatchError> {
    let MatchSetup {
        serial,
        mut deck,
        transcript,
    } = setup;
    let trump = deck.trump();
    log::info!(
        "match {serial}: {challenger} vs {awaited}, trump {}",
        trump.letter()
    );

    let mut log_file = BufWriter::new(
        File::create(&transcript)
            .await
            .map_err(MatchError::Transcript)?,
    );
    log_file
        .write_all(format!("{challenger}:{awaited}\nBRISCOLA:{}\n", trump.letter()).as_bytes())
        .await
        .map_err(MatchError::Transcript)?;

    // Alternating deal, challenger first. A fresh deck always covers it.
    let mut challenger_cards = Vec::with_capacity(3);
    let mut awaited_cards = Vec::with_capacity(3);
    for _ in 0..3 {
        challenger_cards.push(deck.draw().unwrap());
        awaited_cards.push(deck.draw().unwrap());
    }
    let challenger_cards: [Card; 3] = challenger_cards.try_into().unwrap();
    let awaited_cards: [Card; 3] = awaited_cards.try_into().unwrap();

    let start = StartGame {
        trump,
        hand: challenger_cards,
        opponent: awaited.to_owned(),
    };
    message::send(
        &mut first_conn,
        &Message::new(Kind::StartGame, start.to_payload()),
    )
    .await?;
    let start = StartGame {
        trump,
        hand: awaited_cards,
        opponent: challenger.to_owned(),
    };
    message::send(
        &mut second_conn,
        &Message::new(Kind::StartGame, start.to_payload()),
    )
    .await?;

    let mut first_hand = Hand::new(challenger_cards);
    let mut second_hand = Hand::new(awaited_cards);
    let mut challenger_pile: Vec<Card> = Vec::new();
    let mut awaited_pile: Vec<Card> = Vec::new();
    let (mut first_name, mut second_name) = (challenger, awaited);
    let mut first_is_challenger = true;

    loop {
        let card_first = receive_play(&mut first_conn, &first_hand).await?;
        message::send(
            &mut second_conn,
            &Message::new(Kind::Play, card_first.to_string()),
        )
        .await?;
        let card_second = receive_play(&mut second_conn, &second_hand).await?;
        message::send(&mut second_conn, &Message::empty(Kind::Ok)).await?;
        message::send(
            &mut first_conn,
            &Message::new(Kind::Play, card_second.to_string()),
        )
        .await?;

        log_file
            .write_all(
                format!("{first_name}:{card_first}#{second_name}:{card_second}\n").as_bytes(),
            )
            .await
            .map_err(MatchError::Transcript)?;

        let first_took = first_takes(trump, card_first, card_second);
        let winner_pile = if first_took == first_is_challenger {
            &mut challenger_pile
        } else {
            &mut awaited_pile
        };
        winner_pile.push(card_first);
        winner_pile.push(card_second);
        if !first_took {
            // The follower leads the next trick; swap so the "first" labels
            // keep pointing at the leader.
            Hand::swap(&mut first_hand, &mut second_hand);
            std::mem::swap(&mut first_conn, &mut second_conn);
            std::mem::swap(&mut first_name, &mut second_name);
            first_is_challenger = !first_is_challenger;
        }

        let (winning_card, losing_card) = if first_took {
            (card_first, card_second)
        } else {
            (card_second, card_first)
        };
        let drawn_first = deck.draw();
        first_hand.replace(drawn_first, winning_card);
        let drawn_second = deck.draw();
        second_hand.replace(drawn_second, losing_card);

        debug_assert_eq!(
            first_hand.cards().count()
                + second_hand.cards().count()
                + challenger_pile.len()
                + awaited_pile.len()
                + deck.remaining(),
            DECK_SIZE
        );

        if match_over(&first_hand, &second_hand) {
            break;
        }

        let dealt = DealtCard {
            leads_next: true,
            card: drawn_first,
        };
        message::send(
            &mut first_conn,
            &Message::new(Kind::NewCard, dealt.to_payload()),
        )
        .await?;
        let dealt = DealtCard {
            leads_next: false,
            card: drawn_second,
        };
        message::send(
            &mut second_conn,
            &Message::new(Kind::NewCard, dealt.to_payload()),
        )
        .await?;
    }

    let challenger_points = points(challenger_pile.iter().copied());
    let awaited_points = points(awaited_pile.iter().copied());
    let result = decide(challenger, challenger_points, awaited, awaited_points);
    log_file
        .write_all(format!("WINS:{}\nPOINTS:{}\n", result.winner, result.points).as_bytes())
        .await
        .map_err(MatchError::Transcript)?;
    log_file.flush().await.map_err(MatchError::Transcript)?;

    let endgame = Message::new(Kind::EndGame, result.to_payload());
    message::send(&mut first_conn, &endgame).await?;
    message::send(&mut second_conn, &endgame).await?;
    log::info!("match {serial}: {} with {} points", result.winner, result.points);
    Ok(())
}

/// Wait for an acceptable card from one endpoint. Undecodable tokens and
/// cards not in the hand are answered with ERR and the endpoint is asked
/// again; nothing else changes.
async fn receive_play(conn: &mut Conn, hand: &Hand) -> Result<Card, MatchError> {
    loop {
        let message = message::recv(conn).await?;
        let complaint = if message.kind != Kind::Play {
            BAD_CARD
        } else {
            match message.text().parse::<Card>() {
                Err(_) => BAD_CARD,
                Ok(card) if !hand.contains(card) => NOT_IN_HAND,
                Ok(card) => return Ok(card),
            }
        };
        message::send(conn, &Message::new(Kind::Err, complaint)).await?;
    }
}

/// Winner name and points; a 60/60 split is a draw.
fn decide(
    challenger: &str,
    challenger_points: u32,
    awaited: &str,
    awaited_points: u32,
) -> GameResult {
    if challenger_points > awaited_points {
        GameResult {
            winner: challenger.to_owned(),
            points: challenger_points,
        }
    } else if awaited_points > challenger_points {
        GameResult {
            winner: awaited.to_owned(),
            points: awaited_points,
        }
    } else {
        GameResult {
            winner: DRAW.to_owned(),
            points: challenger_points,
        }
    }
}
