//! Tallies derived from a room snapshot.
//!
//! Always computed from the room as read; votes arrive continuously so
//! nothing here is stored.

use serde::Serialize;

use crate::model::{EntryId, Room, RoomId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResult {
    pub id: EntryId,
    pub owner_name: String,
    pub slot: usize,
    pub vote_count: u64,
    pub share_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outcome {
    Winner { entry: EntryResult },
    Tie { score: u64 },
    NoVotesYet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    pub room_id: RoomId,
    pub total_votes: u64,
    pub voting_open: bool,
    pub voting_closed: bool,
    /// Ranked by votes, ties in seating order.
    pub entries: Vec<EntryResult>,
    pub outcome: Outcome,
}

/// Rounded half up, as a whole percent.
fn share_percent(votes: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (votes * 200 + total) / (total * 2)
}

pub fn tally(room: &Room) -> Results {
    let total_votes = room.total_votes();

    let mut entries: Vec<EntryResult> = room
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| EntryResult {
            id: e.id.clone(),
            owner_name: e.owner_name.clone(),
            slot: i + 1,
            vote_count: e.vote_count,
            share_percent: share_percent(e.vote_count, total_votes),
        })
        .collect();
    // stable, so equal counts keep seating order
    entries.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

    let outcome = match entries.as_slice() {
        _ if total_votes == 0 => Outcome::NoVotesYet,
        [first, second, ..] if first.vote_count == second.vote_count => Outcome::Tie {
            score: first.vote_count,
        },
        [first, ..] => Outcome::Winner {
            entry: first.clone(),
        },
        [] => Outcome::NoVotesYet,
    };

    Results {
        room_id: room.id.clone(),
        total_votes,
        voting_open: room.voting_open,
        voting_closed: room.voting_closed,
        entries,
        outcome,
    }
}
