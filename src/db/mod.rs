//! Room storage.
//!
//! Rooms are stored as whole documents with a version counter; every write
//! is a compare-and-swap on that version. A ballot's [`VoteRecord`] is
//! written in the same atomic unit as the tally it bumps.

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::BattleResult;
use crate::model::{Room, RoomId, VoteRecord, VoterId};

pub use memory::MemoryRoomRepository;
pub use sqlite::SqliteRoomRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied { version: u64 },
    /// Someone else wrote first; re-read and re-check.
    Conflict,
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn get(&self, id: &RoomId) -> BattleResult<Option<Versioned<Room>>>;

    /// Stores `room` unless its id is taken, then returns whatever is stored.
    async fn insert_if_absent(&self, room: Room) -> BattleResult<Versioned<Room>>;

    /// Replaces the room if it is still at `expected`, recording `vote`
    /// alongside. A vote whose (room, voter) pair already exists is a
    /// conflict and nothing is written.
    async fn commit(
        &self,
        expected: u64,
        room: &Room,
        vote: Option<&VoteRecord>,
    ) -> BattleResult<Commit>;

    async fn vote_record(
        &self,
        room_id: &RoomId,
        voter_id: &VoterId,
    ) -> BattleResult<Option<VoteRecord>>;
}

pub type DynRoomRepository = dyn RoomRepository;
