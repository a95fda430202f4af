use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Commit, RoomRepository, Versioned};
use crate::error::BattleResult;
use crate::model::{EntryId, Room, RoomId, VoteRecord, VoterId};

#[derive(Default)]
struct Tables {
    rooms: HashMap<RoomId, Versioned<Room>>,
    votes: HashMap<(RoomId, VoterId), EntryId>,
}

/// Process-local repository, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryRoomRepository {
    tables: RwLock<Tables>,
}

impl MemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for MemoryRoomRepository {
    async fn get(&self, id: &RoomId) -> BattleResult<Option<Versioned<Room>>> {
        Ok(self.tables.read().await.rooms.get(id).cloned())
    }

    async fn insert_if_absent(&self, room: Room) -> BattleResult<Versioned<Room>> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .rooms
            .entry(room.id.clone())
            .or_insert(Versioned { version: 1, value: room });
        Ok(stored.clone())
    }

    async fn commit(
        &self,
        expected: u64,
        room: &Room,
        vote: Option<&VoteRecord>,
    ) -> BattleResult<Commit> {
        let mut tables = self.tables.write().await;
        let Tables { rooms, votes } = &mut *tables;

        let Some(stored) = rooms.get_mut(&room.id) else {
            return Ok(Commit::Conflict);
        };
        if stored.version != expected {
            return Ok(Commit::Conflict);
        }
        if let Some(vote) = vote {
            let key = (vote.room_id.clone(), vote.voter_id.clone());
            if votes.contains_key(&key) {
                return Ok(Commit::Conflict);
            }
            votes.insert(key, vote.entry_id.clone());
        }

        stored.version += 1;
        stored.value = room.clone();
        Ok(Commit::Applied {
            version: stored.version,
        })
    }

    async fn vote_record(
        &self,
        room_id: &RoomId,
        voter_id: &VoterId,
    ) -> BattleResult<Option<VoteRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .get(&(room_id.clone(), voter_id.clone()))
            .map(|entry_id| VoteRecord {
                room_id: room_id.clone(),
                voter_id: voter_id.clone(),
                entry_id: entry_id.clone(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::conformance;

    #[tokio::test]
    async fn memory_repository_conformance() {
        let repo = MemoryRoomRepository::new();
        conformance::run_all(&repo).await;
    }

    #[tokio::test]
    async fn commit_against_unknown_room_conflicts() {
        let repo = MemoryRoomRepository::new();
        let room = Room::new(RoomId::parse("ghost").unwrap());
        assert_eq!(repo.commit(1, &room, None).await.unwrap(), Commit::Conflict);
    }
}
