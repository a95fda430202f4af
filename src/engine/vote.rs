use tracing::{debug, warn};

use super::{Engine, MAX_COMMIT_ATTEMPTS};
use crate::db::Commit;
use crate::error::{BattleError, BattleResult};
use crate::model::{EntryId, RoomId, VoteRecord, VoterId};

impl Engine {
    /// Casts one ballot. Checks run in a fixed order and the first failure
    /// wins: voting active, entry exists, voter has not voted here.
    ///
    /// The tally bump and the [`VoteRecord`] are committed together, so a
    /// retry after success always comes back [`BattleError::AlreadyVoted`].
    pub async fn vote(
        &self,
        room_id: &RoomId,
        entry_id: &EntryId,
        voter_id: &VoterId,
    ) -> BattleResult<()> {
        self.try_vote(room_id, entry_id, voter_id)
            .await
            .inspect_err(|e| debug!("vote by {voter_id} in room {room_id} rejected: {e}"))
    }

    async fn try_vote(
        &self,
        room_id: &RoomId,
        entry_id: &EntryId,
        voter_id: &VoterId,
    ) -> BattleResult<()> {
        let _guard = self.locks.acquire(room_id).await;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let Some(stored) = self.read(room_id).await? else {
                return Err(BattleError::VotingNotActive);
            };
            let mut room = stored.value;

            if !room.accepts_votes() {
                return Err(BattleError::VotingNotActive);
            }
            if room.entry(entry_id).is_none() {
                return Err(BattleError::EntryNotFound);
            }
            if self.repo.vote_record(room_id, voter_id).await?.is_some() {
                return Err(BattleError::AlreadyVoted);
            }

            room.record_vote(entry_id)?;
            let ballot = VoteRecord {
                room_id: room_id.clone(),
                voter_id: voter_id.clone(),
                entry_id: entry_id.clone(),
            };

            match self.repo.commit(stored.version, &room, Some(&ballot)).await? {
                Commit::Applied { .. } => {
                    debug!("{voter_id} voted for {entry_id} in room {room_id}");
                    self.publish(&room);
                    return Ok(());
                }
                Commit::Conflict => warn!("vote in room {room_id} lost a race, retrying"),
            }
        }
        Err(BattleError::Contention(room_id.to_string()))
    }
}
