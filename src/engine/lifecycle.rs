use tracing::{debug, info, warn};

use super::{Engine, MAX_COMMIT_ATTEMPTS};
use crate::db::Commit;
use crate::error::{BattleError, BattleResult};
use crate::images::{ImagePayload, check_payload};
use crate::model::{Entry, ImageRef, Room, RoomId, RoomState, Seating, normalize_owner_name};
use crate::results::{Results, tally};

const CREATE_ATTEMPTS: usize = 3;

impl Engine {
    /// Returns the room, opening an empty one for an id never seen before.
    pub async fn get_room(&self, id: &RoomId) -> BattleResult<Room> {
        Ok(self.read_or_create(id).await?.value)
    }

    /// Opens a room under a freshly generated join code.
    pub async fn create_room(&self) -> BattleResult<Room> {
        for _ in 0..CREATE_ATTEMPTS {
            let room = Room::new(RoomId::generate());
            let stored = self.repo.insert_if_absent(room.clone()).await?;
            if stored.value == room {
                info!("room {} created", room.id);
                return Ok(room);
            }
            warn!("generated room code {} already taken", room.id);
        }
        Err(BattleError::Contention("new room".to_owned()))
    }

    /// Seats `owner_name` in the room, or swaps their image if already seated.
    pub async fn upload(
        &self,
        id: &RoomId,
        owner_name: &str,
        image_ref: ImageRef,
    ) -> BattleResult<Entry> {
        let owner_name = normalize_owner_name(owner_name)?;
        let _guard = self.locks.acquire(id).await;
        self.seat_locked(id, &owner_name, image_ref).await
    }

    /// Upload straight from a client payload. Bytes reach the image store
    /// only once the room is known to take this owner, and are removed again
    /// if seating still fails.
    pub async fn upload_entry(
        &self,
        id: &RoomId,
        owner_name: &str,
        payload: ImagePayload,
    ) -> BattleResult<Entry> {
        let owner_name = normalize_owner_name(owner_name)?;
        check_payload(&payload, self.max_image_bytes)?;

        let _guard = self.locks.acquire(id).await;
        let (image_ref, stored) = match payload {
            ImagePayload::Bytes { data, content_type } => {
                self.read_or_create(id).await?.value.can_seat(&owner_name)?;
                let image_ref = self.images.store(data, content_type.as_deref()).await?;
                (image_ref, true)
            }
            ImagePayload::Ref(raw) => (ImageRef::parse(raw)?, false),
        };

        let seated = self.seat_locked(id, &owner_name, image_ref.clone()).await;
        if seated.is_err() && stored {
            if let Err(e) = self.images.remove(&image_ref).await {
                warn!("could not remove unused image {}: {e}", image_ref.as_str());
            }
        }
        seated
    }

    /// Caller holds the room lock.
    async fn seat_locked(
        &self,
        id: &RoomId,
        owner_name: &str,
        image_ref: ImageRef,
    ) -> BattleResult<Entry> {
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let stored = self.read_or_create(id).await?;
            let mut room = stored.value;
            let before = room.state();

            let (entry, seating) = room.seat(owner_name, image_ref.clone())?;

            match self.repo.commit(stored.version, &room, None).await? {
                Commit::Applied { .. } => {
                    match seating {
                        Seating::Seated => info!("{owner_name} seated in room {id}"),
                        Seating::Replaced => debug!("{owner_name} replaced their image in room {id}"),
                    }
                    if before != RoomState::VoteEligible && room.state() == RoomState::VoteEligible {
                        info!("voting opened in room {id}");
                    }
                    self.publish(&room);
                    return Ok(entry);
                }
                Commit::Conflict => warn!("upload to room {id} lost a race, retrying"),
            }
        }
        Err(BattleError::Contention(id.to_string()))
    }

    /// Ends voting. Closing twice is a no-op; a room that never opened
    /// voting cannot be closed.
    pub async fn close_voting(&self, id: &RoomId) -> BattleResult<Room> {
        let _guard = self.locks.acquire(id).await;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let Some(stored) = self.read(id).await? else {
                return Err(BattleError::VotingNotActive);
            };
            let mut room = stored.value;
            match room.state() {
                RoomState::Closed => return Ok(room),
                RoomState::VoteEligible => room.voting_closed = true,
                RoomState::Empty | RoomState::Collecting => {
                    return Err(BattleError::VotingNotActive);
                }
            }

            match self.repo.commit(stored.version, &room, None).await? {
                Commit::Applied { .. } => {
                    info!("voting closed in room {id} with {} votes", room.total_votes());
                    self.publish(&room);
                    return Ok(room);
                }
                Commit::Conflict => warn!("closing room {id} lost a race, retrying"),
            }
        }
        Err(BattleError::Contention(id.to_string()))
    }

    pub async fn results(&self, id: &RoomId) -> BattleResult<Results> {
        Ok(tally(&self.get_room(id).await?))
    }
}
