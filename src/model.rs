use std::fmt;

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BattleError, BattleResult};

pub const MAX_ENTRIES: usize = 2;

const ROOM_ID_MAX_LEN: usize = 64;
const ROOM_CODE_LEN: usize = 16;
const VOTER_ID_MAX_LEN: usize = 128;
const OWNER_NAME_MAX_LEN: usize = 64;
const IMAGE_REF_MAX_LEN: usize = 2048;

/// Join code of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: impl Into<String>) -> BattleResult<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > ROOM_ID_MAX_LEN {
            return Err(BattleError::invalid(format!(
                "room id must be 1..={ROOM_ID_MAX_LEN} characters"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BattleError::invalid(format!("malformed room id {raw:?}")));
        }
        Ok(Self(raw))
    }

    pub fn generate() -> Self {
        let code: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(ROOM_CODE_LEN)
            .map(char::from)
            .collect();
        Self(format!("room_{code}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = BattleError;

    fn try_from(raw: String) -> BattleResult<Self> {
        Self::parse(raw)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for EntryId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pseudonymous identity used only to stop a client voting twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterId(String);

impl VoterId {
    pub fn parse(raw: impl Into<String>) -> BattleResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() || raw.len() > VOTER_ID_MAX_LEN {
            return Err(BattleError::invalid(format!(
                "voter id must be 1..={VOTER_ID_MAX_LEN} characters"
            )));
        }
        Ok(Self(raw))
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VoterId {
    type Error = BattleError;

    fn try_from(raw: String) -> BattleResult<Self> {
        Self::parse(raw)
    }
}

impl From<VoterId> for String {
    fn from(id: VoterId) -> Self {
        id.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn parse(raw: impl Into<String>) -> BattleResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BattleError::invalid("image reference is empty"));
        }
        if trimmed.len() > IMAGE_REF_MAX_LEN {
            return Err(BattleError::invalid("image reference is too long"));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(BattleError::invalid("image reference contains whitespace"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trims and checks a participant name.
pub fn normalize_owner_name(raw: &str) -> BattleResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(BattleError::invalid("owner name is empty"));
    }
    if name.chars().count() > OWNER_NAME_MAX_LEN {
        return Err(BattleError::invalid(format!(
            "owner name is longer than {OWNER_NAME_MAX_LEN} characters"
        )));
    }
    Ok(name.to_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub owner_name: String,
    pub image_ref: ImageRef,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    Empty,
    Collecting,
    VoteEligible,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    /// Unix milliseconds.
    pub created_at: i64,
    pub entries: Vec<Entry>,
    pub voting_open: bool,
    pub voting_closed: bool,
}

/// What an upload did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seating {
    Seated,
    Replaced,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        let created_at = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Self {
            id,
            created_at: created_at as i64,
            entries: Vec::new(),
            voting_open: false,
            voting_closed: false,
        }
    }

    pub fn state(&self) -> RoomState {
        if self.voting_closed {
            RoomState::Closed
        } else if self.voting_open {
            RoomState::VoteEligible
        } else if self.entries.is_empty() {
            RoomState::Empty
        } else {
            RoomState::Collecting
        }
    }

    pub fn accepts_votes(&self) -> bool {
        self.voting_open && !self.voting_closed
    }

    pub fn entry(&self, id: &EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// 1-based position of an entry, the "player 1 / player 2" of the UI.
    pub fn slot_of(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id).map(|i| i + 1)
    }

    /// Whether [`Room::seat`] would accept `owner_name`, without changing
    /// anything.
    pub fn can_seat(&self, owner_name: &str) -> BattleResult<()> {
        if self.voting_closed {
            return Err(BattleError::RoomClosed);
        }
        let seated = self.entries.iter().any(|e| e.owner_name == owner_name);
        if !seated && self.entries.len() >= MAX_ENTRIES {
            return Err(BattleError::RoomFull);
        }
        Ok(())
    }

    /// Seats a new entry or swaps the image of the one owned by `owner_name`.
    /// Opens voting once the second entry is seated.
    pub fn seat(&mut self, owner_name: &str, image_ref: ImageRef) -> BattleResult<(Entry, Seating)> {
        self.can_seat(owner_name)?;

        let (entry, seating) =
            if let Some(existing) = self.entries.iter_mut().find(|e| e.owner_name == owner_name) {
                existing.image_ref = image_ref;
                (existing.clone(), Seating::Replaced)
            } else {
                let entry = Entry {
                    id: EntryId::generate(),
                    owner_name: owner_name.to_owned(),
                    image_ref,
                    vote_count: 0,
                };
                self.entries.push(entry.clone());
                (entry, Seating::Seated)
            };

        if self.entries.len() == MAX_ENTRIES {
            self.voting_open = true;
        }

        Ok((entry, seating))
    }

    /// Applies a vote that already passed the idempotency check.
    pub fn record_vote(&mut self, entry_id: &EntryId) -> BattleResult<()> {
        if !self.accepts_votes() {
            return Err(BattleError::VotingNotActive);
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| &e.id == entry_id)
            .ok_or(BattleError::EntryNotFound)?;
        entry.vote_count += 1;
        Ok(())
    }

    pub fn total_votes(&self) -> u64 {
        self.entries.iter().map(|e| e.vote_count).sum()
    }
}

/// Idempotency key for a ballot: one per (room, voter), never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub room_id: RoomId,
    pub voter_id: VoterId,
    pub entry_id: EntryId,
}
