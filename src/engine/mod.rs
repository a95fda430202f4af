//! The room/vote consistency engine.
//!
//! Writers to one room are serialised twice over: a per-room async mutex
//! inside this process, and a version compare-and-swap in the repository for
//! writers in other processes. Readers never take the room lock.

mod lifecycle;
mod vote;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedMutexGuard, broadcast};
use tracing::{info, warn};

use crate::db::{DynRoomRepository, Versioned};
use crate::error::BattleResult;
use crate::images::ImageStore;
use crate::model::{Room, RoomId};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const MAX_COMMIT_ATTEMPTS: usize = 8;
const READ_RETRIES: usize = 2;
const UPDATE_BUFFER: usize = 64;

#[derive(Default)]
struct RoomLocks {
    locks: Mutex<HashMap<RoomId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RoomLocks {
    async fn acquire(&self, id: &RoomId) -> RoomGuard<'_> {
        // declared before `lock` so a cancelled wait still cleans up
        let mut room_guard = RoomGuard {
            locks: self,
            id: id.clone(),
            guard: None,
        };
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id.clone()).or_default().clone()
        };
        room_guard.guard = Some(lock.lock_owned().await);
        room_guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Holds a room's lock; the map entry goes away with the last holder.
struct RoomGuard<'a> {
    locks: &'a RoomLocks,
    id: RoomId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RoomGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        // anyone waiting cloned the Arc under this same map lock
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

pub struct Engine {
    repo: Arc<DynRoomRepository>,
    images: Arc<dyn ImageStore>,
    locks: RoomLocks,
    updates: broadcast::Sender<Room>,
    max_image_bytes: usize,
}

impl Engine {
    pub fn new(repo: Arc<DynRoomRepository>, images: Arc<dyn ImageStore>) -> Self {
        Self {
            repo,
            images,
            locks: RoomLocks::default(),
            updates: broadcast::channel(UPDATE_BUFFER).0,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// Every room snapshot committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Room> {
        self.updates.subscribe()
    }

    fn publish(&self, room: &Room) {
        // no subscribers is fine
        let _ = self.updates.send(room.clone());
    }

    async fn read(&self, id: &RoomId) -> BattleResult<Option<Versioned<Room>>> {
        let mut attempt = 0;
        loop {
            match self.repo.get(id).await {
                Err(e) if e.is_infrastructure() && attempt < READ_RETRIES => {
                    attempt += 1;
                    warn!("reading room {id} failed ({e}), retry {attempt}/{READ_RETRIES}");
                }
                other => return other,
            }
        }
    }

    async fn read_or_create(&self, id: &RoomId) -> BattleResult<Versioned<Room>> {
        if let Some(stored) = self.read(id).await? {
            return Ok(stored);
        }
        let stored = self.repo.insert_if_absent(Room::new(id.clone())).await?;
        info!("room {id} opened");
        Ok(stored)
    }
}
