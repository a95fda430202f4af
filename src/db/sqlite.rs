use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

use super::{Commit, RoomRepository, Versioned};
use crate::error::BattleResult;
use crate::model::{EntryId, Room, RoomId, VoteRecord, VoterId};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS rooms (
        id TEXT PRIMARY KEY NOT NULL,
        version INTEGER NOT NULL,
        doc TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        room_id TEXT NOT NULL,
        voter_id TEXT NOT NULL,
        entry_id TEXT NOT NULL,
        cast_at INTEGER NOT NULL,
        PRIMARY KEY (room_id, voter_id)
    )",
];

pub struct SqliteRoomRepository {
    db_pool: SqlitePool,
}

impl SqliteRoomRepository {
    /// Opens the database in WAL mode, creating the file if needed. Writers
    /// from other connections wait up to five seconds for the write lock.
    pub async fn connect(database_url: &str) -> BattleResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;
        info!("Connected to {database_url}");
        Self::with_pool(db_pool).await
    }

    pub async fn with_pool(db_pool: SqlitePool) -> BattleResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&db_pool).await?;
        }
        Ok(Self { db_pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db_pool
    }
}

fn decode(version: i64, doc: &str) -> BattleResult<Versioned<Room>> {
    Ok(Versioned {
        version: version as u64,
        value: serde_json::from_str(doc)?,
    })
}

#[async_trait]
impl RoomRepository for SqliteRoomRepository {
    async fn get(&self, id: &RoomId) -> BattleResult<Option<Versioned<Room>>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT version,doc FROM rooms WHERE id=?")
                .bind(id.as_str())
                .fetch_optional(&self.db_pool)
                .await?;

        row.map(|(version, doc)| decode(version, &doc)).transpose()
    }

    async fn insert_if_absent(&self, room: Room) -> BattleResult<Versioned<Room>> {
        let doc = serde_json::to_string(&room)?;
        sqlx::query("INSERT OR IGNORE INTO rooms (id,version,doc) VALUES (?,1,?)")
            .bind(room.id.as_str())
            .bind(&doc)
            .execute(&self.db_pool)
            .await?;

        let (version, doc): (i64, String) =
            sqlx::query_as("SELECT version,doc FROM rooms WHERE id=?")
                .bind(room.id.as_str())
                .fetch_one(&self.db_pool)
                .await?;
        decode(version, &doc)
    }

    async fn commit(
        &self,
        expected: u64,
        room: &Room,
        vote: Option<&VoteRecord>,
    ) -> BattleResult<Commit> {
        let doc = serde_json::to_string(room)?;
        let mut tx = self.db_pool.begin().await?;

        let updated = sqlx::query("UPDATE rooms SET version=version+1, doc=? WHERE id=? AND version=?")
            .bind(&doc)
            .bind(room.id.as_str())
            .bind(expected as i64)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Commit::Conflict);
        }

        if let Some(vote) = vote {
            let cast_at = time::OffsetDateTime::now_utc().unix_timestamp();
            let inserted = sqlx::query(
                "INSERT INTO votes (room_id,voter_id,entry_id,cast_at) VALUES (?,?,?,?)",
            )
            .bind(vote.room_id.as_str())
            .bind(vote.voter_id.as_str())
            .bind(vote.entry_id.as_str())
            .bind(cast_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    tx.rollback().await?;
                    return Ok(Commit::Conflict);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(Commit::Applied {
            version: expected + 1,
        })
    }

    async fn vote_record(
        &self,
        room_id: &RoomId,
        voter_id: &VoterId,
    ) -> BattleResult<Option<VoteRecord>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT entry_id FROM votes WHERE room_id=? AND voter_id=?")
                .bind(room_id.as_str())
                .bind(voter_id.as_str())
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(row.map(|(entry_id,)| VoteRecord {
            room_id: room_id.clone(),
            voter_id: voter_id.clone(),
            entry_id: EntryId::from(entry_id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::conformance;

    async fn repo() -> SqliteRoomRepository {
        // every connection to :memory: is its own database
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteRoomRepository::with_pool(db_pool).await.unwrap()
    }

    #[tokio::test]
    async fn sqlite_repository_conformance() {
        conformance::run_all(&repo().await).await;
    }

    #[tokio::test]
    async fn documents_survive_a_round_trip_through_sql() {
        let repo = repo().await;
        let mut room = Room::new(RoomId::parse("stored").unwrap());
        let stored = repo.insert_if_absent(room.clone()).await.unwrap();
        room.seat("Ann", crate::model::ImageRef::parse("/images/a.png").unwrap())
            .unwrap();
        repo.commit(stored.version, &room, None).await.unwrap();

        let read = repo.get(&room.id).await.unwrap().unwrap();
        assert_eq!(read.value, room);
        assert_eq!(read.version, 2);
    }
}
