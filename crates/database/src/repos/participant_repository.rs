//! Repository for the participant directory table.

use crate::entities::{LastSeen, Participant, ParticipantRole};
use crate::types::DatabaseResult;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

/// Read access to directory rows, plus the upsert used by seeding tools.
#[derive(Clone)]
pub struct ParticipantRepository {
    pool: SqlitePool,
}

impl ParticipantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Participant>> {
        let row = sqlx::query(
            "SELECT id, display_name, role, online, last_seen_at FROM participants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_participant).transpose()
    }

    pub async fn list(&self) -> DatabaseResult<Vec<Participant>> {
        let rows = sqlx::query(
            "SELECT id, display_name, role, online, last_seen_at FROM participants ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_participant).collect()
    }

    /// Insert or replace a directory row. Only external tooling calls this.
    pub async fn upsert(&self, participant: &Participant) -> DatabaseResult<()> {
        let last_seen_at = match &participant.last_seen {
            LastSeen::At(at) => Some(at.as_str()),
            LastSeen::Online | LastSeen::Never => None,
        };

        sqlx::query(
            "INSERT INTO participants (id, display_name, role, online, last_seen_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                online = excluded.online,
                last_seen_at = excluded.last_seen_at",
        )
        .bind(&participant.id)
        .bind(&participant.display_name)
        .bind(participant.role.as_str())
        .bind(participant.online || participant.last_seen == LastSeen::Online)
        .bind(last_seen_at)
        .execute(&self.pool)
        .await?;

        info!(participant_id = %participant.id, role = participant.role.as_str(), "participant upserted");
        Ok(())
    }
}

fn map_participant(row: &SqliteRow) -> DatabaseResult<Participant> {
    let role: String = row.try_get("role")?;
    let online: bool = row.try_get("online")?;
    let last_seen_at: Option<String> = row.try_get("last_seen_at")?;

    Ok(Participant {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        role: ParticipantRole::from(role.as_str()),
        online,
        last_seen: LastSeen::from_row(online, last_seen_at),
    })
}
