use chrono::Utc;
use sqlx::{Result as SqlxResult, SqliteExecutor};
use uuid::Uuid;

use crate::models::TeamRow;
use crate::pagination::LimitOffset;

#[derive(Debug, Clone)]
pub struct CreateTeamData {
    pub hackathon_id: Uuid,
    pub name: String,
    pub leader_user_id: Uuid,
    pub max_size: i64,
}

pub async fn create<'e>(
    executor: impl SqliteExecutor<'e>,
    data: CreateTeamData,
) -> SqlxResult<TeamRow> {
    let now = Utc::now();
    sqlx::query_as::<_, TeamRow>(
        r#"
        INSERT INTO teams (id, hackathon_id, name, leader_user_id, max_size,
                           created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        RETURNING id, hackathon_id, name, leader_user_id, max_size,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(data.hackathon_id)
    .bind(data.name)
    .bind(data.leader_user_id)
    .bind(data.max_size)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub async fn get_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
) -> SqlxResult<Option<TeamRow>> {
    sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, hackathon_id, name, leader_user_id, max_size,
               created_at, updated_at
        FROM teams
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn get_by_name<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
    name: &str,
) -> SqlxResult<Option<TeamRow>> {
    sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, hackathon_id, name, leader_user_id, max_size,
               created_at, updated_at
        FROM teams
        WHERE hackathon_id = $1 AND name = $2
        "#,
    )
    .bind(hackathon_id)
    .bind(name)
    .fetch_optional(executor)
    .await
}

pub async fn list_by_hackathon<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
    page: Option<LimitOffset>,
) -> SqlxResult<Vec<TeamRow>> {
    let p = page.unwrap_or_default();
    sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, hackathon_id, name, leader_user_id, max_size,
               created_at, updated_at
        FROM teams
        WHERE hackathon_id = $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(hackathon_id)
    .bind(p.limit)
    .bind(p.offset)
    .fetch_all(executor)
    .await
}

pub async fn count_by_hackathon<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
) -> SqlxResult<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM teams WHERE hackathon_id = $1
        "#,
    )
    .bind(hackathon_id)
    .fetch_one(executor)
    .await
}

pub async fn update_leader<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
    new_leader_user_id: Uuid,
) -> SqlxResult<Option<TeamRow>> {
    sqlx::query_as::<_, TeamRow>(
        r#"
        UPDATE teams
        SET leader_user_id = $2, updated_at = $3
        WHERE id = $1
        RETURNING id, hackathon_id, name, leader_user_id, max_size,
                  created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(new_leader_user_id)
    .bind(Utc::now())
    .fetch_optional(executor)
    .await
}

pub async fn delete<'e>(executor: impl SqliteExecutor<'e>, id: Uuid) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM teams WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

pub async fn delete_by_hackathon<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM teams WHERE hackathon_id = $1
        "#,
    )
    .bind(hackathon_id)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

/// Teams whose leader is missing from the member list. Yielded for the
/// repair pass to re-elect or disband.
pub async fn list_with_absent_leader<'e>(
    executor: impl SqliteExecutor<'e>,
) -> SqlxResult<Vec<TeamRow>> {
    sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, hackathon_id, name, leader_user_id, max_size,
               created_at, updated_at
        FROM teams
        WHERE NOT EXISTS (
            SELECT 1 FROM team_members m
            WHERE m.team_id = teams.id AND m.user_id = teams.leader_user_id
        )
        ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn list_without_members<'e>(
    executor: impl SqliteExecutor<'e>,
) -> SqlxResult<Vec<TeamRow>> {
    sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, hackathon_id, name, leader_user_id, max_size,
               created_at, updated_at
        FROM teams
        WHERE NOT EXISTS (SELECT 1 FROM team_members m WHERE m.team_id = teams.id)
        ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn delete_orphaned<'e>(executor: impl SqliteExecutor<'e>) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM teams
        WHERE NOT EXISTS (SELECT 1 FROM hackathons h WHERE h.id = teams.hackathon_id)
        "#,
    )
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}
