use chrono::Utc;
use sqlx::{Result as SqlxResult, SqliteExecutor};
use uuid::Uuid;

use crate::models::TeamMemberRow;

pub async fn add<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
    hackathon_id: Uuid,
    user_id: Uuid,
) -> SqlxResult<TeamMemberRow> {
    sqlx::query_as::<_, TeamMemberRow>(
        r#"
        INSERT INTO team_members (team_id, hackathon_id, user_id, joined_at)
        VALUES ($1, $2, $3, $4)
        RETURNING team_id, hackathon_id, user_id, joined_at
        "#,
    )
    .bind(team_id)
    .bind(hackathon_id)
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(executor)
    .await
}

pub async fn get<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
    user_id: Uuid,
) -> SqlxResult<Option<TeamMemberRow>> {
    sqlx::query_as::<_, TeamMemberRow>(
        r#"
        SELECT team_id, hackathon_id, user_id, joined_at
        FROM team_members
        WHERE team_id = $1 AND user_id = $2
        "#,
    )
    .bind(team_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// A user holds at most one membership per hackathon.
pub async fn get_for_user_in_hackathon<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
    user_id: Uuid,
) -> SqlxResult<Option<TeamMemberRow>> {
    sqlx::query_as::<_, TeamMemberRow>(
        r#"
        SELECT team_id, hackathon_id, user_id, joined_at
        FROM team_members
        WHERE hackathon_id = $1 AND user_id = $2
        "#,
    )
    .bind(hackathon_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub async fn list_by_team<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
) -> SqlxResult<Vec<TeamMemberRow>> {
    sqlx::query_as::<_, TeamMemberRow>(
        r#"
        SELECT team_id, hackathon_id, user_id, joined_at
        FROM team_members
        WHERE team_id = $1
        ORDER BY joined_at ASC, user_id ASC
        "#,
    )
    .bind(team_id)
    .fetch_all(executor)
    .await
}

pub async fn count_by_team<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
) -> SqlxResult<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM team_members WHERE team_id = $1
        "#,
    )
    .bind(team_id)
    .fetch_one(executor)
    .await
}

/// Succession candidate: earliest joiner other than `excluding_user_id`,
/// ties broken by the lower user id.
pub async fn successor<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
    excluding_user_id: Uuid,
) -> SqlxResult<Option<TeamMemberRow>> {
    sqlx::query_as::<_, TeamMemberRow>(
        r#"
        SELECT team_id, hackathon_id, user_id, joined_at
        FROM team_members
        WHERE team_id = $1 AND user_id != $2
        ORDER BY joined_at ASC, user_id ASC
        LIMIT 1
        "#,
    )
    .bind(team_id)
    .bind(excluding_user_id)
    .fetch_optional(executor)
    .await
}

pub async fn remove<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
    user_id: Uuid,
) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM team_members WHERE team_id = $1 AND user_id = $2
        "#,
    )
    .bind(team_id)
    .bind(user_id)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

pub async fn delete_by_team<'e>(executor: impl SqliteExecutor<'e>, team_id: Uuid) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM team_members WHERE team_id = $1
        "#,
    )
    .bind(team_id)
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
        DELETE FROM team_members WHERE hackathon_id = $1
        "#,
    )
    .bind(hackathon_id)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

/// Memberships whose holder no longer has a confirmed registration for the
/// same hackathon. Removed by the repair pass.
pub async fn delete_lacking_confirmed_registration<'e>(
    executor: impl SqliteExecutor<'e>,
) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM team_members
        WHERE NOT EXISTS (
            SELECT 1 FROM registrations r
            WHERE r.hackathon_id = team_members.hackathon_id
              AND r.user_id = team_members.user_id
              AND r.confirmed
        )
        "#,
    )
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

pub async fn delete_orphaned<'e>(executor: impl SqliteExecutor<'e>) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM team_members
        WHERE NOT EXISTS (SELECT 1 FROM hackathons h WHERE h.id = team_members.hackathon_id)
           OR NOT EXISTS (SELECT 1 FROM teams t WHERE t.id = team_members.team_id)
        "#,
    )
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}
