use std::str::FromStr;

use chrono::Utc;
use sqlx::{Result as SqlxResult, SqliteExecutor};
use uuid::Uuid;

use crate::models::JoinRequestRow;

/// Join requests move from `pending` to exactly one terminal state and
/// never leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestState {
    Pending,
    Accepted,
    Rejected,
}

impl JoinRequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestState::Pending => "pending",
            JoinRequestState::Accepted => "accepted",
            JoinRequestState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JoinRequestState::Pending)
    }
}

impl FromStr for JoinRequestState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JoinRequestState::Pending),
            "accepted" => Ok(JoinRequestState::Accepted),
            "rejected" => Ok(JoinRequestState::Rejected),
            _ => Err(format!("Unknown join request state: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateJoinRequestData {
    pub team_id: Uuid,
    pub hackathon_id: Uuid,
    pub candidate_user_id: Uuid,
    pub message: Option<String>,
}

pub async fn create<'e>(
    executor: impl SqliteExecutor<'e>,
    data: CreateJoinRequestData,
) -> SqlxResult<JoinRequestRow> {
    let now = Utc::now();
    sqlx::query_as::<_, JoinRequestRow>(
        r#"
        INSERT INTO join_requests (id, team_id, hackathon_id, candidate_user_id,
                                   message, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        RETURNING id, team_id, hackathon_id, candidate_user_id, message, state,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(data.team_id)
    .bind(data.hackathon_id)
    .bind(data.candidate_user_id)
    .bind(data.message)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub async fn get_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
) -> SqlxResult<Option<JoinRequestRow>> {
    sqlx::query_as::<_, JoinRequestRow>(
        r#"
        SELECT id, team_id, hackathon_id, candidate_user_id, message, state,
               created_at, updated_at
        FROM join_requests
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn get_pending_by_team_and_candidate<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
    candidate_user_id: Uuid,
) -> SqlxResult<Option<JoinRequestRow>> {
    sqlx::query_as::<_, JoinRequestRow>(
        r#"
        SELECT id, team_id, hackathon_id, candidate_user_id, message, state,
               created_at, updated_at
        FROM join_requests
        WHERE team_id = $1 AND candidate_user_id = $2 AND state = $3
        "#,
    )
    .bind(team_id)
    .bind(candidate_user_id)
    .bind(JoinRequestState::Pending)
    .fetch_optional(executor)
    .await
}

pub async fn list_pending_by_team<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
) -> SqlxResult<Vec<JoinRequestRow>> {
    sqlx::query_as::<_, JoinRequestRow>(
        r#"
        SELECT id, team_id, hackathon_id, candidate_user_id, message, state,
               created_at, updated_at
        FROM join_requests
        WHERE team_id = $1 AND state = $2
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(team_id)
    .bind(JoinRequestState::Pending)
    .fetch_all(executor)
    .await
}

pub async fn list_by_candidate<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
    candidate_user_id: Uuid,
) -> SqlxResult<Vec<JoinRequestRow>> {
    sqlx::query_as::<_, JoinRequestRow>(
        r#"
        SELECT id, team_id, hackathon_id, candidate_user_id, message, state,
               created_at, updated_at
        FROM join_requests
        WHERE hackathon_id = $1 AND candidate_user_id = $2
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(hackathon_id)
    .bind(candidate_user_id)
    .fetch_all(executor)
    .await
}

/// Move a pending request into a terminal state. `None` means the request
/// is gone or already resolved, which callers treat as a replay.
pub async fn resolve<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
    to: JoinRequestState,
) -> SqlxResult<Option<JoinRequestRow>> {
    sqlx::query_as::<_, JoinRequestRow>(
        r#"
        UPDATE join_requests
        SET state = $2, updated_at = $3
        WHERE id = $1 AND state = $4
        RETURNING id, team_id, hackathon_id, candidate_user_id, message, state,
                  created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(to)
    .bind(Utc::now())
    .bind(JoinRequestState::Pending)
    .fetch_optional(executor)
    .await
}

/// Reject every pending request a candidate holds in a hackathon, optionally
/// sparing one (the request being accepted). Returns how many were rejected.
pub async fn reject_pending_for_candidate<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
    candidate_user_id: Uuid,
    except_id: Option<Uuid>,
) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        UPDATE join_requests
        SET state = $4, updated_at = $5
        WHERE hackathon_id = $1 AND candidate_user_id = $2 AND state = $6
          AND ($3 IS NULL OR id != $3)
        "#,
    )
    .bind(hackathon_id)
    .bind(candidate_user_id)
    .bind(except_id)
    .bind(JoinRequestState::Rejected)
    .bind(Utc::now())
    .bind(JoinRequestState::Pending)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

pub async fn reject_pending_by_team<'e>(
    executor: impl SqliteExecutor<'e>,
    team_id: Uuid,
) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        UPDATE join_requests
        SET state = $2, updated_at = $3
        WHERE team_id = $1 AND state = $4
        "#,
    )
    .bind(team_id)
    .bind(JoinRequestState::Rejected)
    .bind(Utc::now())
    .bind(JoinRequestState::Pending)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

/// Pending requests pointing at a team that no longer exists can never be
/// accepted; the repair pass closes them out.
pub async fn reject_where_team_missing<'e>(executor: impl SqliteExecutor<'e>) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        UPDATE join_requests
        SET state = $1, updated_at = $2
        WHERE state = $3
          AND NOT EXISTS (SELECT 1 FROM teams t WHERE t.id = join_requests.team_id)
        "#,
    )
    .bind(JoinRequestState::Rejected)
    .bind(Utc::now())
    .bind(JoinRequestState::Pending)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

/// Pending requests from users who already sit in a team of the same
/// hackathon. Normal flow rejects these eagerly; this catches leftovers.
pub async fn reject_where_candidate_in_team<'e>(
    executor: impl SqliteExecutor<'e>,
) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        UPDATE join_requests
        SET state = $1, updated_at = $2
        WHERE state = $3
          AND EXISTS (
              SELECT 1 FROM team_members m
              WHERE m.hackathon_id = join_requests.hackathon_id
                AND m.user_id = join_requests.candidate_user_id
          )
        "#,
    )
    .bind(JoinRequestState::Rejected)
    .bind(Utc::now())
    .bind(JoinRequestState::Pending)
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
        DELETE FROM join_requests WHERE hackathon_id = $1
        "#,
    )
    .bind(hackathon_id)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

pub async fn delete_orphaned<'e>(executor: impl SqliteExecutor<'e>) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM join_requests
        WHERE NOT EXISTS (SELECT 1 FROM hackathons h WHERE h.id = join_requests.hackathon_id)
        "#,
    )
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}
