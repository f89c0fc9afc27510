use std::str::FromStr;

use chrono::Utc;
use sqlx::{Result as SqlxResult, SqliteExecutor};
use uuid::Uuid;

use crate::models::RegistrationRow;

/// Role a user holds toward an event. Serves both as the caller's session
/// role and as the `requested_role` column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Organizer,
    Judge,
    Participant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Judge => "judge",
            Role::Participant => "participant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(Role::Organizer),
            "judge" => Ok(Role::Judge),
            "participant" => Ok(Role::Participant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRegistrationData {
    pub hackathon_id: Uuid,
    pub user_id: Uuid,
    pub requested_role: Role,
}

pub async fn create<'e>(
    executor: impl SqliteExecutor<'e>,
    data: CreateRegistrationData,
) -> SqlxResult<RegistrationRow> {
    let now = Utc::now();
    sqlx::query_as::<_, RegistrationRow>(
        r#"
        INSERT INTO registrations (id, hackathon_id, user_id, requested_role,
                                   created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id, hackathon_id, user_id, requested_role, confirmed,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(data.hackathon_id)
    .bind(data.user_id)
    .bind(data.requested_role)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub async fn get_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
) -> SqlxResult<Option<RegistrationRow>> {
    sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT id, hackathon_id, user_id, requested_role, confirmed,
               created_at, updated_at
        FROM registrations
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn get_by_hackathon_and_user<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
    user_id: Uuid,
) -> SqlxResult<Option<RegistrationRow>> {
    sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT id, hackathon_id, user_id, requested_role, confirmed,
               created_at, updated_at
        FROM registrations
        WHERE hackathon_id = $1 AND user_id = $2
        "#,
    )
    .bind(hackathon_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub async fn list_by_hackathon<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
) -> SqlxResult<Vec<RegistrationRow>> {
    sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT id, hackathon_id, user_id, requested_role, confirmed,
               created_at, updated_at
        FROM registrations
        WHERE hackathon_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(hackathon_id)
    .fetch_all(executor)
    .await
}

/// Confirmed participants are the population the `max_participants` cap
/// applies to. Judges never count against it.
pub async fn count_confirmed_participants<'e>(
    executor: impl SqliteExecutor<'e>,
    hackathon_id: Uuid,
) -> SqlxResult<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM registrations
        WHERE hackathon_id = $1 AND confirmed AND requested_role = $2
        "#,
    )
    .bind(hackathon_id)
    .bind(Role::Participant)
    .fetch_one(executor)
    .await
}

/// Flip an unconfirmed registration to confirmed. `None` means the row is
/// gone or was already confirmed by a concurrent call.
pub async fn set_confirmed<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
) -> SqlxResult<Option<RegistrationRow>> {
    sqlx::query_as::<_, RegistrationRow>(
        r#"
        UPDATE registrations
        SET confirmed = TRUE, updated_at = $2
        WHERE id = $1 AND NOT confirmed
        RETURNING id, hackathon_id, user_id, requested_role, confirmed,
                  created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(executor)
    .await
}

pub async fn delete<'e>(executor: impl SqliteExecutor<'e>, id: Uuid) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM registrations WHERE id = $1
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
        DELETE FROM registrations WHERE hackathon_id = $1
        "#,
    )
    .bind(hackathon_id)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}

/// Drop rows whose hackathon no longer exists (externally damaged store).
pub async fn delete_orphaned<'e>(executor: impl SqliteExecutor<'e>) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM registrations
        WHERE NOT EXISTS (SELECT 1 FROM hackathons h WHERE h.id = registrations.hackathon_id)
        "#,
    )
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}
