use std::str::FromStr;

use chrono::Utc;
use sqlx::{Result as SqlxResult, SqliteExecutor};
use uuid::Uuid;

use crate::models::HackathonRow;
use crate::pagination::LimitOffset;

/// Lifecycle position of a hackathon. Transitions are validated by the
/// engine; the database stores the snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Preparation,
    RegistrationsOpen,
    RegistrationsClosed,
    Started,
    Concluded,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Preparation => "preparation",
            EventState::RegistrationsOpen => "registrations_open",
            EventState::RegistrationsClosed => "registrations_closed",
            EventState::Started => "started",
            EventState::Concluded => "concluded",
        }
    }
}

impl FromStr for EventState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparation" => Ok(EventState::Preparation),
            "registrations_open" => Ok(EventState::RegistrationsOpen),
            "registrations_closed" => Ok(EventState::RegistrationsClosed),
            "started" => Ok(EventState::Started),
            "concluded" => Ok(EventState::Concluded),
            _ => Err(format!("Unknown event state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HackathonFilter {
    pub organizer_id: Option<Uuid>,
    pub state: Option<EventState>,
}

#[derive(Debug, Clone)]
pub struct CreateHackathonData {
    pub name: String,
    pub venue: String,
    pub starts_at: chrono::DateTime<Utc>,
    pub ends_at: chrono::DateTime<Utc>,
    pub max_participants: i64,
    pub max_teams: i64,
    pub organizer_id: Uuid,
}

pub async fn create<'e>(
    executor: impl SqliteExecutor<'e>,
    data: CreateHackathonData,
) -> SqlxResult<HackathonRow> {
    let now = Utc::now();
    sqlx::query_as::<_, HackathonRow>(
        r#"
        INSERT INTO hackathons (id, name, venue, starts_at, ends_at,
                                max_participants, max_teams, organizer_id,
                                created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        RETURNING id, name, venue, starts_at, ends_at, max_participants,
                  max_teams, organizer_id, problem_statement, state,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(data.name)
    .bind(data.venue)
    .bind(data.starts_at)
    .bind(data.ends_at)
    .bind(data.max_participants)
    .bind(data.max_teams)
    .bind(data.organizer_id)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub async fn get_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
) -> SqlxResult<Option<HackathonRow>> {
    sqlx::query_as::<_, HackathonRow>(
        r#"
        SELECT id, name, venue, starts_at, ends_at, max_participants,
               max_teams, organizer_id, problem_statement, state,
               created_at, updated_at
        FROM hackathons
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn list<'e>(
    executor: impl SqliteExecutor<'e>,
    filter: HackathonFilter,
    page: Option<LimitOffset>,
) -> SqlxResult<Vec<HackathonRow>> {
    let p = page.unwrap_or_default();

    // Dynamic WHERE using the NULL-or-match pattern to keep a single prepared statement
    sqlx::query_as::<_, HackathonRow>(
        r#"
        SELECT id, name, venue, starts_at, ends_at, max_participants,
               max_teams, organizer_id, problem_statement, state,
               created_at, updated_at
        FROM hackathons
        WHERE ($1 IS NULL OR organizer_id = $1)
          AND ($2 IS NULL OR state = $2)
        ORDER BY starts_at ASC, id ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(filter.organizer_id)
    .bind(filter.state)
    .bind(p.limit)
    .bind(p.offset)
    .fetch_all(executor)
    .await
}

/// Compare-and-set state transition. Returns `None` when the row is gone or
/// no longer in `from`, so callers inside a transaction can tell a lost race
/// from a success.
pub async fn update_state<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
    from: EventState,
    to: EventState,
) -> SqlxResult<Option<HackathonRow>> {
    sqlx::query_as::<_, HackathonRow>(
        r#"
        UPDATE hackathons
        SET state = $3, updated_at = $4
        WHERE id = $1 AND state = $2
        RETURNING id, name, venue, starts_at, ends_at, max_participants,
                  max_teams, organizer_id, problem_statement, state,
                  created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(Utc::now())
    .fetch_optional(executor)
    .await
}

/// Move to `started` and pin the problem statement in the same write.
pub async fn start<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
    from: EventState,
    problem_statement: &str,
) -> SqlxResult<Option<HackathonRow>> {
    sqlx::query_as::<_, HackathonRow>(
        r#"
        UPDATE hackathons
        SET state = $3, problem_statement = $4, updated_at = $5
        WHERE id = $1 AND state = $2
        RETURNING id, name, venue, starts_at, ends_at, max_participants,
                  max_teams, organizer_id, problem_statement, state,
                  created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(EventState::Started)
    .bind(problem_statement)
    .bind(Utc::now())
    .fetch_optional(executor)
    .await
}

pub async fn list_concluded_ids<'e>(executor: impl SqliteExecutor<'e>) -> SqlxResult<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM hackathons WHERE state = $1 ORDER BY id ASC
        "#,
    )
    .bind(EventState::Concluded)
    .fetch_all(executor)
    .await
}

/// Delete one hackathon, re-checking it is still concluded. Returns the
/// number of rows removed (0 or 1).
pub async fn delete_concluded<'e>(executor: impl SqliteExecutor<'e>, id: Uuid) -> SqlxResult<u64> {
    sqlx::query(
        r#"
        DELETE FROM hackathons WHERE id = $1 AND state = $2
        "#,
    )
    .bind(id)
    .bind(EventState::Concluded)
    .execute(executor)
    .await
    .map(|r| r.rows_affected())
}
