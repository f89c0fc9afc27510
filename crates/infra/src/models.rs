use crate::repos::hackathons::EventState;
use crate::repos::join_requests::JoinRequestState;
use crate::repos::registrations::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HackathonRow {
    pub id: Uuid,
    pub name: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_participants: i64,
    pub max_teams: i64,
    pub organizer_id: Uuid,
    pub problem_statement: Option<String>,
    pub state: EventState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RegistrationRow {
    pub id: Uuid,
    pub hackathon_id: Uuid,
    pub user_id: Uuid,
    pub requested_role: Role,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamRow {
    pub id: Uuid,
    pub hackathon_id: Uuid,
    pub name: String,
    pub leader_user_id: Uuid,
    pub max_size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamMemberRow {
    pub team_id: Uuid,
    pub hackathon_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JoinRequestRow {
    pub id: Uuid,
    pub team_id: Uuid,
    pub hackathon_id: Uuid,
    pub candidate_user_id: Uuid,
    pub message: Option<String>,
    pub state: JoinRequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
