//! Event lifecycle workflows: creation, the four transitions and the purge
//! of concluded events.
//!
//! Every mutating function opens its own transaction, re-reads the current
//! state inside it and commits only if the full workflow applies.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::info;
use uuid::Uuid;

use infra::db::Db;
use infra::models::HackathonRow;
use infra::pagination::LimitOffset;
use infra::repos::hackathons::{self, CreateHackathonData, EventState, HackathonFilter};
use infra::repos::{join_requests, registrations, team_members, teams};

use crate::error::{EngineError, OpError};
use crate::identity::Actor;

/// Input for creating a hackathon. The organizer is always the acting user,
/// never a field of the payload.
#[derive(Debug, Clone)]
pub struct NewHackathon {
    pub name: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_participants: i64,
    pub max_teams: i64,
}

/// Row counts removed by [`delete_concluded`], one field per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PurgeResult {
    pub hackathons: u64,
    pub registrations: u64,
    pub teams: u64,
    pub team_members: u64,
    pub join_requests: u64,
}

pub(crate) async fn create(
    db: &Db,
    actor: &Actor,
    input: NewHackathon,
) -> Result<HackathonRow, OpError> {
    let row = hackathons::create(
        db,
        CreateHackathonData {
            name: input.name,
            venue: input.venue,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            max_participants: input.max_participants,
            max_teams: input.max_teams,
            organizer_id: actor.user_id,
        },
    )
    .await?;
    Ok(row)
}

pub(crate) async fn get(db: &Db, id: Uuid) -> Result<HackathonRow, OpError> {
    let row = hackathons::get_by_id(db, id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", id))?;
    Ok(row)
}

pub(crate) async fn list(
    db: &Db,
    filter: HackathonFilter,
    page: Option<LimitOffset>,
) -> Result<Vec<HackathonRow>, OpError> {
    let rows = hackathons::list(db, filter, page).await?;
    Ok(rows)
}

/// Open (or re-open) registrations. Legal from `Preparation` and from
/// `RegistrationsClosed`; existing registrations survive a re-open.
pub(crate) async fn open_registrations(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
) -> Result<HackathonRow, OpError> {
    let mut tx = db.begin().await?;
    let hackathon = fetch_owned(&mut tx, hackathon_id, actor).await?;

    match hackathon.state {
        EventState::Preparation | EventState::RegistrationsClosed => {}
        EventState::RegistrationsOpen => {
            return Err(EngineError::InvalidTransition(
                "registrations are already open".to_string(),
            )
            .into())
        }
        other => return Err(frozen("open registrations", other).into()),
    }

    let updated = hackathons::update_state(
        &mut *tx,
        hackathon_id,
        hackathon.state,
        EventState::RegistrationsOpen,
    )
    .await?
    .ok_or_else(|| EngineError::concurrent_change("open_registrations"))?;
    tx.commit().await?;
    Ok(updated)
}

/// Close the registration window. Only legal while it is open.
pub(crate) async fn close_registrations(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
) -> Result<HackathonRow, OpError> {
    let mut tx = db.begin().await?;
    let hackathon = fetch_owned(&mut tx, hackathon_id, actor).await?;

    if hackathon.state != EventState::RegistrationsOpen {
        return Err(EngineError::InvalidTransition(format!(
            "registrations cannot be closed while the event is {}",
            hackathon.state.as_str()
        ))
        .into());
    }

    let updated = hackathons::update_state(
        &mut *tx,
        hackathon_id,
        hackathon.state,
        EventState::RegistrationsClosed,
    )
    .await?
    .ok_or_else(|| EngineError::concurrent_change("close_registrations"))?;
    tx.commit().await?;
    Ok(updated)
}

/// Start the event, pinning the problem statement. Legal when registrations
/// are closed, or directly from `Preparation` when they were never opened.
pub(crate) async fn start(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
    problem_statement: &str,
) -> Result<HackathonRow, OpError> {
    let mut tx = db.begin().await?;
    let hackathon = fetch_owned(&mut tx, hackathon_id, actor).await?;

    match hackathon.state {
        EventState::Preparation | EventState::RegistrationsClosed => {}
        EventState::RegistrationsOpen => {
            return Err(EngineError::InvalidTransition(
                "registrations must be closed before the event can start".to_string(),
            )
            .into())
        }
        other => return Err(frozen("start", other).into()),
    }

    let updated = hackathons::start(&mut *tx, hackathon_id, hackathon.state, problem_statement)
        .await?
        .ok_or_else(|| EngineError::concurrent_change("start_hackathon"))?;
    tx.commit().await?;
    Ok(updated)
}

/// Conclude a started event. Repeating the call is an error, not a replay.
pub(crate) async fn conclude(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
) -> Result<HackathonRow, OpError> {
    let mut tx = db.begin().await?;
    let hackathon = fetch_owned(&mut tx, hackathon_id, actor).await?;

    match hackathon.state {
        EventState::Started => {}
        EventState::Concluded => {
            return Err(EngineError::InvalidTransition(format!(
                "hackathon {hackathon_id} is already concluded"
            ))
            .into())
        }
        other => {
            return Err(EngineError::InvalidTransition(format!(
                "only a started event can be concluded, current state is {}",
                other.as_str()
            ))
            .into())
        }
    }

    let updated = hackathons::update_state(
        &mut *tx,
        hackathon_id,
        EventState::Started,
        EventState::Concluded,
    )
    .await?
    .ok_or_else(|| EngineError::concurrent_change("conclude_hackathon"))?;
    tx.commit().await?;
    Ok(updated)
}

/// Purge every concluded hackathon and all records hanging off it, in one
/// transaction. Each target is re-checked inside the transaction; a target
/// that left the concluded set aborts the whole batch.
pub(crate) async fn delete_concluded(db: &Db) -> Result<PurgeResult, OpError> {
    let mut tx = db.begin().await?;
    let targets = hackathons::list_concluded_ids(&mut *tx).await?;

    let mut result = PurgeResult::default();
    for id in &targets {
        // children first, the schema enforces the reference order
        result.join_requests += join_requests::delete_by_hackathon(&mut *tx, *id).await?;
        result.team_members += team_members::delete_by_hackathon(&mut *tx, *id).await?;
        result.teams += teams::delete_by_hackathon(&mut *tx, *id).await?;
        result.registrations += registrations::delete_by_hackathon(&mut *tx, *id).await?;

        let deleted = hackathons::delete_concluded(&mut *tx, *id).await?;
        if deleted != 1 {
            return Err(EngineError::TransactionAborted {
                op: "delete_concluded",
                reason: format!("hackathon {id} left the concluded set mid-purge"),
            }
            .into());
        }
        result.hackathons += 1;
    }

    tx.commit().await?;
    if result.hackathons > 0 {
        info!(
            hackathons = result.hackathons,
            registrations = result.registrations,
            teams = result.teams,
            "purged concluded hackathons"
        );
    }
    Ok(result)
}

/// Load the hackathon and check the acting user owns it.
async fn fetch_owned(
    tx: &mut Transaction<'_, Sqlite>,
    hackathon_id: Uuid,
    actor: &Actor,
) -> Result<HackathonRow, OpError> {
    let hackathon = hackathons::get_by_id(&mut **tx, hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", hackathon_id))?;
    if hackathon.organizer_id != actor.user_id {
        return Err(EngineError::Forbidden(
            "only the organizer of this hackathon can manage it".to_string(),
        )
        .into());
    }
    Ok(hackathon)
}

fn frozen(op: &str, state: EventState) -> EngineError {
    EngineError::InvalidTransition(format!(
        "cannot {op} once the event is {}",
        state.as_str()
    ))
}
