//! Registration ledger workflows: submit, confirm, reject.

use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use infra::db::Db;
use infra::models::{HackathonRow, RegistrationRow};
use infra::repos::hackathons::{self, EventState};
use infra::repos::registrations::{self, CreateRegistrationData, Role};
use infra::repos::{join_requests, team_members};

use crate::error::{EngineError, OpError};
use crate::identity::Actor;

/// Submit an unconfirmed registration for the acting user.
///
/// The caller (controller) is responsible for:
/// - Role checks (organizers never register; the requested role must match
///   the session role)
/// - Publishing the notification event
pub(crate) async fn register(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
    requested_role: Role,
) -> Result<RegistrationRow, OpError> {
    let mut tx = db.begin().await?;
    let hackathon = hackathons::get_by_id(&mut *tx, hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", hackathon_id))?;

    if hackathon.organizer_id == actor.user_id {
        return Err(EngineError::Forbidden(
            "the organizer cannot register for their own event".to_string(),
        )
        .into());
    }
    if hackathon.state != EventState::RegistrationsOpen {
        return Err(EngineError::InvalidTransition(format!(
            "registrations for hackathon {hackathon_id} are not open (state {})",
            hackathon.state.as_str()
        ))
        .into());
    }
    if registrations::get_by_hackathon_and_user(&mut *tx, hackathon_id, actor.user_id)
        .await?
        .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "user {} is already registered for hackathon {hackathon_id}",
            actor.user_id
        ))
        .into());
    }
    if requested_role == Role::Participant {
        check_participant_capacity(&mut tx, &hackathon).await?;
    }

    let row = registrations::create(
        &mut *tx,
        CreateRegistrationData {
            hackathon_id,
            user_id: actor.user_id,
            requested_role,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(row)
}

/// Confirm a registration. Idempotent: confirming an already confirmed
/// registration changes nothing and reports `newly = false`.
pub(crate) async fn confirm(
    db: &Db,
    actor: &Actor,
    registration_id: Uuid,
) -> Result<(RegistrationRow, bool), OpError> {
    let mut tx = db.begin().await?;
    let (registration, hackathon) = fetch_for_organizer(&mut tx, registration_id, actor).await?;

    if registration.confirmed {
        return Ok((registration, false));
    }
    // the cap counts confirmed participants, so it is re-checked here and
    // not only at submission time
    if registration.requested_role == Role::Participant {
        check_participant_capacity(&mut tx, &hackathon).await?;
    }

    let updated = registrations::set_confirmed(&mut *tx, registration_id)
        .await?
        .ok_or_else(|| EngineError::concurrent_change("confirm_registration"))?;
    tx.commit().await?;
    Ok((updated, true))
}

/// Reject (delete) a registration. A confirmed registrant who still sits in
/// a team must be detached first; their pending join requests are closed
/// out as part of the rejection.
pub(crate) async fn reject(
    db: &Db,
    actor: &Actor,
    registration_id: Uuid,
) -> Result<RegistrationRow, OpError> {
    let mut tx = db.begin().await?;
    let (registration, _) = fetch_for_organizer(&mut tx, registration_id, actor).await?;

    if registration.confirmed {
        if let Some(membership) = team_members::get_for_user_in_hackathon(
            &mut *tx,
            registration.hackathon_id,
            registration.user_id,
        )
        .await?
        {
            return Err(EngineError::DependencyConflict(format!(
                "user {} is a member of team {} in this hackathon; remove the membership first",
                registration.user_id, membership.team_id
            ))
            .into());
        }
    }

    join_requests::reject_pending_for_candidate(
        &mut *tx,
        registration.hackathon_id,
        registration.user_id,
        None,
    )
    .await?;
    let deleted = registrations::delete(&mut *tx, registration_id).await?;
    if deleted != 1 {
        return Err(EngineError::concurrent_change("reject_registration").into());
    }
    tx.commit().await?;
    Ok(registration)
}

pub(crate) async fn list_for_hackathon(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
) -> Result<Vec<RegistrationRow>, OpError> {
    let hackathon = hackathons::get_by_id(db, hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", hackathon_id))?;
    if hackathon.organizer_id != actor.user_id {
        return Err(EngineError::Forbidden(
            "only the organizer can list registrations".to_string(),
        )
        .into());
    }
    let rows = registrations::list_by_hackathon(db, hackathon_id).await?;
    Ok(rows)
}

pub(crate) async fn for_user(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
) -> Result<Option<RegistrationRow>, OpError> {
    let row = registrations::get_by_hackathon_and_user(db, hackathon_id, actor.user_id).await?;
    Ok(row)
}

async fn check_participant_capacity(
    tx: &mut Transaction<'_, Sqlite>,
    hackathon: &HackathonRow,
) -> Result<(), OpError> {
    let confirmed = registrations::count_confirmed_participants(&mut **tx, hackathon.id).await?;
    if confirmed >= hackathon.max_participants {
        return Err(EngineError::CapacityExceeded(format!(
            "hackathon {} is at its participant limit of {}",
            hackathon.id, hackathon.max_participants
        ))
        .into());
    }
    Ok(())
}

/// Load a registration plus its hackathon and check the acting user is the
/// organizer of that hackathon.
async fn fetch_for_organizer(
    tx: &mut Transaction<'_, Sqlite>,
    registration_id: Uuid,
    actor: &Actor,
) -> Result<(RegistrationRow, HackathonRow), OpError> {
    let registration = registrations::get_by_id(&mut **tx, registration_id)
        .await?
        .ok_or_else(|| EngineError::not_found("registration", registration_id))?;
    let hackathon = hackathons::get_by_id(&mut **tx, registration.hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", registration.hackathon_id))?;
    if hackathon.organizer_id != actor.user_id {
        return Err(EngineError::Forbidden(
            "only the organizer of this hackathon can manage its registrations".to_string(),
        )
        .into());
    }
    Ok((registration, hackathon))
}
