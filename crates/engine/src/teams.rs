//! Team membership workflows: team creation, the join-request funnel,
//! removal and the leave/succession rules.
//!
//! Growth operations (create, request, accept) are frozen once the event
//! has started; leaving and removing members stay legal in every state.

use sqlx::{Sqlite, Transaction};
use tracing::info;
use uuid::Uuid;

use infra::db::Db;
use infra::models::{HackathonRow, JoinRequestRow, TeamMemberRow, TeamRow};
use infra::pagination::LimitOffset;
use infra::repos::hackathons::{self, EventState};
use infra::repos::join_requests::{self, CreateJoinRequestData, JoinRequestState};
use infra::repos::registrations::{self, Role};
use infra::repos::teams::{self, CreateTeamData};
use infra::repos::team_members;

use crate::error::{EngineError, OpError};
use crate::identity::Actor;

/// What happened when a member left their team.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// A non-leader member left; the team is otherwise unchanged.
    Left { team: TeamRow },
    /// The leader left and the earliest-joined remaining member took over.
    LeadershipPassed {
        team: TeamRow,
        new_leader_user_id: Uuid,
    },
    /// The last member left; the team is gone and its pending join
    /// requests were rejected.
    Disbanded {
        team_id: Uuid,
        hackathon_id: Uuid,
        rejected_requests: u64,
    },
}

/// Terminal result of an accept or reject call, with a flag telling the
/// controller whether this call did the resolving or replayed an old one.
pub(crate) struct ResolveResult {
    pub request: JoinRequestRow,
    pub applied: bool,
}

/// Create a team led by the acting user.
///
/// The creator must hold a confirmed participant registration and not sit
/// in another team. Their own pending join requests are rejected in the
/// same transaction, a leader does not keep applications open elsewhere.
pub(crate) async fn create_team(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
    name: &str,
    max_size: i64,
) -> Result<TeamRow, OpError> {
    let mut tx = db.begin().await?;
    let hackathon = hackathons::get_by_id(&mut *tx, hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", hackathon_id))?;
    ensure_membership_open(&hackathon)?;
    require_confirmed_participant(&mut tx, hackathon_id, actor.user_id).await?;

    if team_members::get_for_user_in_hackathon(&mut *tx, hackathon_id, actor.user_id)
        .await?
        .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "user {} already belongs to a team in this hackathon",
            actor.user_id
        ))
        .into());
    }
    let team_count = teams::count_by_hackathon(&mut *tx, hackathon_id).await?;
    if team_count >= hackathon.max_teams {
        return Err(EngineError::CapacityExceeded(format!(
            "hackathon {hackathon_id} is at its team limit of {}",
            hackathon.max_teams
        ))
        .into());
    }
    if teams::get_by_name(&mut *tx, hackathon_id, name)
        .await?
        .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "a team named \"{name}\" already exists in this hackathon"
        ))
        .into());
    }

    let team = teams::create(
        &mut *tx,
        CreateTeamData {
            hackathon_id,
            name: name.to_string(),
            leader_user_id: actor.user_id,
            max_size,
        },
    )
    .await?;
    team_members::add(&mut *tx, team.id, hackathon_id, actor.user_id).await?;
    let withdrawn =
        join_requests::reject_pending_for_candidate(&mut *tx, hackathon_id, actor.user_id, None)
            .await?;
    tx.commit().await?;

    if withdrawn > 0 {
        info!(team = %team.id, withdrawn, "rejected the new leader's pending join requests");
    }
    Ok(team)
}

/// File a join request for the acting user against a team.
pub(crate) async fn request_to_join(
    db: &Db,
    actor: &Actor,
    team_id: Uuid,
    message: Option<String>,
) -> Result<JoinRequestRow, OpError> {
    let mut tx = db.begin().await?;
    let team = teams::get_by_id(&mut *tx, team_id)
        .await?
        .ok_or_else(|| EngineError::not_found("team", team_id))?;
    let hackathon = hackathons::get_by_id(&mut *tx, team.hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", team.hackathon_id))?;
    ensure_membership_open(&hackathon)?;
    require_confirmed_participant(&mut tx, team.hackathon_id, actor.user_id).await?;

    if team_members::get_for_user_in_hackathon(&mut *tx, team.hackathon_id, actor.user_id)
        .await?
        .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "user {} already belongs to a team in this hackathon",
            actor.user_id
        ))
        .into());
    }
    let members = team_members::count_by_team(&mut *tx, team_id).await?;
    if members >= team.max_size {
        return Err(team_full(&team).into());
    }
    if join_requests::get_pending_by_team_and_candidate(&mut *tx, team_id, actor.user_id)
        .await?
        .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "user {} already has a pending request for team {team_id}",
            actor.user_id
        ))
        .into());
    }

    let request = join_requests::create(
        &mut *tx,
        CreateJoinRequestData {
            team_id,
            hackathon_id: team.hackathon_id,
            candidate_user_id: actor.user_id,
            message,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(request)
}

/// Accept a pending join request: membership is granted and every other
/// pending request of the same candidate in the hackathon is rejected.
///
/// Capacity, the candidate's registration and their team-lessness are all
/// re-validated inside the transaction, whatever held when the request was
/// filed. Calling this on an already resolved request replays the stored
/// outcome without touching anything.
pub(crate) async fn accept_join(
    db: &Db,
    actor: &Actor,
    request_id: Uuid,
) -> Result<ResolveResult, OpError> {
    let mut tx = db.begin().await?;
    let request = join_requests::get_by_id(&mut *tx, request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("join request", request_id))?;

    let Some(team) = teams::get_by_id(&mut *tx, request.team_id).await? else {
        // resolved requests legitimately outlive their team
        if request.state.is_terminal() {
            return Ok(ResolveResult {
                request,
                applied: false,
            });
        }
        return Err(EngineError::not_found("team", request.team_id).into());
    };
    require_leader(&team, actor)?;

    if request.state.is_terminal() {
        return Ok(ResolveResult {
            request,
            applied: false,
        });
    }

    let hackathon = hackathons::get_by_id(&mut *tx, team.hackathon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("hackathon", team.hackathon_id))?;
    ensure_membership_open(&hackathon)?;

    let candidate_registration = registrations::get_by_hackathon_and_user(
        &mut *tx,
        team.hackathon_id,
        request.candidate_user_id,
    )
    .await?;
    if !candidate_registration.is_some_and(|r| r.confirmed) {
        return Err(EngineError::DependencyConflict(format!(
            "candidate {} no longer holds a confirmed registration for this hackathon",
            request.candidate_user_id
        ))
        .into());
    }
    if team_members::get_for_user_in_hackathon(
        &mut *tx,
        team.hackathon_id,
        request.candidate_user_id,
    )
    .await?
    .is_some()
    {
        return Err(EngineError::Conflict(format!(
            "candidate {} already belongs to a team in this hackathon",
            request.candidate_user_id
        ))
        .into());
    }
    let members = team_members::count_by_team(&mut *tx, team.id).await?;
    if members >= team.max_size {
        return Err(team_full(&team).into());
    }

    team_members::add(&mut *tx, team.id, team.hackathon_id, request.candidate_user_id).await?;
    let accepted = join_requests::resolve(&mut *tx, request_id, JoinRequestState::Accepted)
        .await?
        .ok_or_else(|| EngineError::concurrent_change("accept_join_request"))?;
    let invalidated = join_requests::reject_pending_for_candidate(
        &mut *tx,
        team.hackathon_id,
        request.candidate_user_id,
        Some(request_id),
    )
    .await?;
    tx.commit().await?;

    if invalidated > 0 {
        info!(
            request = %request_id,
            invalidated,
            "rejected the accepted candidate's rival requests"
        );
    }
    Ok(ResolveResult {
        request: accepted,
        applied: true,
    })
}

/// Reject a pending join request. Replays the stored outcome when the
/// request is already resolved.
pub(crate) async fn reject_join(
    db: &Db,
    actor: &Actor,
    request_id: Uuid,
) -> Result<ResolveResult, OpError> {
    let mut tx = db.begin().await?;
    let request = join_requests::get_by_id(&mut *tx, request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("join request", request_id))?;

    let Some(team) = teams::get_by_id(&mut *tx, request.team_id).await? else {
        if request.state.is_terminal() {
            return Ok(ResolveResult {
                request,
                applied: false,
            });
        }
        return Err(EngineError::not_found("team", request.team_id).into());
    };
    require_leader(&team, actor)?;

    if request.state.is_terminal() {
        return Ok(ResolveResult {
            request,
            applied: false,
        });
    }

    let rejected = join_requests::resolve(&mut *tx, request_id, JoinRequestState::Rejected)
        .await?
        .ok_or_else(|| EngineError::concurrent_change("reject_join_request"))?;
    tx.commit().await?;
    Ok(ResolveResult {
        request: rejected,
        applied: true,
    })
}

/// Leader removes another member. The leader cannot remove themselves,
/// that path is [`leave_team`] with its succession rules.
pub(crate) async fn remove_member(
    db: &Db,
    actor: &Actor,
    team_id: Uuid,
    member_user_id: Uuid,
) -> Result<TeamRow, OpError> {
    let mut tx = db.begin().await?;
    let team = teams::get_by_id(&mut *tx, team_id)
        .await?
        .ok_or_else(|| EngineError::not_found("team", team_id))?;
    require_leader(&team, actor)?;

    if member_user_id == team.leader_user_id {
        return Err(EngineError::Forbidden(
            "the leader cannot remove themselves; leaving the team hands leadership over"
                .to_string(),
        )
        .into());
    }
    let removed = team_members::remove(&mut *tx, team_id, member_user_id).await?;
    if removed == 0 {
        return Err(EngineError::NotFound(format!(
            "user {member_user_id} is not a member of team {team_id}"
        ))
        .into());
    }
    tx.commit().await?;
    Ok(team)
}

/// The acting user leaves their team.
///
/// A departing leader hands leadership to the earliest-joined remaining
/// member (ties broken by the lower user id). The last member leaving
/// disbands the team and rejects its pending join requests.
pub(crate) async fn leave_team(
    db: &Db,
    actor: &Actor,
    team_id: Uuid,
) -> Result<LeaveOutcome, OpError> {
    let mut tx = db.begin().await?;
    let team = teams::get_by_id(&mut *tx, team_id)
        .await?
        .ok_or_else(|| EngineError::not_found("team", team_id))?;
    if team_members::get(&mut *tx, team_id, actor.user_id)
        .await?
        .is_none()
    {
        return Err(EngineError::NotFound(format!(
            "user {} is not a member of team {team_id}",
            actor.user_id
        ))
        .into());
    }

    if actor.user_id != team.leader_user_id {
        team_members::remove(&mut *tx, team_id, actor.user_id).await?;
        tx.commit().await?;
        return Ok(LeaveOutcome::Left { team });
    }

    // leader path: promote a successor or disband, decided on the
    // membership as it stands inside this transaction
    match team_members::successor(&mut *tx, team_id, team.leader_user_id).await? {
        Some(next) => {
            let updated = teams::update_leader(&mut *tx, team_id, next.user_id)
                .await?
                .ok_or_else(|| EngineError::concurrent_change("leave_team"))?;
            team_members::remove(&mut *tx, team_id, actor.user_id).await?;
            tx.commit().await?;
            Ok(LeaveOutcome::LeadershipPassed {
                team: updated,
                new_leader_user_id: next.user_id,
            })
        }
        None => {
            let rejected = join_requests::reject_pending_by_team(&mut *tx, team_id).await?;
            team_members::remove(&mut *tx, team_id, actor.user_id).await?;
            let deleted = teams::delete(&mut *tx, team_id).await?;
            if deleted != 1 {
                return Err(EngineError::concurrent_change("leave_team").into());
            }
            tx.commit().await?;
            Ok(LeaveOutcome::Disbanded {
                team_id,
                hackathon_id: team.hackathon_id,
                rejected_requests: rejected,
            })
        }
    }
}

pub(crate) async fn get_with_members(
    db: &Db,
    team_id: Uuid,
) -> Result<(TeamRow, Vec<TeamMemberRow>), OpError> {
    // one transaction so the member list matches the team row
    let mut tx = db.begin().await?;
    let team = teams::get_by_id(&mut *tx, team_id)
        .await?
        .ok_or_else(|| EngineError::not_found("team", team_id))?;
    let members = team_members::list_by_team(&mut *tx, team_id).await?;
    Ok((team, members))
}

pub(crate) async fn list_for_hackathon(
    db: &Db,
    hackathon_id: Uuid,
    page: Option<LimitOffset>,
) -> Result<Vec<TeamRow>, OpError> {
    let rows = teams::list_by_hackathon(db, hackathon_id, page).await?;
    Ok(rows)
}

pub(crate) async fn team_of_user(
    db: &Db,
    hackathon_id: Uuid,
    user_id: Uuid,
) -> Result<Option<TeamRow>, OpError> {
    let Some(membership) =
        team_members::get_for_user_in_hackathon(db, hackathon_id, user_id).await?
    else {
        return Ok(None);
    };
    let team = teams::get_by_id(db, membership.team_id).await?;
    Ok(team)
}

/// Pending requests of a team, visible to its leader only.
pub(crate) async fn pending_requests(
    db: &Db,
    actor: &Actor,
    team_id: Uuid,
) -> Result<Vec<JoinRequestRow>, OpError> {
    let team = teams::get_by_id(db, team_id)
        .await?
        .ok_or_else(|| EngineError::not_found("team", team_id))?;
    require_leader(&team, actor)?;
    let rows = join_requests::list_pending_by_team(db, team_id).await?;
    Ok(rows)
}

/// All requests the acting user filed in a hackathon, any state.
pub(crate) async fn requests_of_candidate(
    db: &Db,
    actor: &Actor,
    hackathon_id: Uuid,
) -> Result<Vec<JoinRequestRow>, OpError> {
    let rows = join_requests::list_by_candidate(db, hackathon_id, actor.user_id).await?;
    Ok(rows)
}

fn require_leader(team: &TeamRow, actor: &Actor) -> Result<(), EngineError> {
    if team.leader_user_id != actor.user_id {
        return Err(EngineError::Forbidden(format!(
            "only the leader of team {} can do this",
            team.id
        )));
    }
    Ok(())
}

fn ensure_membership_open(hackathon: &HackathonRow) -> Result<(), EngineError> {
    match hackathon.state {
        EventState::Started | EventState::Concluded => {
            Err(EngineError::InvalidTransition(format!(
                "team membership for hackathon {} is frozen once the event is {}",
                hackathon.id,
                hackathon.state.as_str()
            )))
        }
        _ => Ok(()),
    }
}

fn team_full(team: &TeamRow) -> EngineError {
    EngineError::CapacityExceeded(format!(
        "team \"{}\" is already at its size limit of {}",
        team.name, team.max_size
    ))
}

async fn require_confirmed_participant(
    tx: &mut Transaction<'_, Sqlite>,
    hackathon_id: Uuid,
    user_id: Uuid,
) -> Result<(), OpError> {
    match registrations::get_by_hackathon_and_user(&mut **tx, hackathon_id, user_id).await? {
        Some(r) if r.confirmed && r.requested_role == Role::Participant => Ok(()),
        Some(r) if r.requested_role != Role::Participant => Err(EngineError::Forbidden(
            "only participants can form or join teams".to_string(),
        )
        .into()),
        Some(_) => Err(EngineError::Forbidden(format!(
            "registration of user {user_id} is not confirmed yet"
        ))
        .into()),
        None => Err(EngineError::Forbidden(format!(
            "user {user_id} is not registered for this hackathon"
        ))
        .into()),
    }
}
