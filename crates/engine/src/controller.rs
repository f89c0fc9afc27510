//! The [`Controller`] facade: the one entry point the presentation layer
//! talks to. Every mutating call follows the same recipe: role gate,
//! payload validation, one transactional unit of work (retried on
//! transient storage failures), error translation, then post-commit
//! notification events.

use std::future::Future;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use infra::db::{self, Db};
use infra::models::{HackathonRow, JoinRequestRow, RegistrationRow, TeamMemberRow, TeamRow};
use infra::pagination::LimitOffset;
use infra::repos::hackathons::HackathonFilter;
use infra::repos::registrations::Role;

use crate::config::EngineConfig;
use crate::error::{self, EngineError, OpError};
use crate::events::EngineEvent;
use crate::identity::{self, Actor};
use crate::lifecycle::{self, NewHackathon, PurgeResult};
use crate::registrations;
use crate::repair::{self, RepairReport};
use crate::teams::{self, LeaveOutcome};

#[derive(Clone)]
pub struct Controller {
    pub db: Db,
    config: EngineConfig,
    events: broadcast::Sender<EngineEvent>,
}

impl Controller {
    /// Connect to the configured database, run migrations and stand up the
    /// notification channel.
    pub async fn connect(config: EngineConfig) -> anyhow::Result<Self> {
        let db = db::connect(&config.database_url, config.busy_timeout).await?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self { db, config, events })
    }

    pub async fn from_env() -> anyhow::Result<Self> {
        Self::connect(EngineConfig::from_env()?).await
    }

    /// Engine over a private in-memory database. Used by tests and demos.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::connect(EngineConfig::in_memory()).await
    }

    /// Subscribe to post-commit notification events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// The same subscription as a `Stream`, for async pipelines.
    pub fn event_stream(&self) -> BroadcastStream<EngineEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    // ---- event lifecycle -------------------------------------------------

    /// Create a hackathon in the `Preparation` state, owned by the acting
    /// organizer.
    pub async fn create_hackathon(
        &self,
        actor: &Actor,
        input: NewHackathon,
    ) -> Result<HackathonRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        validate_new_hackathon(&input)?;
        let row = self
            .run("create_hackathon", || {
                lifecycle::create(&self.db, actor, input.clone())
            })
            .await?;
        info!(hackathon = %row.id, organizer = %actor.user_id, "hackathon created");
        self.publish(EngineEvent::HackathonCreated {
            hackathon_id: row.id,
        });
        Ok(row)
    }

    /// Open the registration window, or re-open it after a close.
    pub async fn open_registrations(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<HackathonRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let row = self
            .run("open_registrations", || {
                lifecycle::open_registrations(&self.db, actor, hackathon_id)
            })
            .await?;
        self.log_and_publish_transition(&row);
        Ok(row)
    }

    pub async fn close_registrations(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<HackathonRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let row = self
            .run("close_registrations", || {
                lifecycle::close_registrations(&self.db, actor, hackathon_id)
            })
            .await?;
        self.log_and_publish_transition(&row);
        Ok(row)
    }

    /// Start the event. The problem statement is required here and becomes
    /// immutable for the rest of the lifecycle.
    pub async fn start_hackathon(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
        problem_statement: &str,
    ) -> Result<HackathonRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        if problem_statement.trim().is_empty() {
            return Err(EngineError::Validation(
                "a problem statement is required to start the event".to_string(),
            ));
        }
        let row = self
            .run("start_hackathon", || {
                lifecycle::start(&self.db, actor, hackathon_id, problem_statement)
            })
            .await?;
        self.log_and_publish_transition(&row);
        Ok(row)
    }

    pub async fn conclude_hackathon(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<HackathonRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let row = self
            .run("conclude_hackathon", || {
                lifecycle::conclude(&self.db, actor, hackathon_id)
            })
            .await?;
        self.log_and_publish_transition(&row);
        Ok(row)
    }

    /// Delete every concluded hackathon with its registrations, teams and
    /// join requests. All-or-nothing across the whole batch.
    pub async fn delete_concluded(&self, actor: &Actor) -> Result<PurgeResult, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let result = self
            .run("delete_concluded", || lifecycle::delete_concluded(&self.db))
            .await?;
        if result.hackathons > 0 {
            self.publish(EngineEvent::ConcludedPurged {
                hackathons: result.hackathons,
            });
        }
        Ok(result)
    }

    pub async fn hackathon(&self, hackathon_id: Uuid) -> Result<HackathonRow, EngineError> {
        self.run("hackathon", || lifecycle::get(&self.db, hackathon_id))
            .await
    }

    pub async fn list_hackathons(
        &self,
        filter: HackathonFilter,
        page: Option<LimitOffset>,
    ) -> Result<Vec<HackathonRow>, EngineError> {
        self.run("list_hackathons", || {
            lifecycle::list(&self.db, filter.clone(), page)
        })
        .await
    }

    // ---- registration ledger ---------------------------------------------

    /// Register the acting user for an event. The requested role must match
    /// the caller's session role; the registration starts unconfirmed.
    pub async fn register(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
        requested_role: Role,
    ) -> Result<RegistrationRow, EngineError> {
        identity::require_registrant(actor)?;
        if requested_role != actor.role {
            return Err(EngineError::Validation(format!(
                "requested role {} does not match the caller's role {}",
                requested_role.as_str(),
                actor.role.as_str()
            )));
        }
        let row = self
            .run("register", || {
                registrations::register(&self.db, actor, hackathon_id, requested_role)
            })
            .await?;
        info!(registration = %row.id, hackathon = %hackathon_id, "registration submitted");
        self.publish(EngineEvent::RegistrationSubmitted {
            registration_id: row.id,
            hackathon_id: row.hackathon_id,
            user_id: row.user_id,
        });
        Ok(row)
    }

    /// Confirm a registration. Confirming twice is a no-op that returns the
    /// confirmed row again without emitting a second event.
    pub async fn confirm_registration(
        &self,
        actor: &Actor,
        registration_id: Uuid,
    ) -> Result<RegistrationRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let (row, newly) = self
            .run("confirm_registration", || {
                registrations::confirm(&self.db, actor, registration_id)
            })
            .await?;
        if newly {
            info!(registration = %row.id, user = %row.user_id, "registration confirmed");
            self.publish(EngineEvent::RegistrationConfirmed {
                registration_id: row.id,
                user_id: row.user_id,
            });
        }
        Ok(row)
    }

    /// Reject a registration, removing it from the ledger. Confirmed
    /// registrants still sitting in a team must be detached first.
    pub async fn reject_registration(
        &self,
        actor: &Actor,
        registration_id: Uuid,
    ) -> Result<RegistrationRow, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let row = self
            .run("reject_registration", || {
                registrations::reject(&self.db, actor, registration_id)
            })
            .await?;
        info!(registration = %row.id, user = %row.user_id, "registration rejected");
        self.publish(EngineEvent::RegistrationRejected {
            hackathon_id: row.hackathon_id,
            user_id: row.user_id,
        });
        Ok(row)
    }

    /// Registrations of a hackathon, organizer only.
    pub async fn list_registrations(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<Vec<RegistrationRow>, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        self.run("list_registrations", || {
            registrations::list_for_hackathon(&self.db, actor, hackathon_id)
        })
        .await
    }

    /// The acting user's own registration, if any.
    pub async fn my_registration(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<Option<RegistrationRow>, EngineError> {
        self.run("my_registration", || {
            registrations::for_user(&self.db, actor, hackathon_id)
        })
        .await
    }

    // ---- team membership -------------------------------------------------

    /// Create a team led by the acting user, who becomes its first member.
    pub async fn create_team(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
        name: &str,
        max_size: i64,
    ) -> Result<TeamRow, EngineError> {
        identity::require_role(actor, Role::Participant)?;
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "team name must not be blank".to_string(),
            ));
        }
        if max_size < 2 {
            return Err(EngineError::Validation(format!(
                "team size limit must be at least 2, got {max_size}"
            )));
        }
        let team = self
            .run("create_team", || {
                teams::create_team(&self.db, actor, hackathon_id, name, max_size)
            })
            .await?;
        info!(team = %team.id, leader = %actor.user_id, "team created");
        self.publish(EngineEvent::TeamCreated {
            team_id: team.id,
            hackathon_id: team.hackathon_id,
        });
        Ok(team)
    }

    /// File a join request with an optional message (500 characters max).
    pub async fn request_to_join(
        &self,
        actor: &Actor,
        team_id: Uuid,
        message: Option<String>,
    ) -> Result<JoinRequestRow, EngineError> {
        identity::require_role(actor, Role::Participant)?;
        if let Some(m) = &message {
            if m.chars().count() > 500 {
                return Err(EngineError::Validation(
                    "join request message exceeds 500 characters".to_string(),
                ));
            }
        }
        let request = self
            .run("request_to_join", || {
                teams::request_to_join(&self.db, actor, team_id, message.clone())
            })
            .await?;
        self.publish(EngineEvent::JoinRequested {
            request_id: request.id,
            team_id: request.team_id,
            candidate_user_id: request.candidate_user_id,
        });
        Ok(request)
    }

    /// Accept a join request (leader only). Accepting an already resolved
    /// request replays its stored outcome without side effects.
    pub async fn accept_join_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<JoinRequestRow, EngineError> {
        identity::require_role(actor, Role::Participant)?;
        let resolved = self
            .run("accept_join_request", || {
                teams::accept_join(&self.db, actor, request_id)
            })
            .await?;
        if resolved.applied {
            info!(
                request = %resolved.request.id,
                team = %resolved.request.team_id,
                candidate = %resolved.request.candidate_user_id,
                "join request accepted"
            );
            self.publish(EngineEvent::JoinResolved {
                request_id: resolved.request.id,
                team_id: resolved.request.team_id,
                state: resolved.request.state,
            });
            self.publish(EngineEvent::MemberJoined {
                team_id: resolved.request.team_id,
                user_id: resolved.request.candidate_user_id,
            });
        }
        Ok(resolved.request)
    }

    /// Reject a join request (leader only). Replays on resolved requests.
    pub async fn reject_join_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<JoinRequestRow, EngineError> {
        identity::require_role(actor, Role::Participant)?;
        let resolved = self
            .run("reject_join_request", || {
                teams::reject_join(&self.db, actor, request_id)
            })
            .await?;
        if resolved.applied {
            self.publish(EngineEvent::JoinResolved {
                request_id: resolved.request.id,
                team_id: resolved.request.team_id,
                state: resolved.request.state,
            });
        }
        Ok(resolved.request)
    }

    /// Leader removes a member. Removing the leader themselves is refused;
    /// that path is [`Controller::leave_team`].
    pub async fn remove_member(
        &self,
        actor: &Actor,
        team_id: Uuid,
        member_user_id: Uuid,
    ) -> Result<TeamRow, EngineError> {
        identity::require_role(actor, Role::Participant)?;
        let team = self
            .run("remove_member", || {
                teams::remove_member(&self.db, actor, team_id, member_user_id)
            })
            .await?;
        info!(team = %team.id, member = %member_user_id, "member removed");
        self.publish(EngineEvent::MemberRemoved {
            team_id: team.id,
            user_id: member_user_id,
        });
        Ok(team)
    }

    /// The acting user leaves their team. A departing leader hands over to
    /// the earliest-joined member; the last member leaving disbands the
    /// team and rejects its pending requests.
    pub async fn leave_team(
        &self,
        actor: &Actor,
        team_id: Uuid,
    ) -> Result<LeaveOutcome, EngineError> {
        identity::require_role(actor, Role::Participant)?;
        let outcome = self
            .run("leave_team", || teams::leave_team(&self.db, actor, team_id))
            .await?;
        match &outcome {
            LeaveOutcome::Left { team } => {
                self.publish(EngineEvent::MemberLeft {
                    team_id: team.id,
                    user_id: actor.user_id,
                });
            }
            LeaveOutcome::LeadershipPassed {
                team,
                new_leader_user_id,
            } => {
                info!(team = %team.id, new_leader = %new_leader_user_id, "leadership passed");
                self.publish(EngineEvent::MemberLeft {
                    team_id: team.id,
                    user_id: actor.user_id,
                });
                self.publish(EngineEvent::LeaderChanged {
                    team_id: team.id,
                    new_leader_user_id: *new_leader_user_id,
                });
            }
            LeaveOutcome::Disbanded {
                team_id,
                hackathon_id,
                ..
            } => {
                info!(team = %team_id, "team disbanded");
                self.publish(EngineEvent::MemberLeft {
                    team_id: *team_id,
                    user_id: actor.user_id,
                });
                self.publish(EngineEvent::TeamDisbanded {
                    team_id: *team_id,
                    hackathon_id: *hackathon_id,
                });
            }
        }
        Ok(outcome)
    }

    /// A team with its member list, ordered by join time.
    pub async fn team(
        &self,
        team_id: Uuid,
    ) -> Result<(TeamRow, Vec<TeamMemberRow>), EngineError> {
        self.run("team", || teams::get_with_members(&self.db, team_id))
            .await
    }

    pub async fn list_teams(
        &self,
        hackathon_id: Uuid,
        page: Option<LimitOffset>,
    ) -> Result<Vec<TeamRow>, EngineError> {
        self.run("list_teams", || {
            teams::list_for_hackathon(&self.db, hackathon_id, page)
        })
        .await
    }

    /// The acting user's team in a hackathon, if they are in one.
    pub async fn my_team(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<Option<TeamRow>, EngineError> {
        self.run("my_team", || {
            teams::team_of_user(&self.db, hackathon_id, actor.user_id)
        })
        .await
    }

    /// Pending join requests of a team, leader only.
    pub async fn pending_requests(
        &self,
        actor: &Actor,
        team_id: Uuid,
    ) -> Result<Vec<JoinRequestRow>, EngineError> {
        self.run("pending_requests", || {
            teams::pending_requests(&self.db, actor, team_id)
        })
        .await
    }

    /// Every join request the acting user filed in a hackathon.
    pub async fn my_join_requests(
        &self,
        actor: &Actor,
        hackathon_id: Uuid,
    ) -> Result<Vec<JoinRequestRow>, EngineError> {
        self.run("my_join_requests", || {
            teams::requests_of_candidate(&self.db, actor, hackathon_id)
        })
        .await
    }

    // ---- maintenance -----------------------------------------------------

    /// Sweep the store back to a consistent state after an interrupted
    /// transaction or an external writer. Organizer only.
    pub async fn repair_state(&self, actor: &Actor) -> Result<RepairReport, EngineError> {
        identity::require_role(actor, Role::Organizer)?;
        let report = self
            .run("repair_state", || repair::repair(&self.db))
            .await?;
        if !report.is_clean() {
            self.publish(EngineEvent::StoreRepaired {
                fixes: report.fixes(),
            });
        }
        Ok(report)
    }

    // ---- plumbing --------------------------------------------------------

    /// Run one unit of work, retrying on transient storage failures with a
    /// fresh transaction each attempt. Domain errors pass through untouched
    /// and everything left over is translated into the public taxonomy.
    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, OpError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(OpError::Storage(e))
                    if error::is_transient(&e) && attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    warn!(op, attempt, error = %e, "transient storage failure, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => return Err(EngineError::from_op(op, e)),
            }
        }
    }

    fn log_and_publish_transition(&self, row: &HackathonRow) {
        info!(hackathon = %row.id, state = row.state.as_str(), "lifecycle advanced");
        self.publish(EngineEvent::LifecycleAdvanced {
            hackathon_id: row.id,
            state: row.state,
        });
    }

    /// Best-effort: an engine without subscribers drops events silently.
    fn publish(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

fn validate_new_hackathon(input: &NewHackathon) -> Result<(), EngineError> {
    if input.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "hackathon name must not be blank".to_string(),
        ));
    }
    if input.venue.trim().is_empty() {
        return Err(EngineError::Validation(
            "venue must not be blank".to_string(),
        ));
    }
    if input.ends_at <= input.starts_at {
        return Err(EngineError::Validation(
            "the event must end after it starts".to_string(),
        ));
    }
    if input.max_participants < 1 {
        return Err(EngineError::Validation(format!(
            "participant limit must be at least 1, got {}",
            input.max_participants
        )));
    }
    if input.max_teams < 1 {
        return Err(EngineError::Validation(format!(
            "team limit must be at least 1, got {}",
            input.max_teams
        )));
    }
    Ok(())
}
