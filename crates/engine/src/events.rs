use serde::Serialize;
use uuid::Uuid;

use infra::repos::hackathons::EventState;
use infra::repos::join_requests::JoinRequestState;

/// Notification emitted after a unit of work commits. Delivery is
/// best-effort over a broadcast channel: subscribers that lag past the
/// channel capacity miss events, and new subscribers only see later ones.
/// Replayed no-op calls emit nothing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    HackathonCreated {
        hackathon_id: Uuid,
    },
    LifecycleAdvanced {
        hackathon_id: Uuid,
        state: EventState,
    },
    ConcludedPurged {
        hackathons: u64,
    },
    RegistrationSubmitted {
        registration_id: Uuid,
        hackathon_id: Uuid,
        user_id: Uuid,
    },
    RegistrationConfirmed {
        registration_id: Uuid,
        user_id: Uuid,
    },
    RegistrationRejected {
        hackathon_id: Uuid,
        user_id: Uuid,
    },
    TeamCreated {
        team_id: Uuid,
        hackathon_id: Uuid,
    },
    JoinRequested {
        request_id: Uuid,
        team_id: Uuid,
        candidate_user_id: Uuid,
    },
    JoinResolved {
        request_id: Uuid,
        team_id: Uuid,
        state: JoinRequestState,
    },
    MemberJoined {
        team_id: Uuid,
        user_id: Uuid,
    },
    MemberLeft {
        team_id: Uuid,
        user_id: Uuid,
    },
    MemberRemoved {
        team_id: Uuid,
        user_id: Uuid,
    },
    LeaderChanged {
        team_id: Uuid,
        new_leader_user_id: Uuid,
    },
    TeamDisbanded {
        team_id: Uuid,
        hackathon_id: Uuid,
    },
    StoreRepaired {
        fixes: u64,
    },
}
