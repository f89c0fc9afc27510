use chrono::{Duration, Utc};
use engine::{Actor, Controller, NewHackathon, Role};
use uuid::Uuid;

pub async fn setup_engine() -> Controller {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    Controller::in_memory()
        .await
        .expect("Failed to start in-memory engine")
}

pub fn organizer() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Organizer)
}

#[allow(dead_code)]
pub fn judge() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Judge)
}

pub fn participant() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Participant)
}

/// A valid creation payload; tests tweak single fields off this base.
pub fn hackathon_input(name: &str) -> NewHackathon {
    NewHackathon {
        name: name.to_string(),
        venue: "Main Hall".to_string(),
        starts_at: Utc::now() + Duration::days(7),
        ends_at: Utc::now() + Duration::days(9),
        max_participants: 16,
        max_teams: 8,
    }
}

/// Create a hackathon and open registrations, returning its id.
#[allow(dead_code)]
pub async fn open_hackathon(engine: &Controller, org: &Actor, name: &str) -> Uuid {
    let hackathon = engine
        .create_hackathon(org, hackathon_input(name))
        .await
        .expect("Failed to create hackathon");
    engine
        .open_registrations(org, hackathon.id)
        .await
        .expect("Failed to open registrations");
    hackathon.id
}

/// Register a fresh participant and confirm them in one go.
#[allow(dead_code)]
pub async fn confirmed_participant(engine: &Controller, org: &Actor, hackathon_id: Uuid) -> Actor {
    let actor = participant();
    let registration = engine
        .register(&actor, hackathon_id, Role::Participant)
        .await
        .expect("Failed to register participant");
    engine
        .confirm_registration(org, registration.id)
        .await
        .expect("Failed to confirm registration");
    actor
}
