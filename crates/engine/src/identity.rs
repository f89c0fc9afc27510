use uuid::Uuid;

use crate::error::EngineError;

pub use infra::repos::registrations::Role;

/// Authenticated caller identity, resolved by the session layer and passed
/// into every engine call. The engine never trusts ids supplied in payloads
/// for "who is acting"; it only trusts this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Check that the actor holds exactly the required role.
pub fn require_role(actor: &Actor, required: Role) -> Result<(), EngineError> {
    if actor.role == required {
        return Ok(());
    }
    Err(EngineError::Forbidden(format!(
        "{} privileges required, caller is {}",
        required.as_str(),
        actor.role.as_str()
    )))
}

/// Registration-capable callers: judges and participants. Organizers manage
/// events, they do not register for them.
pub fn require_registrant(actor: &Actor) -> Result<(), EngineError> {
    match actor.role {
        Role::Judge | Role::Participant => Ok(()),
        Role::Organizer => Err(EngineError::Forbidden(
            "organizers cannot register for events".to_string(),
        )),
    }
}
