pub mod hackathons;
pub mod join_requests;
pub mod registrations;
pub mod team_members;
pub mod teams;

pub use hackathons::{CreateHackathonData, EventState, HackathonFilter};
pub use join_requests::{CreateJoinRequestData, JoinRequestState};
pub use registrations::{CreateRegistrationData, Role};
pub use teams::CreateTeamData;
