//! Lifecycle and membership engine for hackathon events.
//!
//! The engine owns three tightly coupled domains: the event state machine
//! (preparation through conclusion), the registration ledger with its
//! confirm/reject flow, and team membership with join requests and leader
//! succession. A UI or API layer drives it exclusively through the
//! [`Controller`] facade; direct repository access is not part of the
//! public surface.
//!
//! Every mutating operation is a single database transaction that
//! re-validates its preconditions inside the transaction, so concurrent
//! calls settle into one serial order instead of corrupting state.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod identity;

mod lifecycle;
mod registrations;
mod repair;
mod teams;

pub use config::EngineConfig;
pub use controller::Controller;
pub use error::EngineError;
pub use events::EngineEvent;
pub use identity::{Actor, Role};
pub use lifecycle::{NewHackathon, PurgeResult};
pub use repair::RepairReport;
pub use teams::LeaveOutcome;

pub use infra::models::{HackathonRow, JoinRequestRow, RegistrationRow, TeamMemberRow, TeamRow};
pub use infra::pagination::LimitOffset;
pub use infra::repos::hackathons::{EventState, HackathonFilter};
pub use infra::repos::join_requests::JoinRequestState;
