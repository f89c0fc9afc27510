//! One-shot consistency sweep for a store damaged by an interrupted
//! transaction or an external writer. Normal engine operation never needs
//! it; each fix restores one of the membership invariants.

use tracing::warn;

use infra::db::Db;
use infra::repos::{join_requests, registrations, team_members, teams};

use crate::error::OpError;

/// What a repair pass fixed, one counter per rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RepairReport {
    /// Rows referencing a hackathon or team that no longer exists.
    pub orphaned_rows: u64,
    /// Memberships whose holder lacks a confirmed registration.
    pub stale_memberships: u64,
    /// Teams whose recorded leader was absent and a member was promoted.
    pub relinked_leaders: u64,
    /// Teams left without any member and deleted.
    pub disbanded_teams: u64,
    /// Pending join requests that could never be accepted.
    pub rejected_requests: u64,
}

impl RepairReport {
    pub fn fixes(&self) -> u64 {
        self.orphaned_rows
            + self.stale_memberships
            + self.relinked_leaders
            + self.disbanded_teams
            + self.rejected_requests
    }

    pub fn is_clean(&self) -> bool {
        self.fixes() == 0
    }
}

/// Run every repair rule in one transaction. The order matters: dropping a
/// stale membership can empty a team, which the later sweeps then disband.
pub(crate) async fn repair(db: &Db) -> Result<RepairReport, OpError> {
    let mut tx = db.begin().await?;
    let mut report = RepairReport::default();

    report.orphaned_rows += join_requests::delete_orphaned(&mut *tx).await?;
    report.orphaned_rows += team_members::delete_orphaned(&mut *tx).await?;
    report.orphaned_rows += teams::delete_orphaned(&mut *tx).await?;
    report.orphaned_rows += registrations::delete_orphaned(&mut *tx).await?;

    report.stale_memberships =
        team_members::delete_lacking_confirmed_registration(&mut *tx).await?;

    for team in teams::list_with_absent_leader(&mut *tx).await? {
        // promote along the same succession order used when a leader leaves
        if let Some(next) =
            team_members::successor(&mut *tx, team.id, team.leader_user_id).await?
        {
            teams::update_leader(&mut *tx, team.id, next.user_id).await?;
            report.relinked_leaders += 1;
        }
        // memberless teams fall through to the sweep below
    }

    for team in teams::list_without_members(&mut *tx).await? {
        report.rejected_requests += join_requests::reject_pending_by_team(&mut *tx, team.id).await?;
        teams::delete(&mut *tx, team.id).await?;
        report.disbanded_teams += 1;
    }

    report.rejected_requests += join_requests::reject_where_team_missing(&mut *tx).await?;
    report.rejected_requests += join_requests::reject_where_candidate_in_team(&mut *tx).await?;

    tx.commit().await?;
    if !report.is_clean() {
        warn!(?report, "store repair applied fixes");
    }
    Ok(report)
}
