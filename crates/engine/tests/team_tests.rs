mod common;

use common::*;
use engine::{EngineError, JoinRequestState, LeaveOutcome, Role};

#[tokio::test]
async fn test_create_team_requires_confirmed_registration() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Team Gate Hack").await;

    let p = participant();
    let registration = engine
        .register(&p, id, Role::Participant)
        .await
        .expect("Registration should succeed");

    // unconfirmed registrant cannot form a team
    let err = engine.create_team(&p, id, "Early Birds", 4).await.unwrap_err();
    assert!(
        matches!(err, EngineError::Forbidden(_)),
        "unconfirmed registrant must not create a team, got {err:?}"
    );

    engine
        .confirm_registration(&org, registration.id)
        .await
        .expect("Confirmation should succeed");
    let team = engine
        .create_team(&p, id, "Early Birds", 4)
        .await
        .expect("Team creation should succeed once confirmed");
    assert_eq!(team.leader_user_id, p.user_id);

    let (_, members) = engine.team(team.id).await.expect("Team lookup should succeed");
    assert_eq!(members.len(), 1, "the creator is the sole founding member");
    assert_eq!(members[0].user_id, p.user_id);

    let mine = engine.my_team(&p, id).await.expect("Lookup should succeed");
    assert_eq!(mine.map(|t| t.id), Some(team.id));
}

#[tokio::test]
async fn test_create_team_validation_and_conflicts() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Team Rules Hack").await;
    let leader = confirmed_participant(&engine, &org, id).await;

    let err = engine.create_team(&leader, id, "   ", 4).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine.create_team(&leader, id, "Solo", 1).await.unwrap_err();
    assert!(
        matches!(err, EngineError::Validation(_)),
        "a team of one is not a team, got {err:?}"
    );

    engine
        .create_team(&leader, id, "Originals", 4)
        .await
        .expect("Team creation should succeed");

    // the leader already belongs to a team
    let err = engine.create_team(&leader, id, "Another", 4).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // duplicate name within the hackathon
    let second = confirmed_participant(&engine, &org, id).await;
    let err = engine
        .create_team(&second, id, "Originals", 4)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::Conflict(_)),
        "duplicate team name should conflict, got {err:?}"
    );
}

#[tokio::test]
async fn test_team_count_cap() {
    let engine = setup_engine().await;
    let org = organizer();
    let mut input = hackathon_input("One Team Hack");
    input.max_teams = 1;
    let hackathon = engine
        .create_hackathon(&org, input)
        .await
        .expect("Creation should succeed");
    engine
        .open_registrations(&org, hackathon.id)
        .await
        .expect("Open should succeed");

    let first = confirmed_participant(&engine, &org, hackathon.id).await;
    engine
        .create_team(&first, hackathon.id, "Only One", 4)
        .await
        .expect("First team should fit");

    let second = confirmed_participant(&engine, &org, hackathon.id).await;
    let err = engine
        .create_team(&second, hackathon.id, "Overflow", 4)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::CapacityExceeded(_)),
        "team cap should apply, got {err:?}"
    );

    let teams = engine
        .list_teams(hackathon.id, None)
        .await
        .expect("Listing should succeed");
    assert_eq!(teams.len(), 1);
}

#[tokio::test]
async fn test_join_request_round_trip() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Join Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Hosts", 3)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&candidate, team.id, Some("pick me".to_string()))
        .await
        .expect("Join request should succeed");
    assert_eq!(request.state, JoinRequestState::Pending);

    let pending = engine
        .pending_requests(&leader, team.id)
        .await
        .expect("Leader listing should succeed");
    assert_eq!(pending.len(), 1);

    let accepted = engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");
    assert_eq!(accepted.state, JoinRequestState::Accepted);

    let (team_row, members) = engine.team(team.id).await.expect("Lookup should succeed");
    assert_eq!(members.len(), 2);
    assert_eq!(team_row.leader_user_id, leader.user_id, "leadership unchanged");

    let mine = engine
        .my_team(&candidate, id)
        .await
        .expect("Lookup should succeed");
    assert_eq!(mine.map(|t| t.id), Some(team.id));
}

#[tokio::test]
async fn test_join_request_preconditions() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Request Rules Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Pickers", 2)
        .await
        .expect("Team creation should succeed");

    // unconfirmed registrant
    let unconfirmed = participant();
    engine
        .register(&unconfirmed, id, Role::Participant)
        .await
        .expect("Registration should succeed");
    let err = engine
        .request_to_join(&unconfirmed, team.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // the leader already sits in this very team
    let err = engine.request_to_join(&leader, team.id, None).await.unwrap_err();
    assert!(
        matches!(err, EngineError::Conflict(_)),
        "members do not apply to teams, got {err:?}"
    );

    // an overlong message
    let candidate = confirmed_participant(&engine, &org, id).await;
    let long_message = "x".repeat(501);
    let err = engine
        .request_to_join(&candidate, team.id, Some(long_message))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // duplicate pending request
    engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("First request should succeed");
    let err = engine
        .request_to_join(&candidate, team.id, None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::Conflict(_)),
        "duplicate pending request should conflict, got {err:?}"
    );
}

#[tokio::test]
async fn test_request_to_full_team_fails_fast() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Full Team Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Duo", 2)
        .await
        .expect("Team creation should succeed");

    let first = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&first, team.id, None)
        .await
        .expect("Request should succeed");
    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");

    let late = confirmed_participant(&engine, &org, id).await;
    let err = engine.request_to_join(&late, team.id, None).await.unwrap_err();
    assert!(
        matches!(err, EngineError::CapacityExceeded(_)),
        "requests to a full team are refused outright, got {err:?}"
    );
}

#[tokio::test]
async fn test_accept_respects_capacity_at_accept_time() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Late Accept Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Duo", 2)
        .await
        .expect("Team creation should succeed");

    // two candidates apply while the slot is still free
    let a = confirmed_participant(&engine, &org, id).await;
    let b = confirmed_participant(&engine, &org, id).await;
    let request_a = engine
        .request_to_join(&a, team.id, None)
        .await
        .expect("Request should succeed");
    let request_b = engine
        .request_to_join(&b, team.id, None)
        .await
        .expect("Request should succeed");

    engine
        .accept_join_request(&leader, request_a.id)
        .await
        .expect("First accept should succeed");

    let err = engine
        .accept_join_request(&leader, request_b.id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::CapacityExceeded(_)),
        "the slot is gone by accept time, got {err:?}"
    );

    // the losing request is still pending; freeing the slot lets it through
    engine
        .remove_member(&leader, team.id, a.user_id)
        .await
        .expect("Removal should succeed");
    engine
        .accept_join_request(&leader, request_b.id)
        .await
        .expect("Accept should succeed once a seat is free");
}

#[tokio::test]
async fn test_accept_is_leader_only() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Leader Only Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Guards", 3)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("Request should succeed");

    // the candidate cannot accept their own request
    let err = engine
        .accept_join_request(&candidate, request.id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::Forbidden(_)),
        "only the leader accepts, got {err:?}"
    );
}

#[tokio::test]
async fn test_accept_invalidates_rival_requests() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Rivals Hack").await;

    let leader_a = confirmed_participant(&engine, &org, id).await;
    let team_a = engine
        .create_team(&leader_a, id, "Alpha", 3)
        .await
        .expect("Team creation should succeed");
    let leader_b = confirmed_participant(&engine, &org, id).await;
    let team_b = engine
        .create_team(&leader_b, id, "Beta", 3)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    let request_a = engine
        .request_to_join(&candidate, team_a.id, None)
        .await
        .expect("Request should succeed");
    engine
        .request_to_join(&candidate, team_b.id, None)
        .await
        .expect("Request should succeed");

    engine
        .accept_join_request(&leader_a, request_a.id)
        .await
        .expect("Accept should succeed");

    // the rival pending request was closed in the same unit of work
    let remaining = engine
        .pending_requests(&leader_b, team_b.id)
        .await
        .expect("Listing should succeed");
    assert!(remaining.is_empty(), "rival request must be auto-rejected");

    let all = engine
        .my_join_requests(&candidate, id)
        .await
        .expect("Listing should succeed");
    let accepted = all
        .iter()
        .filter(|r| r.state == JoinRequestState::Accepted)
        .count();
    let rejected = all
        .iter()
        .filter(|r| r.state == JoinRequestState::Rejected)
        .count();
    assert_eq!((accepted, rejected), (1, 1));
}

#[tokio::test]
async fn test_create_team_withdraws_own_pending_requests() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Withdraw Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "First", 3)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("Request should succeed");

    // founding an own team withdraws the open application
    engine
        .create_team(&candidate, id, "Second", 3)
        .await
        .expect("Team creation should succeed");

    let pending = engine
        .pending_requests(&leader, team.id)
        .await
        .expect("Listing should succeed");
    assert!(pending.is_empty());

    // the stale request replays as rejected for its leader
    let replay = engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Replay should not error");
    assert_eq!(replay.state, JoinRequestState::Rejected);
}

#[tokio::test]
async fn test_resolved_requests_replay_without_side_effects() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Replay Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Echo", 4)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("Request should succeed");

    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");

    // accepting again replays; rejecting afterwards replays the accept too
    let replayed = engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Replay should not error");
    assert_eq!(replayed.state, JoinRequestState::Accepted);
    let replayed = engine
        .reject_join_request(&leader, request.id)
        .await
        .expect("Replay should not error");
    assert_eq!(
        replayed.state,
        JoinRequestState::Accepted,
        "a terminal state never flips"
    );

    let (_, members) = engine.team(team.id).await.expect("Lookup should succeed");
    assert_eq!(members.len(), 2, "replays must not duplicate membership");
}

#[tokio::test]
async fn test_reject_join_request() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Turn Down Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Gate", 3)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("Request should succeed");

    let rejected = engine
        .reject_join_request(&leader, request.id)
        .await
        .expect("Reject should succeed");
    assert_eq!(rejected.state, JoinRequestState::Rejected);

    let (_, members) = engine.team(team.id).await.expect("Lookup should succeed");
    assert_eq!(members.len(), 1);

    // a rejected candidate may apply again
    engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("A fresh request after rejection should succeed");
}

#[tokio::test]
async fn test_remove_member_rules() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Removal Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Bouncers", 3)
        .await
        .expect("Team creation should succeed");
    let member = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&member, team.id, None)
        .await
        .expect("Request should succeed");
    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");

    // only the leader removes
    let err = engine
        .remove_member(&member, team.id, leader.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // the leader cannot remove themselves
    let err = engine
        .remove_member(&leader, team.id, leader.user_id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::Forbidden(_)),
        "self-removal goes through leave, got {err:?}"
    );

    // removing a non-member
    let outsider = confirmed_participant(&engine, &org, id).await;
    let err = engine
        .remove_member(&leader, team.id, outsider.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    engine
        .remove_member(&leader, team.id, member.user_id)
        .await
        .expect("Removal should succeed");
    let (_, members) = engine.team(team.id).await.expect("Lookup should succeed");
    assert_eq!(members.len(), 1);

    // the removed member is free to join another team
    let mine = engine.my_team(&member, id).await.expect("Lookup should succeed");
    assert!(mine.is_none());
}

#[tokio::test]
async fn test_non_leader_leave_keeps_leadership() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Quiet Leave Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Steady", 3)
        .await
        .expect("Team creation should succeed");
    let member = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&member, team.id, None)
        .await
        .expect("Request should succeed");
    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");

    let outcome = engine
        .leave_team(&member, team.id)
        .await
        .expect("Leaving should succeed");
    assert!(
        matches!(outcome, LeaveOutcome::Left { .. }),
        "a plain member leaving changes nothing else, got {outcome:?}"
    );

    let (team_row, members) = engine.team(team.id).await.expect("Lookup should succeed");
    assert_eq!(team_row.leader_user_id, leader.user_id);
    assert_eq!(members.len(), 1);
}

#[tokio::test]
async fn test_leader_leave_promotes_earliest_member() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Succession Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Dynasty", 4)
        .await
        .expect("Team creation should succeed");

    // first joins earlier than second
    let first = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&first, team.id, None)
        .await
        .expect("Request should succeed");
    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");
    let second = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&second, team.id, None)
        .await
        .expect("Request should succeed");
    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");

    let outcome = engine
        .leave_team(&leader, team.id)
        .await
        .expect("Leader leave should succeed");
    match outcome {
        LeaveOutcome::LeadershipPassed {
            team: updated,
            new_leader_user_id,
        } => {
            assert_eq!(new_leader_user_id, first.user_id, "earliest joiner takes over");
            assert_eq!(updated.leader_user_id, first.user_id);
        }
        other => panic!("expected a leadership handover, got {other:?}"),
    }

    let (_, members) = engine.team(team.id).await.expect("Lookup should succeed");
    assert_eq!(members.len(), 2);
    let gone = engine.my_team(&leader, id).await.expect("Lookup should succeed");
    assert!(gone.is_none(), "the departed leader is off the team");
}

#[tokio::test]
async fn test_succession_tie_breaks_on_lower_user_id() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Tie Break Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Twins", 4)
        .await
        .expect("Team creation should succeed");

    let a = confirmed_participant(&engine, &org, id).await;
    let b = confirmed_participant(&engine, &org, id).await;
    for member in [&a, &b] {
        let request = engine
            .request_to_join(member, team.id, None)
            .await
            .expect("Request should succeed");
        engine
            .accept_join_request(&leader, request.id)
            .await
            .expect("Accept should succeed");
    }

    // force an exact join-time tie between the two non-leaders
    sqlx::query("UPDATE team_members SET joined_at = $1 WHERE team_id = $2 AND user_id != $3")
        .bind(chrono::Utc::now())
        .bind(team.id)
        .bind(leader.user_id)
        .execute(&engine.db)
        .await
        .expect("Failed to align join times");

    let outcome = engine
        .leave_team(&leader, team.id)
        .await
        .expect("Leader leave should succeed");
    let expected = a.user_id.min(b.user_id);
    match outcome {
        LeaveOutcome::LeadershipPassed {
            new_leader_user_id, ..
        } => assert_eq!(new_leader_user_id, expected, "tie falls to the lower id"),
        other => panic!("expected a leadership handover, got {other:?}"),
    }
}

#[tokio::test]
async fn test_last_member_leave_disbands_team() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Disband Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Last Light", 3)
        .await
        .expect("Team creation should succeed");

    let candidate = confirmed_participant(&engine, &org, id).await;
    engine
        .request_to_join(&candidate, team.id, None)
        .await
        .expect("Request should succeed");

    let outcome = engine
        .leave_team(&leader, team.id)
        .await
        .expect("Leave should succeed");
    match outcome {
        LeaveOutcome::Disbanded {
            team_id,
            rejected_requests,
            ..
        } => {
            assert_eq!(team_id, team.id);
            assert_eq!(rejected_requests, 1, "open requests close with the team");
        }
        other => panic!("expected a disband, got {other:?}"),
    }

    let err = engine.team(team.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let requests = engine
        .my_join_requests(&candidate, id)
        .await
        .expect("Listing should succeed");
    assert_eq!(requests[0].state, JoinRequestState::Rejected);
}

#[tokio::test]
async fn test_leave_requires_membership() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Stranger Leave Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Insiders", 3)
        .await
        .expect("Team creation should succeed");

    let outsider = confirmed_participant(&engine, &org, id).await;
    let err = engine.leave_team(&outsider, team.id).await.unwrap_err();
    assert!(
        matches!(err, EngineError::NotFound(_)),
        "leaving a team one is not on should fail, got {err:?}"
    );
}

#[tokio::test]
async fn test_membership_freezes_after_start_but_leave_stays_legal() {
    let engine = setup_engine().await;
    let org = organizer();
    let id = open_hackathon(&engine, &org, "Frozen Hack").await;

    let leader = confirmed_participant(&engine, &org, id).await;
    let team = engine
        .create_team(&leader, id, "Icebound", 3)
        .await
        .expect("Team creation should succeed");
    let member = confirmed_participant(&engine, &org, id).await;
    let request = engine
        .request_to_join(&member, team.id, None)
        .await
        .expect("Request should succeed");
    engine
        .accept_join_request(&leader, request.id)
        .await
        .expect("Accept should succeed");

    let loner = confirmed_participant(&engine, &org, id).await;
    engine
        .close_registrations(&org, id)
        .await
        .expect("Close should succeed");
    engine
        .start_hackathon(&org, id, "Freeze!")
        .await
        .expect("Start should succeed");

    // growth operations are frozen
    let err = engine.create_team(&loner, id, "Latecomers", 3).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    let err = engine.request_to_join(&loner, team.id, None).await.unwrap_err();
    assert!(
        matches!(err, EngineError::InvalidTransition(_)),
        "no new requests after start, got {err:?}"
    );

    // shrinking is not
    engine
        .remove_member(&leader, team.id, member.user_id)
        .await
        .expect("Removal should stay legal after start");
    engine
        .leave_team(&leader, team.id)
        .await
        .expect("Leaving should stay legal after start");
}
