//! End-to-end negotiation scenarios against recording fakes.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use common::Harness;
use convoy::engine::{NegotiationEngine, PlatoonState};
use convoy::protocol::{
    InfoParams, JoinRequestParams, MessageHeader, MobilityOperation, MobilityRequest,
    MobilityResponse, PlanType, RequestVerdict, StatusParams, MOBILITY_STRATEGY,
};
use convoy::roster::Roster;
use convoy::services::{PlanningOutcome, RouteService, Trajectory};
use convoy::{PlatoonConfig, PlatoonStateKind};

fn engine_with(harness: &Harness) -> (Arc<NegotiationEngine>, Arc<Roster>) {
    let cfg = Arc::new(PlatoonConfig::default());
    let roster = Arc::new(Roster::new());
    let engine = NegotiationEngine::new(cfg, Arc::clone(&roster), harness.services());
    (engine, roster)
}

fn join_request(sender: &str, plan_id: Uuid, size: usize, speed: f64, dtd: f64) -> MobilityRequest {
    MobilityRequest {
        header: MessageHeader::new(sender, "veh-host", plan_id),
        strategy: MOBILITY_STRATEGY.to_string(),
        plan_type: PlanType::JoinPlatoonAtRear,
        params: JoinRequestParams { size, speed, dtd }.encode(),
    }
}

fn status_operation(sender: &str, plan_id: Uuid, cmd_speed: f64, dtd: f64, speed: f64) -> MobilityOperation {
    MobilityOperation {
        header: MessageHeader::new(sender, "", plan_id),
        strategy: MOBILITY_STRATEGY.to_string(),
        params: StatusParams {
            cmd_speed,
            dtd,
            speed,
        }
        .encode(),
    }
}

fn info_operation(sender: &str, plan_id: Uuid, info: InfoParams) -> MobilityOperation {
    MobilityOperation {
        header: MessageHeader::new(sender, "", plan_id),
        strategy: MOBILITY_STRATEGY.to_string(),
        params: info.encode(),
    }
}

#[tokio::test]
async fn test_first_planning_call_activates_as_searching_leader() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    assert_eq!(engine.current_state().await, PlatoonState::Standby);
    let outcome = engine
        .plan_trajectory(
            Trajectory {
                start_downtrack: 100.0,
                end_downtrack: 400.0,
            },
            20.0,
        )
        .await;

    assert_eq!(outcome, PlanningOutcome::Unchanged);
    assert_eq!(engine.current_state().await, PlatoonState::Leader);
    assert!(roster.platoon_id().is_some());

    let status = engine.status(0.0).await;
    assert_eq!(status.state, PlatoonStateKind::Searching);
    assert_eq!(status.size, 1);
    assert_eq!(status.leader_id, "veh-host");
    assert_eq!(status.host_position, 0);
}

#[tokio::test]
async fn test_leader_accepts_rear_join_and_confirms_on_first_status() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    // established platoon of three: host leading, two members behind
    engine.set_state(PlatoonState::Leader).await;
    let platoon_id = Uuid::new_v4();
    roster.set_platoon_id(Some(platoon_id));
    let now = std::time::Instant::now();
    roster.upsert("veh-b", 140.0, 20.0, 20.0, now);
    roster.upsert("veh-c", 130.0, 20.0, 20.0, now);

    // candidate 10 m behind the rear
    let plan_id = Uuid::new_v4();
    let verdict = engine
        .handle_request(&join_request("veh-d", plan_id, 1, 20.0, 120.0))
        .await;
    assert_eq!(verdict, RequestVerdict::Ack);
    assert_eq!(
        engine.current_state().await,
        PlatoonState::LeaderWaiting {
            candidate_id: "veh-d".to_string()
        }
    );

    // the candidate's first STATUS completes the handshake
    engine
        .handle_operation(&status_operation("veh-d", platoon_id, 20.0, 121.0, 20.0))
        .await;
    assert_eq!(engine.current_state().await, PlatoonState::Leader);

    let status = engine.status(16.0).await;
    assert_eq!(status.state, PlatoonStateKind::Leading);
    assert_eq!(status.size, 4);
    assert_eq!(roster.position_of("veh-d"), Some(2));
}

#[tokio::test]
async fn test_join_accepted_ahead_of_current_rear() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    engine.set_state(PlatoonState::Leader).await;
    let platoon_id = Uuid::new_v4();
    roster.set_platoon_id(Some(platoon_id));
    let now = std::time::Instant::now();
    roster.upsert("veh-b", 140.0, 20.0, 20.0, now);
    roster.upsert("veh-c", 130.0, 20.0, 20.0, now);

    // candidate is 20 m ahead of the current rear, still inside the window
    let request = join_request("veh-d", Uuid::new_v4(), 1, 20.0, 150.0);
    assert_eq!(request.params, "SIZE:1,SPEED:20.00,DTD:150.00");
    let verdict = engine.handle_request(&request).await;
    assert_eq!(verdict, RequestVerdict::Ack);

    engine
        .handle_operation(&status_operation("veh-d", platoon_id, 20.0, 150.0, 20.0))
        .await;
    assert_eq!(engine.current_state().await, PlatoonState::Leader);
    assert_eq!(roster.size(), 4);
    // it sorts in by downtrack ahead of the old members
    assert_eq!(roster.position_of("veh-d"), Some(0));
}

#[tokio::test]
async fn test_join_rejected_when_gap_too_large() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, _roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;

    // 120 m behind the host, past the 90 m join window
    let verdict = engine
        .handle_request(&join_request("veh-d", Uuid::new_v4(), 1, 20.0, 40.0))
        .await;
    assert_eq!(verdict, RequestVerdict::Nack);
    assert_eq!(engine.current_state().await, PlatoonState::Leader);
}

#[tokio::test]
async fn test_join_rejected_when_platoon_full() {
    let harness = Harness::new("veh-host", 500.0, 20.0);
    let (engine, roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;
    let now = std::time::Instant::now();
    for i in 0..9 {
        roster.upsert(&format!("veh-{i}"), 490.0 - 10.0 * i as f64, 20.0, 20.0, now);
    }
    assert_eq!(roster.size(), 10);

    let verdict = engine
        .handle_request(&join_request("veh-x", Uuid::new_v4(), 1, 20.0, 395.0))
        .await;
    assert_eq!(verdict, RequestVerdict::Nack);
}

#[tokio::test]
async fn test_malformed_request_gets_no_response() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, _roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;

    let mut msg = join_request("veh-d", Uuid::new_v4(), 1, 20.0, 150.0);
    msg.params = "SIZE:one,SPEED:nan?,".to_string();
    let verdict = engine.handle_request(&msg).await;
    assert_eq!(verdict, RequestVerdict::NoResponse);
    assert_eq!(engine.current_state().await, PlatoonState::Leader);
}

#[tokio::test]
async fn test_foreign_strategy_is_ignored() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, _roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;

    let mut msg = join_request("veh-d", Uuid::new_v4(), 1, 20.0, 150.0);
    msg.strategy = "Carma/CooperativeMerge".to_string();
    assert_eq!(engine.handle_request(&msg).await, RequestVerdict::NoResponse);
}

#[tokio::test]
async fn test_info_in_range_triggers_join_request() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, _roster) = engine_with(&harness);

    // platoon rear at 270 - 150 = 120, 20 m ahead of the host
    let platoon_id = Uuid::new_v4();
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 150.0,
        speed: 20.0,
        size: 3,
        dtd: 270.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", platoon_id, info))
        .await;

    assert_eq!(
        engine.current_state().await,
        PlatoonState::CandidateFollower {
            target_leader_id: "veh-a".to_string(),
            platoon_id,
        }
    );
    let requests = harness.mobility.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header.recipient_id, "veh-a");
    assert_eq!(requests[0].params, "SIZE:1,SPEED:20.00,DTD:100.00");
}

#[tokio::test]
async fn test_info_out_of_range_is_ignored() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, _roster) = engine_with(&harness);

    // rear is 200 m ahead, far past the join window
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 100.0,
        speed: 20.0,
        size: 3,
        dtd: 400.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", Uuid::new_v4(), info))
        .await;

    assert_eq!(engine.current_state().await, PlatoonState::Standby);
    assert!(harness.mobility.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_accepted_response_promotes_candidate_to_follower() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    let platoon_id = Uuid::new_v4();
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 150.0,
        speed: 20.0,
        size: 3,
        dtd: 270.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", platoon_id, info))
        .await;
    let plan_id = harness.mobility.requests.lock().unwrap()[0].header.plan_id;

    engine
        .handle_response(&MobilityResponse {
            header: MessageHeader::new("veh-a", "veh-host", plan_id),
            is_accepted: true,
        })
        .await;

    assert_eq!(engine.current_state().await, PlatoonState::Follower);
    assert_eq!(roster.platoon_id(), Some(platoon_id));
}

#[tokio::test(start_paused = true)]
async fn test_quick_acceptance_keeps_follower_stable() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    let platoon_id = Uuid::new_v4();
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 150.0,
        speed: 20.0,
        size: 3,
        dtd: 270.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", platoon_id, info))
        .await;
    let plan_id = harness.mobility.requests.lock().unwrap()[0].header.plan_id;

    // acceptance arrives well before the leader's next INFO broadcast
    engine
        .handle_response(&MobilityResponse {
            header: MessageHeader::new("veh-a", "veh-host", plan_id),
            is_accepted: true,
        })
        .await;
    assert_eq!(engine.current_state().await, PlatoonState::Follower);

    // the leader seeded from the INFO keeps the health check satisfied
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(engine.current_state().await, PlatoonState::Follower);
    assert_eq!(roster.size(), 2);
}

#[tokio::test]
async fn test_rejected_response_returns_candidate_to_standby() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    let platoon_id = Uuid::new_v4();
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 150.0,
        speed: 20.0,
        size: 3,
        dtd: 270.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", platoon_id, info))
        .await;
    let plan_id = harness.mobility.requests.lock().unwrap()[0].header.plan_id;

    engine
        .handle_response(&MobilityResponse {
            header: MessageHeader::new("veh-a", "veh-host", plan_id),
            is_accepted: false,
        })
        .await;

    assert_eq!(engine.current_state().await, PlatoonState::Standby);
    assert_eq!(roster.platoon_id(), None);
}

#[tokio::test]
async fn test_response_for_unrelated_plan_is_ignored() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, _roster) = engine_with(&harness);

    let platoon_id = Uuid::new_v4();
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 150.0,
        speed: 20.0,
        size: 3,
        dtd: 270.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", platoon_id, info))
        .await;

    engine
        .handle_response(&MobilityResponse {
            header: MessageHeader::new("veh-a", "veh-host", Uuid::new_v4()),
            is_accepted: true,
        })
        .await;

    assert!(matches!(
        engine.current_state().await,
        PlatoonState::CandidateFollower { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_candidate_times_out_back_to_standby() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, _roster) = engine_with(&harness);

    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 150.0,
        speed: 20.0,
        size: 3,
        dtd: 270.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", Uuid::new_v4(), info))
        .await;
    assert!(matches!(
        engine.current_state().await,
        PlatoonState::CandidateFollower { .. }
    ));

    // silence: no response within the negotiation window
    tokio::time::sleep(Duration::from_millis(5200)).await;
    assert_eq!(engine.current_state().await, PlatoonState::Standby);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_leader_reverts_after_candidate_silence() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, _roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;

    let verdict = engine
        .handle_request(&join_request("veh-d", Uuid::new_v4(), 1, 20.0, 150.0))
        .await;
    assert_eq!(verdict, RequestVerdict::Ack);
    assert!(matches!(
        engine.current_state().await,
        PlatoonState::LeaderWaiting { .. }
    ));

    // default waiting window is 25 s
    tokio::time::sleep(Duration::from_secs(26)).await;
    assert_eq!(engine.current_state().await, PlatoonState::Leader);
}

#[tokio::test(start_paused = true)]
async fn test_follower_takes_over_when_front_goes_silent() {
    let harness = Harness::new("veh-host", 130.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    let old_platoon = Uuid::new_v4();
    roster.set_platoon_id(Some(old_platoon));
    let now = std::time::Instant::now();
    // nobody ahead survives in the roster, one member remains behind
    roster.upsert("veh-rear", 110.0, 20.0, 20.0, now);
    engine
        .set_state(PlatoonState::CandidateFollower {
            target_leader_id: "veh-a".to_string(),
            platoon_id: old_platoon,
        })
        .await;
    engine.set_state(PlatoonState::Follower).await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(engine.current_state().await, PlatoonState::Leader);
    let new_id = roster.platoon_id().unwrap();
    assert_ne!(new_id, old_platoon);
}

#[tokio::test(start_paused = true)]
async fn test_follower_stands_down_when_alone() {
    let harness = Harness::new("veh-host", 130.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    roster.set_platoon_id(Some(Uuid::new_v4()));
    engine
        .set_state(PlatoonState::CandidateFollower {
            target_leader_id: "veh-a".to_string(),
            platoon_id: Uuid::new_v4(),
        })
        .await;
    engine.set_state(PlatoonState::Follower).await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(engine.current_state().await, PlatoonState::Standby);
    assert_eq!(roster.platoon_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_follower_broadcasts_status_on_cadence() {
    let harness = Harness::new("veh-host", 130.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    let platoon_id = Uuid::new_v4();
    roster.set_platoon_id(Some(platoon_id));
    let now = std::time::Instant::now();
    roster.upsert("veh-a", 150.0, 20.0, 20.0, now);
    engine
        .set_state(PlatoonState::CandidateFollower {
            target_leader_id: "veh-a".to_string(),
            platoon_id,
        })
        .await;
    engine.set_state(PlatoonState::Follower).await;

    tokio::time::sleep(Duration::from_millis(1050)).await;
    let operations = harness.mobility.operations.lock().unwrap();
    let statuses = operations
        .iter()
        .filter(|op| op.params.starts_with("STATUS|"))
        .count();
    assert!(
        (8..=12).contains(&statuses),
        "expected about 10 STATUS broadcasts, saw {statuses}"
    );
    assert!(operations.iter().all(|op| op.header.plan_id == platoon_id));
}

#[tokio::test(start_paused = true)]
async fn test_leader_broadcasts_info_on_slow_cadence() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;
    roster.set_platoon_id(Some(Uuid::new_v4()));

    tokio::time::sleep(Duration::from_millis(6500)).await;
    let operations = harness.mobility.operations.lock().unwrap();
    let infos: Vec<_> = operations
        .iter()
        .filter(|op| op.params.starts_with("INFO|"))
        .collect();
    // one immediately, then every 3 s
    assert!(
        (2..=4).contains(&infos.len()),
        "expected about 3 INFO broadcasts, saw {}",
        infos.len()
    );
    assert!(infos
        .iter()
        .all(|op| op.params.contains("SIZE:1") && op.header.is_broadcast()));
}

#[tokio::test(start_paused = true)]
async fn test_leader_dissolves_after_losing_last_follower() {
    let harness = Harness::new("veh-host", 160.0, 20.0);
    let (engine, roster) = engine_with(&harness);
    engine.set_state(PlatoonState::Leader).await;
    let platoon_id = Uuid::new_v4();
    roster.set_platoon_id(Some(platoon_id));

    engine
        .handle_operation(&status_operation("veh-b", platoon_id, 20.0, 150.0, 20.0))
        .await;
    assert_eq!(engine.status(0.0).await.state, PlatoonStateKind::Leading);

    // the follower disappears from the roster (timed out elsewhere)
    roster.expire_stale(
        std::time::Instant::now() + Duration::from_secs(60),
        Duration::from_millis(250),
    );
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(engine.current_state().await, PlatoonState::Standby);
}

#[tokio::test]
async fn test_candidate_plans_catchup_speed() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let (engine, roster) = engine_with(&harness);

    let platoon_id = Uuid::new_v4();
    // target leader 200 m ahead after the join request went out
    let info = InfoParams {
        rear_id: "veh-c".to_string(),
        length: 180.0,
        speed: 20.0,
        size: 3,
        dtd: 300.0,
    };
    engine
        .handle_operation(&info_operation("veh-a", platoon_id, info))
        .await;
    assert!(matches!(
        engine.current_state().await,
        PlatoonState::CandidateFollower { .. }
    ));
    let now = std::time::Instant::now();
    roster.upsert("veh-a", 300.0, 20.0, 20.0, now);

    let outcome = engine
        .plan_trajectory(
            Trajectory {
                start_downtrack: 100.0,
                end_downtrack: 400.0,
            },
            20.0,
        )
        .await;
    // desired window max(30, 4 x 20) = 80 m; excess 120 m closed over 4 s,
    // capped at cmd_speed_max_adjustment = 10
    assert_eq!(
        outcome,
        PlanningOutcome::SteadySpeed {
            speed: 30.0,
            start_downtrack: 100.0,
            end_downtrack: 400.0,
        }
    );
}

/// Route fake that parks inside `current_downtrack` until released, pinning
/// the caller mid-dispatch
struct BlockingRoute {
    entered: AtomicBool,
    release: AtomicBool,
}

impl RouteService for BlockingRoute {
    fn current_downtrack(&self) -> f64 {
        self.entered.store(true, Ordering::SeqCst);
        while !self.release.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        100.0
    }

    fn speed_limit_at(&self, _downtrack: f64) -> f64 {
        25.0
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_and_transitions_never_interleave() {
    let harness = Harness::new("veh-host", 100.0, 20.0);
    let route = Arc::new(BlockingRoute {
        entered: AtomicBool::new(false),
        release: AtomicBool::new(false),
    });
    let mut services = harness.services();
    services.route = route.clone();
    let engine = NegotiationEngine::new(
        Arc::new(PlatoonConfig::default()),
        Arc::new(Roster::new()),
        services,
    );

    let op = info_operation(
        "veh-a",
        Uuid::new_v4(),
        InfoParams {
            rear_id: "veh-c".to_string(),
            length: 150.0,
            speed: 20.0,
            size: 3,
            dtd: 270.0,
        },
    );
    let dispatch = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.handle_operation(&op).await })
    };
    while !route.entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // the dispatch is parked inside the engine; a transition issued now must
    // wait for it to finish
    let transitioned = Arc::new(AtomicBool::new(false));
    let transition = {
        let engine = Arc::clone(&engine);
        let transitioned = Arc::clone(&transitioned);
        tokio::spawn(async move {
            engine.set_state(PlatoonState::Leader).await;
            transitioned.store(true, Ordering::SeqCst);
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!transitioned.load(Ordering::SeqCst));

    route.release.store(true, Ordering::SeqCst);
    dispatch.await.unwrap();
    transition.await.unwrap();
    assert!(transitioned.load(Ordering::SeqCst));
    // the transition saw the dispatch's outcome, not the state before it
    assert!(matches!(
        engine.current_state().await,
        PlatoonState::CandidateFollower { .. }
    ));
}

#[tokio::test]
async fn test_planning_while_following_emits_steady_speed() {
    let harness = Harness::new("veh-host", 130.0, 20.0);
    let (engine, roster) = engine_with(&harness);
    let platoon_id = Uuid::new_v4();
    roster.set_platoon_id(Some(platoon_id));
    engine
        .set_state(PlatoonState::CandidateFollower {
            target_leader_id: "veh-a".to_string(),
            platoon_id,
        })
        .await;
    engine.set_state(PlatoonState::Follower).await;

    let outcome = engine
        .plan_trajectory(
            Trajectory {
                start_downtrack: 130.0,
                end_downtrack: 430.0,
            },
            21.5,
        )
        .await;
    assert_eq!(
        outcome,
        PlanningOutcome::SteadySpeed {
            speed: 21.5,
            start_downtrack: 130.0,
            end_downtrack: 430.0,
        }
    );

    // too short to bother with
    let outcome = engine
        .plan_trajectory(
            Trajectory {
                start_downtrack: 130.0,
                end_downtrack: 140.0,
            },
            21.5,
        )
        .await;
    assert_eq!(outcome, PlanningOutcome::Unchanged);
}
