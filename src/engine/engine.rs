//! The negotiation engine: serialized message dispatch, state transitions
//! and per-state duty workers.
//!
//! All inbound message handling and every state replacement go through one
//! mutex, so a transition can never race in-flight processing for the state
//! being replaced. Duty workers run outside that lock; a generation stamp
//! checked under the lock keeps a superseded worker from acting after its
//! state has been replaced.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PlatoonConfig;
use crate::protocol::{
    InfoParams, JoinRequestParams, MessageHeader, MobilityOperation, MobilityRequest,
    MobilityResponse, OperationPayload, RequestVerdict, StatusParams, MOBILITY_STRATEGY,
};
use crate::roster::Roster;
use crate::services::{GuidanceServices, PlanningOutcome, Trajectory};
use crate::status::PlatoonStatus;
use crate::{INFO_INTERVAL_LENGTH_MS, NEGOTIATION_TIMEOUT_MS, STATUS_INTERVAL_LENGTH_MS};

use super::session::{NegotiationSession, SessionKind};
use super::state::PlatoonState;

/// The currently running state duty task
struct StateWorker {
    cancel: watch::Sender<bool>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

struct EngineCore {
    state: PlatoonState,
    session: Option<NegotiationSession>,
    /// Bumped on every transition; duty workers compare before acting
    generation: u64,
    worker: Option<StateWorker>,
    /// True once the platoon has had at least one follower; a leader whose
    /// roster empties after that dissolves back to standby
    had_followers: bool,
}

/// Platoon negotiation state machine
pub struct NegotiationEngine {
    cfg: Arc<PlatoonConfig>,
    roster: Arc<Roster>,
    services: GuidanceServices,
    host_id: String,
    core: Mutex<EngineCore>,
    /// Self-handle for spawning duty workers; set once at construction
    weak: Weak<Self>,
}

impl NegotiationEngine {
    pub fn new(
        cfg: Arc<PlatoonConfig>,
        roster: Arc<Roster>,
        services: GuidanceServices,
    ) -> Arc<Self> {
        let host_id = services.router.host_mobility_id();
        Arc::new_cyclic(|weak| Self {
            cfg,
            roster,
            services,
            host_id,
            core: Mutex::new(EngineCore {
                state: PlatoonState::Standby,
                session: None,
                generation: 0,
                worker: None,
                had_followers: false,
            }),
            weak: weak.clone(),
        })
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub async fn current_state(&self) -> PlatoonState {
        self.core.lock().await.state.clone()
    }

    /// Replace the active state; the previous duty worker is cancelled first
    pub async fn set_state(&self, new_state: PlatoonState) {
        let mut core = self.core.lock().await;
        self.transition_locked(&mut core, new_state);
    }

    /// Cancel the duty worker and revert to standby. Idempotent.
    pub async fn suspend(&self) {
        let mut core = self.core.lock().await;
        if let Some(worker) = core.worker.take() {
            let _ = worker.cancel.send(true);
        }
        core.generation += 1;
        core.session = None;
        if core.state != PlatoonState::Standby {
            info!(
                "Platooning state changing from {} to STANDBY (suspend)",
                core.state
            );
            core.state = PlatoonState::Standby;
        }
        core.had_followers = false;
        self.roster.clear();
    }

    fn transition_locked(&self, core: &mut EngineCore, new_state: PlatoonState) {
        if core.state != new_state && !core.state.can_transition_to(&new_state) {
            warn!(
                "Refusing invalid state transition {} -> {}",
                core.state, new_state
            );
            return;
        }
        info!(
            "Platooning state changing from {} to {}",
            core.state, new_state
        );
        if let Some(worker) = core.worker.take() {
            let _ = worker.cancel.send(true);
        }
        // Sessions never survive the state that opened them
        core.session = None;
        core.generation += 1;
        if new_state == PlatoonState::Standby {
            self.roster.clear();
            core.had_followers = false;
        }
        if new_state == PlatoonState::Leader && core.state == PlatoonState::Standby {
            core.had_followers = false;
        }
        core.state = new_state;
        core.worker = self.spawn_duty(&core.state, core.generation);
    }

    // ------------------------------------------------------------------
    // Inbound message handling (serialized with transitions)
    // ------------------------------------------------------------------

    /// Decide on an inbound negotiation request
    pub async fn handle_request(&self, msg: &MobilityRequest) -> RequestVerdict {
        if msg.strategy != MOBILITY_STRATEGY {
            return RequestVerdict::NoResponse;
        }
        let mut core = self.core.lock().await;
        match core.state.clone() {
            PlatoonState::Standby | PlatoonState::Leader => {
                let params = match JoinRequestParams::parse(&msg.params) {
                    Ok(params) => params,
                    Err(e) => {
                        warn!(
                            "Discarding malformed join request from {}: {e}",
                            msg.header.sender_id
                        );
                        return RequestVerdict::NoResponse;
                    }
                };
                if !self.join_admissible(&params) {
                    info!(
                        "Rejecting join request from {} (size {}, dtd {:.2})",
                        msg.header.sender_id, params.size, params.dtd
                    );
                    return RequestVerdict::Nack;
                }
                if self.roster.platoon_id().is_none() {
                    self.roster.set_platoon_id(Some(Uuid::new_v4()));
                }
                info!(
                    "Accepting join request from {}; waiting for first status",
                    msg.header.sender_id
                );
                self.transition_locked(
                    &mut core,
                    PlatoonState::LeaderWaiting {
                        candidate_id: msg.header.sender_id.clone(),
                    },
                );
                core.session = Some(NegotiationSession::new(
                    msg.header.sender_id.clone(),
                    SessionKind::JoinAtRear,
                    msg.header.plan_id,
                    Instant::now(),
                    Duration::from_secs_f64(self.cfg.formation.waiting_state_timeout),
                ));
                RequestVerdict::Ack
            }
            other => {
                debug!(
                    "Nacking join request from {} while in state {}",
                    msg.header.sender_id, other
                );
                RequestVerdict::Nack
            }
        }
    }

    /// Apply an inbound response to the pending negotiation, if any
    pub async fn handle_response(&self, msg: &MobilityResponse) {
        let mut core = self.core.lock().await;
        let PlatoonState::CandidateFollower {
            target_leader_id,
            platoon_id,
        } = core.state.clone()
        else {
            debug!(
                "Ignoring response from {} in state {}",
                msg.header.sender_id, core.state
            );
            return;
        };
        let Some(session) = core.session.clone() else {
            debug!("Response from {} without a session", msg.header.sender_id);
            return;
        };
        if msg.header.sender_id != target_leader_id || msg.header.plan_id != session.plan_id {
            debug!(
                "Ignoring response from {} for unrelated plan {}",
                msg.header.sender_id, msg.header.plan_id
            );
            return;
        }
        if msg.is_accepted {
            info!(
                "Join request accepted by {target_leader_id}; entering platoon {platoon_id}"
            );
            self.roster.set_platoon_id(Some(platoon_id));
            self.transition_locked(&mut core, PlatoonState::Follower);
        } else {
            info!("Join request rejected by {target_leader_id}");
            self.transition_locked(&mut core, PlatoonState::Standby);
        }
    }

    /// Apply an inbound INFO/STATUS operation to the active state
    pub async fn handle_operation(&self, msg: &MobilityOperation) {
        if msg.strategy != MOBILITY_STRATEGY {
            return;
        }
        let payload = match OperationPayload::parse(&msg.params) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    "Discarding malformed operation from {}: {e}",
                    msg.header.sender_id
                );
                return;
            }
        };
        let mut core = self.core.lock().await;
        let now = std::time::Instant::now();
        match (core.state.clone(), payload) {
            (PlatoonState::Standby, OperationPayload::Info(info)) => {
                self.consider_join(&mut core, msg, &info);
            }
            (PlatoonState::Leader, OperationPayload::Status(status)) => {
                if Some(msg.header.plan_id) == self.roster.platoon_id() {
                    self.roster.upsert(
                        &msg.header.sender_id,
                        status.dtd,
                        status.speed,
                        status.cmd_speed,
                        now,
                    );
                    core.had_followers = true;
                }
            }
            (PlatoonState::LeaderWaiting { candidate_id }, OperationPayload::Status(status)) => {
                self.roster.upsert(
                    &msg.header.sender_id,
                    status.dtd,
                    status.speed,
                    status.cmd_speed,
                    now,
                );
                if msg.header.sender_id == candidate_id {
                    info!("Candidate {candidate_id} confirmed; platoon size {}", self.roster.size());
                    core.had_followers = true;
                    self.transition_locked(&mut core, PlatoonState::Leader);
                }
            }
            (PlatoonState::Follower, OperationPayload::Status(status)) => {
                if Some(msg.header.plan_id) == self.roster.platoon_id() {
                    self.roster.upsert(
                        &msg.header.sender_id,
                        status.dtd,
                        status.speed,
                        status.cmd_speed,
                        now,
                    );
                }
            }
            (PlatoonState::Follower, OperationPayload::Info(info)) => {
                if Some(msg.header.plan_id) == self.roster.platoon_id() {
                    self.roster.upsert(
                        &msg.header.sender_id,
                        info.dtd,
                        info.speed,
                        info.speed,
                        now,
                    );
                }
            }
            (
                PlatoonState::CandidateFollower {
                    target_leader_id, ..
                },
                OperationPayload::Info(info),
            ) => {
                if msg.header.sender_id == target_leader_id {
                    self.roster.upsert(
                        &msg.header.sender_id,
                        info.dtd,
                        info.speed,
                        info.speed,
                        now,
                    );
                }
            }
            (state, payload) => {
                debug!(
                    "Ignoring {} operation from {} in state {}",
                    match payload {
                        OperationPayload::Info(_) => "INFO",
                        OperationPayload::Status(_) => "STATUS",
                    },
                    msg.header.sender_id,
                    state
                );
            }
        }
    }

    /// Forward a trajectory-planning call to the active state
    pub async fn plan_trajectory(
        &self,
        trajectory: Trajectory,
        expected_entry_speed: f64,
    ) -> PlanningOutcome {
        let mut core = self.core.lock().await;
        debug!(
            "Plan trajectory [{:.2}, {:.2}] at {expected_entry_speed:.2} m/s in state {}",
            trajectory.start_downtrack, trajectory.end_downtrack, core.state
        );
        match core.state.clone() {
            PlatoonState::Standby => {
                // First planning call activates the engine: lead a platoon
                // of one and start searching for joiners.
                self.roster.set_platoon_id(Some(Uuid::new_v4()));
                self.transition_locked(&mut core, PlatoonState::Leader);
                PlanningOutcome::Unchanged
            }
            PlatoonState::Leader => PlanningOutcome::Unchanged,
            PlatoonState::CandidateFollower {
                target_leader_id, ..
            } => {
                if trajectory.length() < self.cfg.control.min_maneuver_length {
                    PlanningOutcome::Unchanged
                } else {
                    PlanningOutcome::SteadySpeed {
                        speed: self.catchup_speed(expected_entry_speed, &target_leader_id),
                        start_downtrack: trajectory.start_downtrack,
                        end_downtrack: trajectory.end_downtrack,
                    }
                }
            }
            PlatoonState::LeaderWaiting { .. } | PlatoonState::Follower => {
                if trajectory.length() < self.cfg.control.min_maneuver_length {
                    PlanningOutcome::Unchanged
                } else {
                    PlanningOutcome::SteadySpeed {
                        speed: expected_entry_speed,
                        start_downtrack: trajectory.start_downtrack,
                        end_downtrack: trajectory.end_downtrack,
                    }
                }
            }
        }
    }

    /// Speed a joining candidate should hold to close on the platoon.
    ///
    /// The catch-up closes the gap excess over the desired join window within
    /// `desired_join_time_gap` seconds, bounded by the command adjustment cap.
    fn catchup_speed(&self, entry_speed: f64, target_leader_id: &str) -> f64 {
        let formation = &self.cfg.formation;
        let Some(leader) = self
            .roster
            .snapshot()
            .into_iter()
            .find(|m| m.static_id == target_leader_id)
        else {
            return entry_speed;
        };
        let gap = leader.downtrack - self.services.route.current_downtrack();
        let target_gap = formation
            .desired_join_gap
            .max(formation.desired_join_time_gap * entry_speed);
        let excess = gap - target_gap;
        if excess <= 0.0 {
            entry_speed
        } else {
            let boost = (excess / formation.desired_join_time_gap)
                .min(self.cfg.control.cmd_speed_max_adjustment);
            entry_speed + boost
        }
    }

    /// Snapshot for the periodic status message
    pub async fn status(&self, desired_gap: f64) -> PlatoonStatus {
        let core = self.core.lock().await;
        if core.state == PlatoonState::Standby {
            return PlatoonStatus::disabled();
        }
        let size = self.roster.size();
        let host_dtd = self.services.route.current_downtrack();
        let (leader_id, leader_downtrack, leader_cmd_speed, host_position) =
            match self.roster.leader_of() {
                Some(leader) => (
                    leader.static_id,
                    leader.downtrack,
                    leader.cmd_speed,
                    self.roster.host_position(host_dtd),
                ),
                None => (
                    self.host_id.clone(),
                    host_dtd,
                    self.services.maneuver_inputs.current_speed(),
                    0,
                ),
            };
        PlatoonStatus {
            state: core.state.kind(size),
            platoon_id: self.roster.platoon_id(),
            size,
            size_limit: self.cfg.formation.max_platoon_size,
            leader_id,
            leader_downtrack,
            leader_cmd_speed,
            host_position,
            host_cmd_speed: self.services.last_speed_command_or_zero(),
            desired_gap,
        }
    }

    // ------------------------------------------------------------------
    // Join admission
    // ------------------------------------------------------------------

    fn join_admissible(&self, params: &JoinRequestParams) -> bool {
        let formation = &self.cfg.formation;
        if self.roster.size() + params.size > formation.max_platoon_size {
            debug!("Join inadmissible: platoon would exceed size limit");
            return false;
        }
        let host_dtd = self.services.route.current_downtrack();
        let rear_dtd = self
            .roster
            .rear_of()
            .map(|m| m.downtrack)
            .unwrap_or(host_dtd);
        // Distance to the rear either way; the joiner slots in wherever its
        // downtrack puts it once its STATUS broadcasts arrive
        let gap = (rear_dtd - params.dtd).abs();
        if gap > formation.max_allowed_join_gap {
            debug!(
                "Join inadmissible: rear gap {gap:.2} m exceeds {:.2} m",
                formation.max_allowed_join_gap
            );
            return false;
        }
        let time_gap = gap / params.speed.max(0.1);
        if time_gap > formation.max_allowed_join_time_gap {
            debug!(
                "Join inadmissible: rear time gap {time_gap:.2} s exceeds {:.2} s",
                formation.max_allowed_join_time_gap
            );
            return false;
        }
        true
    }

    /// In standby, a leader INFO within joining range triggers a join attempt
    fn consider_join(&self, core: &mut EngineCore, msg: &MobilityOperation, info: &InfoParams) {
        let formation = &self.cfg.formation;
        if info.size >= formation.max_platoon_size {
            return;
        }
        let host_dtd = self.services.route.current_downtrack();
        let host_speed = self.services.maneuver_inputs.current_speed();
        let rear_dtd = info.dtd - info.length;
        let gap = rear_dtd - host_dtd;
        if gap < 0.0 || gap > formation.max_allowed_join_gap {
            debug!(
                "Not joining platoon of {}: rear gap {gap:.2} m out of range",
                msg.header.sender_id
            );
            return;
        }
        let time_gap = gap / host_speed.max(0.1);
        if time_gap > formation.max_allowed_join_time_gap {
            debug!(
                "Not joining platoon of {}: rear time gap {time_gap:.2} s out of range",
                msg.header.sender_id
            );
            return;
        }

        let plan_id = Uuid::new_v4();
        let request = MobilityRequest {
            header: MessageHeader::new(self.host_id.clone(), msg.header.sender_id.clone(), plan_id),
            strategy: MOBILITY_STRATEGY.to_string(),
            plan_type: crate::protocol::PlanType::JoinPlatoonAtRear,
            params: JoinRequestParams {
                size: 1,
                speed: host_speed,
                dtd: host_dtd,
            }
            .encode(),
        };
        info!(
            "Requesting to join platoon {} led by {} (rear gap {gap:.2} m)",
            msg.header.plan_id, msg.header.sender_id
        );
        self.services.mobility.send_request(request);
        // Seed the roster from the INFO so the leader is already known if
        // the acceptance lands before its next broadcast
        self.roster.upsert(
            &msg.header.sender_id,
            info.dtd,
            info.speed,
            info.speed,
            std::time::Instant::now(),
        );
        self.transition_locked(
            core,
            PlatoonState::CandidateFollower {
                target_leader_id: msg.header.sender_id.clone(),
                platoon_id: msg.header.plan_id,
            },
        );
        core.session = Some(NegotiationSession::new(
            msg.header.sender_id.clone(),
            SessionKind::JoinAtRear,
            plan_id,
            Instant::now(),
            Duration::from_millis(NEGOTIATION_TIMEOUT_MS),
        ));
    }

    // ------------------------------------------------------------------
    // Per-state duty workers
    // ------------------------------------------------------------------

    fn spawn_duty(&self, state: &PlatoonState, generation: u64) -> Option<StateWorker> {
        let engine = self.weak.upgrade()?;
        match state {
            PlatoonState::Standby => None,
            PlatoonState::Leader => Some(Self::spawn_leader_duty(engine, generation)),
            PlatoonState::LeaderWaiting { .. } => Some(Self::spawn_waiting_duty(engine, generation)),
            PlatoonState::CandidateFollower { .. } => {
                Some(Self::spawn_candidate_duty(engine, generation))
            }
            PlatoonState::Follower => Some(Self::spawn_follower_duty(engine, generation)),
        }
    }

    fn spawn_leader_duty(engine: Arc<Self>, generation: u64) -> StateWorker {
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(STATUS_INTERVAL_LENGTH_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let info_period = Duration::from_millis(INFO_INTERVAL_LENGTH_MS);
            let mut last_info: Option<Instant> = None;
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = interval.tick() => {
                        let now = Instant::now();
                        if last_info.map_or(true, |t| now.duration_since(t) >= info_period) {
                            engine.broadcast_info();
                            last_info = Some(now);
                        }
                        engine.check_dissolution(generation).await;
                    }
                }
            }
            debug!("Leader duty worker exited");
        });
        StateWorker { cancel, handle }
    }

    fn spawn_waiting_duty(engine: Arc<Self>, generation: u64) -> StateWorker {
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(STATUS_INTERVAL_LENGTH_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let info_period = Duration::from_millis(INFO_INTERVAL_LENGTH_MS);
            let mut last_info: Option<Instant> = None;
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = interval.tick() => {
                        let now = Instant::now();
                        if last_info.map_or(true, |t| now.duration_since(t) >= info_period) {
                            engine.broadcast_info();
                            last_info = Some(now);
                        }
                        engine.check_waiting_timeout(generation, now).await;
                    }
                }
            }
            debug!("Leader-waiting duty worker exited");
        });
        StateWorker { cancel, handle }
    }

    fn spawn_candidate_duty(engine: Arc<Self>, generation: u64) -> StateWorker {
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(STATUS_INTERVAL_LENGTH_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = interval.tick() => {
                        engine.check_negotiation_timeout(generation, Instant::now()).await;
                    }
                }
            }
            debug!("Candidate duty worker exited");
        });
        StateWorker { cancel, handle }
    }

    fn spawn_follower_duty(engine: Arc<Self>, generation: u64) -> StateWorker {
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(STATUS_INTERVAL_LENGTH_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = interval.tick() => {
                        engine.broadcast_status();
                        engine.check_leader_health(generation).await;
                    }
                }
            }
            debug!("Follower duty worker exited");
        });
        StateWorker { cancel, handle }
    }

    /// Leader INFO broadcast
    fn broadcast_info(&self) {
        let host_dtd = self.services.route.current_downtrack();
        let host_speed = self.services.maneuver_inputs.current_speed();
        let (rear_id, rear_dtd) = self
            .roster
            .rear_of()
            .map(|m| (m.static_id, m.downtrack))
            .unwrap_or_else(|| (self.host_id.clone(), host_dtd));
        let params = InfoParams {
            rear_id,
            length: host_dtd - rear_dtd + self.cfg.control.vehicle_length,
            speed: host_speed,
            size: self.roster.size(),
            dtd: host_dtd,
        };
        let platoon_id = self.roster.platoon_id().unwrap_or_else(Uuid::nil);
        self.services.mobility.send_operation(MobilityOperation {
            header: MessageHeader::new(self.host_id.clone(), "", platoon_id),
            strategy: MOBILITY_STRATEGY.to_string(),
            params: params.encode(),
        });
    }

    /// Follower STATUS broadcast
    fn broadcast_status(&self) {
        let params = StatusParams {
            cmd_speed: self.services.last_speed_command_or_zero(),
            dtd: self.services.route.current_downtrack(),
            speed: self.services.maneuver_inputs.current_speed(),
        };
        let platoon_id = self.roster.platoon_id().unwrap_or_else(Uuid::nil);
        self.services.mobility.send_operation(MobilityOperation {
            header: MessageHeader::new(self.host_id.clone(), "", platoon_id),
            strategy: MOBILITY_STRATEGY.to_string(),
            params: params.encode(),
        });
    }

    /// A leader whose platoon has emptied after having followers goes back
    /// to standby
    async fn check_dissolution(&self, generation: u64) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        if core.had_followers && self.roster.size() == 1 {
            info!("Last platoon member left; dissolving");
            self.transition_locked(&mut core, PlatoonState::Standby);
        }
    }

    async fn check_waiting_timeout(&self, generation: u64, now: Instant) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        let expired = core.session.as_ref().is_some_and(|s| s.is_expired(now));
        if expired {
            let session = core.session.take();
            if let Some(session) = session {
                info!(
                    "Candidate {} never confirmed within {:.1} s; resuming as leader",
                    session.peer_id, self.cfg.formation.waiting_state_timeout
                );
            }
            self.transition_locked(&mut core, PlatoonState::Leader);
        }
    }

    async fn check_negotiation_timeout(&self, generation: u64, now: Instant) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        let expired = core.session.as_ref().is_some_and(|s| s.is_expired(now));
        if expired {
            if let Some(session) = core.session.take() {
                info!(
                    "No response from {} within {} ms; abandoning join",
                    session.peer_id, NEGOTIATION_TIMEOUT_MS
                );
            }
            self.transition_locked(&mut core, PlatoonState::Standby);
        }
    }

    /// A follower that has lost everyone ahead either takes over leadership
    /// of the remaining rear members or stands down
    async fn check_leader_health(&self, generation: u64) {
        let host_dtd = self.services.route.current_downtrack();
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        if self.roster.vehicles_in_front(host_dtd) > 0 {
            return;
        }
        if self.roster.size() > 1 {
            // Members remain behind the host: take over with a new identity
            let new_id = Uuid::new_v4();
            info!(
                "Predecessors went silent; leading {} remaining members as platoon {new_id}",
                self.roster.size() - 1
            );
            self.roster.set_platoon_id(Some(new_id));
            self.transition_locked(&mut core, PlatoonState::Leader);
            core.had_followers = true;
        } else {
            info!("Platoon front went silent and nobody is behind; standing down");
            self.transition_locked(&mut core, PlatoonState::Standby);
        }
    }

    /// Voluntary departure: stop participating and stand down
    pub async fn leave_platoon(&self) {
        let mut core = self.core.lock().await;
        match core.state {
            PlatoonState::Follower | PlatoonState::Leader => {
                info!("Leaving the platoon voluntarily");
                self.transition_locked(&mut core, PlatoonState::Standby);
            }
            _ => debug!("Leave requested outside an active platoon; ignoring"),
        }
    }
}
