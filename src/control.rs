//! Gap regulation: a PID loop producing a bounded speed command that holds
//! the configured headway to the vehicle in front.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::PlatoonConfig;
use crate::roster::{PlatoonMember, Roster};
use crate::services::GuidanceServices;

/// A PID controller over the gap error
#[derive(Debug, Clone)]
pub struct PidController {
    k_p: f64,
    k_i: f64,
    k_d: f64,
    integral: f64,
    prev_error: Option<f64>,
}

impl PidController {
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral: 0.0,
            prev_error: None,
        }
    }

    /// Advance the controller by one step of `dt` seconds.
    ///
    /// The first step after a reset has no derivative contribution; feeding
    /// a synthetic one would spike the output relative to steady operation.
    pub fn step(&mut self, error: f64, dt: f64) -> f64 {
        self.integral += error * dt;
        let deriv = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);
        self.k_p * error + self.k_i * self.integral + self.k_d * deriv
    }

    /// Clear accumulated state, e.g. when the reference vehicle changes
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }
}

/// Mutable per-cycle control state, owned exclusively by the controller
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    pub desired_gap: f64,
    pub actual_gap: f64,
    /// Adjustment applied on top of the reference commanded speed (m/s)
    pub last_adjustment: f64,
    /// Final published command (m/s)
    pub last_command: f64,
    /// Whether the APF fallback currently tracks the immediate predecessor
    pub following_predecessor: bool,
    /// Reference vehicle of the previous cycle, for PID reset detection
    reference_id: Option<String>,
}

/// Periodic gap controller
pub struct GapController {
    cfg: Arc<PlatoonConfig>,
    roster: Arc<Roster>,
    services: GuidanceServices,
    pid: Mutex<PidController>,
    state: Mutex<ControlState>,
}

impl GapController {
    pub fn new(cfg: Arc<PlatoonConfig>, roster: Arc<Roster>, services: GuidanceServices) -> Self {
        let pid = PidController::new(cfg.control.kp, cfg.control.ki, cfg.control.kd);
        Self {
            cfg,
            roster,
            services,
            pid: Mutex::new(pid),
            state: Mutex::new(ControlState::default()),
        }
    }

    /// Desired gap computed on the most recent cycle (m)
    pub fn desired_gap(&self) -> f64 {
        self.state.lock().expect("control state lock").desired_gap
    }

    /// Snapshot of the most recent cycle
    pub fn control_state(&self) -> ControlState {
        self.state.lock().expect("control state lock").clone()
    }

    /// Run one control cycle and publish the resulting command
    pub fn run_cycle(&self) {
        let host_dtd = self.services.route.current_downtrack();
        let host_speed = self.services.maneuver_inputs.current_speed();
        let dt = self.cfg.control.control_period_ms as f64 / 1000.0;

        let desired_gap = self.cfg.formation.stand_still_headway
            + self.cfg.formation.time_headway * host_speed;

        let reference = self.select_reference(host_dtd, host_speed);
        let Some(reference) = reference else {
            // Host is the front of the line (or alone): follow the route
            // speed limit instead of a gap target.
            let limit = self.services.route.speed_limit_at(host_dtd);
            let mut state = self.state.lock().expect("control state lock");
            state.desired_gap = desired_gap;
            state.actual_gap = 0.0;
            state.last_adjustment = 0.0;
            state.last_command = limit;
            state.reference_id = None;
            drop(state);
            self.pid.lock().expect("pid lock").reset();
            self.services
                .speed_commands
                .publish_speed_command(limit, self.cfg.control.max_accel);
            trace!("No reference vehicle; commanding route speed limit {limit:.2}");
            return;
        };

        let actual_gap = reference.downtrack - host_dtd;
        let error = desired_gap - actual_gap;

        {
            let state = self.state.lock().expect("control state lock");
            if state.reference_id.as_deref() != Some(reference.static_id.as_str()) {
                drop(state);
                self.pid.lock().expect("pid lock").reset();
                debug!("Gap reference switched to {}", reference.static_id);
            }
        }

        let output = self.pid.lock().expect("pid lock").step(error, dt);
        // Positive error means the host is too close; the adjustment must
        // slow the host relative to the reference command.
        let adjustment = -output;
        let base = reference.cmd_speed;
        let mut command = base + adjustment;

        if self.cfg.caps.speed_limit_cap {
            let limit = self.services.route.speed_limit_at(host_dtd);
            command = command.min(limit);
        }
        if self.cfg.caps.max_accel_cap {
            let delta = self.cfg.control.max_accel * dt;
            command = command.clamp(host_speed - delta, host_speed + delta);
        }
        if self.cfg.caps.leader_speed_cap {
            let max_adj = self.cfg.control.cmd_speed_max_adjustment;
            command = command.clamp(base - max_adj, base + max_adj);
        }
        if self.cfg.caps.speed_limit_cap {
            // The clamps above have lower bounds that can raise a capped
            // command back over the limit; the limit always wins
            command = command.min(self.services.route.speed_limit_at(host_dtd));
        }
        command = command.max(0.0);

        {
            let mut state = self.state.lock().expect("control state lock");
            state.desired_gap = desired_gap;
            state.actual_gap = actual_gap;
            state.last_adjustment = adjustment;
            state.last_command = command;
            state.reference_id = Some(reference.static_id.clone());
        }

        self.services
            .speed_commands
            .publish_speed_command(command, self.cfg.control.max_accel);
        trace!(
            "Gap cycle: desired {desired_gap:.2} actual {actual_gap:.2} adj {adjustment:.2} cmd {command:.2}"
        );
    }

    /// Pick the vehicle whose commanded speed anchors the control output.
    ///
    /// Variant 0 tracks the frontmost leader but falls back to the immediate
    /// predecessor while the spacing to the leader is beyond the configured
    /// boundaries; variant 1 always tracks the immediate predecessor.
    fn select_reference(&self, host_dtd: f64, host_speed: f64) -> Option<PlatoonMember> {
        let sel = &self.cfg.leader_selection;
        if sel.algorithm_variant == 1 {
            return self.roster.predecessor_of(host_dtd);
        }

        let leader = self.roster.leader_of()?;
        let gap = leader.downtrack - host_dtd;
        let time_gap = if host_speed > 0.1 { gap / host_speed } else { f64::INFINITY };

        // Time gap to the vehicle immediately ahead; infinity when the
        // leader itself is the predecessor or the host is stopped.
        let predecessor_time_gap = self
            .roster
            .predecessor_of(host_dtd)
            .filter(|p| p.static_id != leader.static_id)
            .map_or(f64::INFINITY, |p| {
                if host_speed > 0.1 {
                    (p.downtrack - host_dtd) / host_speed
                } else {
                    f64::INFINITY
                }
            });

        let mut state = self.state.lock().expect("control state lock");
        if state.following_predecessor {
            // Restoring leader-following requires both recovered leader
            // spacing and breathing room to the immediate predecessor.
            if time_gap < sel.min_spacing
                && gap < sel.min_gap
                && predecessor_time_gap > sel.upper_boundary
            {
                state.following_predecessor = false;
                debug!("Spacing recovered; resuming leader-following");
            }
        } else if time_gap > sel.max_spacing
            || gap > sel.max_gap
            || predecessor_time_gap < sel.lower_boundary
        {
            state.following_predecessor = true;
            debug!(
                "Spacing out of bounds (leader gap {gap:.2} m, {time_gap:.2} s, \
                 predecessor {predecessor_time_gap:.2} s); following immediate predecessor"
            );
        }
        let fallback = state.following_predecessor;
        drop(state);

        if fallback {
            self.roster.predecessor_of(host_dtd).or(Some(leader))
        } else {
            Some(leader)
        }
    }

    /// Spawn the fixed-period control worker
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = std::time::Duration::from_millis(self.cfg.control.control_period_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!("Gap control worker stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        self.run_cycle();
                    }
                }
            }
        })
    }

    /// Expire stale roster members once; called on the control cadence
    pub fn expire_roster(&self, now: Instant) {
        self.roster.expire_stale(now, self.cfg.status_timeout());
    }
}
