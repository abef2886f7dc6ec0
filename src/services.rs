//! Boundary traits for the external guidance collaborators.
//!
//! The engine never reaches into an ambient service locator; everything it
//! talks to arrives through this bundle at construction time.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::protocol::{MobilityOperation, MobilityRequest, MobilityResponse};
use crate::status::PlatoonStatus;

/// A trajectory window handed to the engine for planning
#[derive(Debug, Clone, Copy)]
pub struct Trajectory {
    pub start_downtrack: f64,
    pub end_downtrack: f64,
}

impl Trajectory {
    pub fn length(&self) -> f64 {
        self.end_downtrack - self.start_downtrack
    }
}

/// What the engine asks the external maneuver planner to do with a trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanningOutcome {
    /// No platooning-specific maneuver needed
    Unchanged,
    /// Hold a steady speed over the given window (negotiating or following)
    SteadySpeed {
        speed: f64,
        start_downtrack: f64,
        end_downtrack: f64,
    },
}

/// Outbound half of the best-effort mobility channel. Sends are
/// fire-and-forget; delivery is never guaranteed.
#[cfg_attr(test, mockall::automock)]
pub trait MobilityOutbound: Send + Sync {
    fn send_request(&self, request: MobilityRequest);
    fn send_response(&self, response: MobilityResponse);
    fn send_operation(&self, operation: MobilityOperation);
}

/// Router-side services: host identity and the mobility-path capability
/// token. While the token is set, the router forwards platoon-relevant
/// messages here instead of processing them generically.
#[cfg_attr(test, mockall::automock)]
pub trait MobilityRouter: Send + Sync {
    fn host_mobility_id(&self) -> String;
    fn acquire_disable_mobility_path_capability(&self) -> Option<Arc<AtomicBool>>;
    fn release_disable_mobility_path_capability(&self, capability: Arc<AtomicBool>);
}

/// Route geometry and limits
#[cfg_attr(test, mockall::automock)]
pub trait RouteService: Send + Sync {
    /// Host position along the route (m)
    fn current_downtrack(&self) -> f64;
    /// Regulatory speed limit at a route position (m/s)
    fn speed_limit_at(&self, downtrack: f64) -> f64;
}

/// Host vehicle telemetry from the maneuver-input side
#[cfg_attr(test, mockall::automock)]
pub trait ManeuverInputs: Send + Sync {
    /// Current measured speed (m/s)
    fn current_speed(&self) -> f64;
    /// Last speed command acknowledged by the controller, if any
    fn last_speed_command(&self) -> Option<f64>;
}

/// Actuation channel for the gap controller's speed command
#[cfg_attr(test, mockall::automock)]
pub trait SpeedCommandSink: Send + Sync {
    fn publish_speed_command(&self, speed: f64, max_accel: f64);
}

/// Consumer of the periodic status summary (UI side)
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    fn publish_status(&self, status: PlatoonStatus);
}

/// Dependency bundle injected into the coordinator and engine
#[derive(Clone)]
pub struct GuidanceServices {
    pub mobility: Arc<dyn MobilityOutbound>,
    pub router: Arc<dyn MobilityRouter>,
    pub route: Arc<dyn RouteService>,
    pub maneuver_inputs: Arc<dyn ManeuverInputs>,
    pub speed_commands: Arc<dyn SpeedCommandSink>,
    pub status_sink: Arc<dyn StatusSink>,
}

impl GuidanceServices {
    /// Host speed-command feedback, defaulting to 0.0 when absent
    pub fn last_speed_command_or_zero(&self) -> f64 {
        self.maneuver_inputs.last_speed_command().unwrap_or(0.0)
    }
}
