//! Hand-rolled recording fakes for the guidance boundary traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use convoy::lightbar::{Indicator, IndicatorStatus, LightBarService};
use convoy::protocol::{MobilityOperation, MobilityRequest, MobilityResponse};
use convoy::services::{
    GuidanceServices, ManeuverInputs, MobilityOutbound, MobilityRouter, RouteService,
    SpeedCommandSink, StatusSink,
};
use convoy::PlatoonStatus;

#[derive(Default)]
pub struct FakeMobility {
    pub requests: Mutex<Vec<MobilityRequest>>,
    pub responses: Mutex<Vec<MobilityResponse>>,
    pub operations: Mutex<Vec<MobilityOperation>>,
}

impl MobilityOutbound for FakeMobility {
    fn send_request(&self, request: MobilityRequest) {
        self.requests.lock().unwrap().push(request);
    }

    fn send_response(&self, response: MobilityResponse) {
        self.responses.lock().unwrap().push(response);
    }

    fn send_operation(&self, operation: MobilityOperation) {
        self.operations.lock().unwrap().push(operation);
    }
}

pub struct FakeRouter {
    pub host_id: String,
    pub capability: Arc<AtomicBool>,
    pub released: AtomicBool,
}

impl FakeRouter {
    pub fn new(host_id: &str) -> Self {
        Self {
            host_id: host_id.to_string(),
            capability: Arc::new(AtomicBool::new(false)),
            released: AtomicBool::new(false),
        }
    }
}

impl MobilityRouter for FakeRouter {
    fn host_mobility_id(&self) -> String {
        self.host_id.clone()
    }

    fn acquire_disable_mobility_path_capability(&self) -> Option<Arc<AtomicBool>> {
        Some(Arc::clone(&self.capability))
    }

    fn release_disable_mobility_path_capability(&self, capability: Arc<AtomicBool>) {
        capability.store(false, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
    }
}

pub struct FakeRoute {
    pub downtrack: Mutex<f64>,
    pub speed_limit: f64,
}

impl FakeRoute {
    pub fn new(downtrack: f64, speed_limit: f64) -> Self {
        Self {
            downtrack: Mutex::new(downtrack),
            speed_limit,
        }
    }
}

impl RouteService for FakeRoute {
    fn current_downtrack(&self) -> f64 {
        *self.downtrack.lock().unwrap()
    }

    fn speed_limit_at(&self, _downtrack: f64) -> f64 {
        self.speed_limit
    }
}

pub struct FakeInputs {
    pub speed: Mutex<f64>,
    pub last_command: Mutex<Option<f64>>,
}

impl FakeInputs {
    pub fn new(speed: f64) -> Self {
        Self {
            speed: Mutex::new(speed),
            last_command: Mutex::new(None),
        }
    }
}

impl ManeuverInputs for FakeInputs {
    fn current_speed(&self) -> f64 {
        *self.speed.lock().unwrap()
    }

    fn last_speed_command(&self) -> Option<f64> {
        *self.last_command.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeSpeedSink {
    pub commands: Mutex<Vec<(f64, f64)>>,
}

impl SpeedCommandSink for FakeSpeedSink {
    fn publish_speed_command(&self, speed: f64, max_accel: f64) {
        self.commands.lock().unwrap().push((speed, max_accel));
    }
}

#[derive(Default)]
pub struct FakeStatusSink {
    pub statuses: Mutex<Vec<PlatoonStatus>>,
}

impl StatusSink for FakeStatusSink {
    fn publish_status(&self, status: PlatoonStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}

#[derive(Default)]
pub struct FakeLightBar {
    pub flashes: Mutex<Vec<IndicatorStatus>>,
    pub released: AtomicBool,
}

impl LightBarService for FakeLightBar {
    fn request_control(
        &self,
        indicators: &[Indicator],
        _owner: &str,
        _on_preempted: Arc<dyn Fn(Indicator) + Send + Sync>,
    ) -> Vec<Indicator> {
        indicators.to_vec()
    }

    fn set_indicator(&self, _indicator: Indicator, status: IndicatorStatus, _owner: &str) {
        self.flashes.lock().unwrap().push(status);
    }

    fn release_control(&self, _indicators: &[Indicator], _owner: &str) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// The full fake harness: every collaborator is recording
pub struct Harness {
    pub mobility: Arc<FakeMobility>,
    pub router: Arc<FakeRouter>,
    pub route: Arc<FakeRoute>,
    pub inputs: Arc<FakeInputs>,
    pub speed_sink: Arc<FakeSpeedSink>,
    pub status_sink: Arc<FakeStatusSink>,
}

impl Harness {
    pub fn new(host_id: &str, downtrack: f64, speed: f64) -> Self {
        Self {
            mobility: Arc::new(FakeMobility::default()),
            router: Arc::new(FakeRouter::new(host_id)),
            route: Arc::new(FakeRoute::new(downtrack, 25.0)),
            inputs: Arc::new(FakeInputs::new(speed)),
            speed_sink: Arc::new(FakeSpeedSink::default()),
            status_sink: Arc::new(FakeStatusSink::default()),
        }
    }

    pub fn services(&self) -> GuidanceServices {
        GuidanceServices {
            mobility: self.mobility.clone(),
            router: self.router.clone(),
            route: self.route.clone(),
            maneuver_inputs: self.inputs.clone(),
            speed_commands: self.speed_sink.clone(),
            status_sink: self.status_sink.clone(),
        }
    }
}
