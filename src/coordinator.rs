//! Plugin lifecycle and wiring.
//!
//! The coordinator owns the long-lived workers (status loop, gap control,
//! roster expiry), the light bar arbiter and the mobility-path capability
//! token, and forwards guidance callbacks to the negotiation engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::PlatoonConfig;
use crate::control::GapController;
use crate::engine::NegotiationEngine;
use crate::error::{ConvoyError, Result};
use crate::lightbar::{IndicatorStatus, LightBarArbiter, LightBarService};
use crate::protocol::{MobilityOperation, MobilityRequest, MobilityResponse, RequestVerdict};
use crate::roster::Roster;
use crate::services::{GuidanceServices, PlanningOutcome, Trajectory};
use crate::status::PlatoonStateKind;
use crate::STATUS_INTERVAL_LENGTH_MS;

/// Top-level platooning plugin object
pub struct PlatoonCoordinator {
    cfg: Arc<PlatoonConfig>,
    services: GuidanceServices,
    roster: Arc<Roster>,
    engine: Arc<NegotiationEngine>,
    gap_controller: Arc<GapController>,
    lightbar: Arc<LightBarArbiter>,
    /// Capability token held for the lifetime of the plugin; while set, the
    /// router hands platooning traffic to us instead of its generic path
    capability: Mutex<Option<Arc<AtomicBool>>>,
    /// Shutdown senders for the workers started by `resume`
    workers: Mutex<Vec<watch::Sender<bool>>>,
    active: AtomicBool,
}

impl PlatoonCoordinator {
    pub fn new(
        cfg: PlatoonConfig,
        services: GuidanceServices,
        lightbar_service: Arc<dyn LightBarService>,
    ) -> Self {
        let cfg = Arc::new(cfg);
        let roster = Arc::new(Roster::new());
        let engine = NegotiationEngine::new(Arc::clone(&cfg), Arc::clone(&roster), services.clone());
        let gap_controller = Arc::new(GapController::new(
            Arc::clone(&cfg),
            Arc::clone(&roster),
            services.clone(),
        ));
        let owner = engine.host_id().to_string();
        Self {
            cfg,
            services,
            roster,
            engine,
            gap_controller,
            lightbar: Arc::new(LightBarArbiter::new(lightbar_service, owner)),
            capability: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<NegotiationEngine> {
        &self.engine
    }

    pub fn gap_controller(&self) -> &Arc<GapController> {
        &self.gap_controller
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// One-time setup: claim the mobility-path capability token
    pub async fn initialize(&self) -> Result<()> {
        self.cfg.log_loaded();
        let token = self
            .services
            .router
            .acquire_disable_mobility_path_capability()
            .ok_or_else(|| ConvoyError::ComponentFailure {
                component: "mobility_router".to_string(),
                reason: "mobility-path capability unavailable".to_string(),
            })?;
        token.store(true, Ordering::SeqCst);
        *self.capability.lock().await = Some(token);
        info!("Platooning coordinator initialized");
        Ok(())
    }

    /// Engage: start the status loop, gap control and roster expiry workers
    pub async fn resume(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Resume called while already active; ignoring");
            return;
        }
        self.lightbar.acquire();

        let mut workers = self.workers.lock().await;

        let (gap_tx, gap_rx) = watch::channel(false);
        Arc::clone(&self.gap_controller).spawn(gap_rx);
        workers.push(gap_tx);

        let (status_tx, status_rx) = watch::channel(false);
        self.spawn_status_loop(status_rx);
        workers.push(status_tx);

        let (expiry_tx, expiry_rx) = watch::channel(false);
        self.spawn_expiry_loop(expiry_rx);
        workers.push(expiry_tx);

        info!("Platooning coordinator resumed");
    }

    /// Disengage: stop workers, stand the engine down, give the light bar back
    pub async fn suspend(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        for tx in self.workers.lock().await.drain(..) {
            let _ = tx.send(true);
        }
        self.engine.suspend().await;
        self.lightbar.shutdown();
        info!("Platooning coordinator suspended");
    }

    /// Final teardown: release the capability token
    pub async fn terminate(&self) {
        self.suspend().await;
        if let Some(token) = self.capability.lock().await.take() {
            token.store(false, Ordering::SeqCst);
            self.services
                .router
                .release_disable_mobility_path_capability(token);
        }
        info!("Platooning coordinator terminated");
    }

    // ------------------------------------------------------------------
    // Guidance callbacks
    // ------------------------------------------------------------------

    /// Inbound negotiation request; answers on the wire when a verdict
    /// warrants one
    pub async fn handle_mobility_request(&self, msg: MobilityRequest) -> RequestVerdict {
        if !self.is_active() {
            return RequestVerdict::NoResponse;
        }
        let verdict = self.engine.handle_request(&msg).await;
        match verdict {
            RequestVerdict::Ack | RequestVerdict::Nack => {
                self.services.mobility.send_response(MobilityResponse {
                    header: crate::protocol::MessageHeader::new(
                        self.engine.host_id().to_string(),
                        msg.header.sender_id,
                        msg.header.plan_id,
                    ),
                    is_accepted: verdict == RequestVerdict::Ack,
                });
            }
            RequestVerdict::NoResponse => {}
        }
        verdict
    }

    pub async fn handle_mobility_response(&self, msg: MobilityResponse) {
        if self.is_active() {
            self.engine.handle_response(&msg).await;
        }
    }

    pub async fn handle_mobility_operation(&self, msg: MobilityOperation) {
        if self.is_active() {
            self.engine.handle_operation(&msg).await;
        }
    }

    pub async fn plan_trajectory(
        &self,
        trajectory: Trajectory,
        expected_entry_speed: f64,
    ) -> PlanningOutcome {
        if !self.is_active() {
            return PlanningOutcome::Unchanged;
        }
        self.engine
            .plan_trajectory(trajectory, expected_entry_speed)
            .await
    }

    pub async fn leave_platoon(&self) {
        if self.is_active() {
            self.engine.leave_platoon().await;
        } else {
            warn!("Leave requested while inactive; ignoring");
        }
    }

    // ------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------

    fn spawn_status_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let engine = Arc::clone(&self.engine);
        let gap_controller = Arc::clone(&self.gap_controller);
        let lightbar = Arc::clone(&self.lightbar);
        let status_sink = Arc::clone(&self.services.status_sink);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(STATUS_INTERVAL_LENGTH_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!("Status loop stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let status = engine.status(gap_controller.desired_gap()).await;
                        lightbar.tick();
                        let indicator = match status.state {
                            PlatoonStateKind::Disabled | PlatoonStateKind::Searching => {
                                IndicatorStatus::Off
                            }
                            _ => IndicatorStatus::Flash,
                        };
                        lightbar.set_status(indicator);
                        status_sink.publish_status(status);
                    }
                }
            }
        });
    }

    fn spawn_expiry_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let gap_controller = Arc::clone(&self.gap_controller);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(STATUS_INTERVAL_LENGTH_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!("Roster expiry loop stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        gap_controller.expire_roster(std::time::Instant::now());
                    }
                }
            }
        });
    }
}
