//! Light bar arbitration for platooning.
//!
//! The light bar is a shared vehicle resource. Another plugin may preempt
//! our control at any time; when that happens we back off and retry on a
//! fixed cadence, replaying the last indicator state we wanted once control
//! is regained.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::LOOPS_PER_REQUEST;

/// Indicators the platooning plugin uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Yellow,
}

/// Desired state of an indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorStatus {
    Off,
    Flash,
}

/// External light bar manager boundary.
///
/// Not mockable through mockall because of the preemption callback; tests
/// use the scriptable fake below.
pub trait LightBarService: Send + Sync {
    /// Request control of the given indicators for `owner`. Returns the
    /// subset actually granted. `on_preempted` fires later if another
    /// component takes an indicator away.
    fn request_control(
        &self,
        indicators: &[Indicator],
        owner: &str,
        on_preempted: Arc<dyn Fn(Indicator) + Send + Sync>,
    ) -> Vec<Indicator>;

    fn set_indicator(&self, indicator: Indicator, status: IndicatorStatus, owner: &str);

    fn release_control(&self, indicators: &[Indicator], owner: &str);
}

/// Holds the yellow flash while the host is in an active platoon, tolerating
/// preemption by higher-priority components.
pub struct LightBarArbiter {
    service: Arc<dyn LightBarService>,
    owner: String,
    lost_control: Arc<AtomicBool>,
    ticks_until_retry: Arc<AtomicU32>,
    last_attempted: Mutex<IndicatorStatus>,
}

impl LightBarArbiter {
    pub fn new(service: Arc<dyn LightBarService>, owner: impl Into<String>) -> Self {
        Self {
            service,
            owner: owner.into(),
            lost_control: Arc::new(AtomicBool::new(true)),
            ticks_until_retry: Arc::new(AtomicU32::new(0)),
            last_attempted: Mutex::new(IndicatorStatus::Off),
        }
    }

    pub fn has_control(&self) -> bool {
        !self.lost_control.load(Ordering::SeqCst)
    }

    /// Try to take the yellow indicator; on success, replay the last
    /// requested state
    pub fn acquire(&self) {
        let on_preempted: Arc<dyn Fn(Indicator) + Send + Sync> = {
            let lost = Arc::clone(&self.lost_control);
            let retry = Arc::clone(&self.ticks_until_retry);
            Arc::new(move |indicator| {
                warn!("Lost control of light bar indicator {indicator:?}");
                lost.store(true, Ordering::SeqCst);
                retry.store(LOOPS_PER_REQUEST, Ordering::SeqCst);
            })
        };
        let granted =
            self.service
                .request_control(&[Indicator::Yellow], &self.owner, on_preempted);
        if granted.contains(&Indicator::Yellow) {
            let was_lost = self.lost_control.swap(false, Ordering::SeqCst);
            if was_lost {
                info!("Acquired control of the light bar");
            }
            let status = *self
                .last_attempted
                .lock()
                .expect("light bar state lock poisoned");
            self.service.set_indicator(Indicator::Yellow, status, &self.owner);
        } else {
            debug!("Light bar control request denied");
            self.lost_control.store(true, Ordering::SeqCst);
            self.ticks_until_retry
                .store(LOOPS_PER_REQUEST, Ordering::SeqCst);
        }
    }

    /// Set the desired indicator state; remembered for replay if we are
    /// currently preempted
    pub fn set_status(&self, status: IndicatorStatus) {
        {
            let mut last = self
                .last_attempted
                .lock()
                .expect("light bar state lock poisoned");
            *last = status;
        }
        if self.has_control() {
            self.service
                .set_indicator(Indicator::Yellow, status, &self.owner);
        }
    }

    /// Called once per status loop iteration; retries acquisition on a
    /// fixed cadence while preempted
    pub fn tick(&self) {
        if self.has_control() {
            return;
        }
        let remaining = self.ticks_until_retry.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ticks_until_retry.store(remaining - 1, Ordering::SeqCst);
            return;
        }
        self.ticks_until_retry
            .store(LOOPS_PER_REQUEST, Ordering::SeqCst);
        self.acquire();
    }

    /// Turn the indicator off and hand control back
    pub fn shutdown(&self) {
        {
            let mut last = self
                .last_attempted
                .lock()
                .expect("light bar state lock poisoned");
            *last = IndicatorStatus::Off;
        }
        if self.has_control() {
            self.service
                .set_indicator(Indicator::Yellow, IndicatorStatus::Off, &self.owner);
        }
        self.service.release_control(&[Indicator::Yellow], &self.owner);
        self.lost_control.store(true, Ordering::SeqCst);
    }
}
