//! Cooperative platoon coordination for an AV guidance stack.
//!
//! The crate implements the guidance-plugin side of rear-join platooning: a
//! negotiation state machine ([`engine::NegotiationEngine`]), a synchronized
//! membership roster ([`roster::Roster`]), a PID gap controller
//! ([`control::GapController`]) and the lifecycle wiring that binds them to
//! the surrounding stack ([`coordinator::PlatoonCoordinator`]).
//!
//! All inter-vehicle traffic uses the text mobility payloads in
//! [`protocol`]; peers running the original strategy remain interoperable.

pub mod config;
pub mod control;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod lightbar;
pub mod protocol;
pub mod roster;
pub mod services;
pub mod status;
pub mod telemetry;

pub use config::PlatoonConfig;
pub use coordinator::PlatoonCoordinator;
pub use engine::{NegotiationEngine, PlatoonState};
pub use error::{ConvoyError, Result};
pub use services::{GuidanceServices, PlanningOutcome, Trajectory};
pub use status::{PlatoonStateKind, PlatoonStatus};

/// Period of the STATUS broadcast and the coordinator's fast loops (ms)
pub const STATUS_INTERVAL_LENGTH_MS: u64 = 100;

/// Period of the leader INFO broadcast (ms)
pub const INFO_INTERVAL_LENGTH_MS: u64 = 3000;

/// How long a candidate waits for a negotiation answer (ms)
pub const NEGOTIATION_TIMEOUT_MS: u64 = 5000;

/// Status-loop iterations between light bar control retries
pub const LOOPS_PER_REQUEST: u32 = 10;
