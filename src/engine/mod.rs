//! Negotiation state machine: the central authority for platoon formation,
//! membership and dissolution.

pub mod engine;
pub mod session;
pub mod state;

pub use engine::NegotiationEngine;
pub use session::{NegotiationSession, SessionKind};
pub use state::PlatoonState;
