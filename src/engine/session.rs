use std::time::Duration;

use tokio::time::Instant;

use uuid::Uuid;

/// What a negotiation session is trying to achieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Candidate joining an existing platoon at its rear
    JoinAtRear,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::JoinAtRear => write!(f, "join_at_rear"),
        }
    }
}

/// Transient record of an in-flight request/response exchange.
///
/// Destroyed on response, on timeout, or when the owning state exits.
#[derive(Debug, Clone)]
pub struct NegotiationSession {
    pub peer_id: String,
    pub kind: SessionKind,
    pub plan_id: Uuid,
    pub created: Instant,
    pub deadline: Instant,
}

impl NegotiationSession {
    pub fn new(
        peer_id: impl Into<String>,
        kind: SessionKind,
        plan_id: Uuid,
        now: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            kind,
            plan_id,
            created: now,
            deadline: now + timeout,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
