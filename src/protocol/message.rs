use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strategy identifier distinguishing platooning traffic from unrelated
/// mobility messages at the router.
pub const MOBILITY_STRATEGY: &str = "Carma/Platooning";

/// Common header carried by every mobility message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Static id of the sending vehicle
    pub sender_id: String,
    /// Static id of the intended recipient; empty string means broadcast
    pub recipient_id: String,
    /// Plan id of the exchange; doubles as the platoon id once formed
    pub plan_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl MessageHeader {
    pub fn new(sender_id: impl Into<String>, recipient_id: impl Into<String>, plan_id: Uuid) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            plan_id,
            timestamp: Utc::now(),
        }
    }

    /// True when the message is addressed to everyone
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id.is_empty()
    }
}

/// Kinds of negotiation a mobility request can open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    /// Candidate asks to join an existing platoon at its rear
    JoinPlatoonAtRear,
}

/// A negotiation request from a peer vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobilityRequest {
    pub header: MessageHeader,
    pub strategy: String,
    pub plan_type: PlanType,
    /// Text-encoded request parameters (see [`crate::protocol::codec`])
    pub params: String,
}

/// Answer to a previously sent request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobilityResponse {
    pub header: MessageHeader,
    pub is_accepted: bool,
}

/// A periodic operational broadcast (INFO or STATUS payload)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobilityOperation {
    pub header: MessageHeader,
    pub strategy: String,
    /// Text-encoded operation payload (see [`crate::protocol::codec`])
    pub params: String,
}

/// Verdict returned to the router for an inbound request.
///
/// The router owns the wire-level response; the engine only decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVerdict {
    Ack,
    Nack,
    NoResponse,
}

impl std::fmt::Display for RequestVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestVerdict::Ack => write!(f, "ack"),
            RequestVerdict::Nack => write!(f, "nack"),
            RequestVerdict::NoResponse => write!(f, "no_response"),
        }
    }
}
