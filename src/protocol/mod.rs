//! Inter-vehicle mobility protocol: message envelopes and the text wire
//! format used for platoon negotiation and operation.

pub mod codec;
pub mod message;

pub use codec::{InfoParams, JoinRequestParams, OperationPayload, StatusParams};
pub use message::{
    MessageHeader, MobilityOperation, MobilityRequest, MobilityResponse, PlanType, RequestVerdict,
    MOBILITY_STRATEGY,
};
