//! Periodic status summary published for the UI consumer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatoonStateKind {
    /// Engine idle, not platooning
    Disabled,
    /// Host leads a platoon of one and is looking for joiners
    Searching,
    /// Host leads a platoon with at least one follower
    Leading,
    /// Host is accepting a joining candidate at the rear
    ConnectingToNewFollower,
    /// Host has asked to join a platoon and awaits the answer
    ConnectingToNewLeader,
    /// Host follows inside a platoon
    Following,
}

impl PlatoonStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatoonStateKind::Disabled => "DISABLED",
            PlatoonStateKind::Searching => "SEARCHING",
            PlatoonStateKind::Leading => "LEADING",
            PlatoonStateKind::ConnectingToNewFollower => "CONNECTING_TO_NEW_FOLLOWER",
            PlatoonStateKind::ConnectingToNewLeader => "CONNECTING_TO_NEW_LEADER",
            PlatoonStateKind::Following => "FOLLOWING",
        }
    }
}

impl std::fmt::Display for PlatoonStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the platooning module for UI display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatoonStatus {
    pub state: PlatoonStateKind,
    pub platoon_id: Option<Uuid>,
    /// Current platoon size including the host
    pub size: usize,
    /// Configured maximum platoon size
    pub size_limit: usize,
    pub leader_id: String,
    pub leader_downtrack: f64,
    pub leader_cmd_speed: f64,
    /// Host position in the platoon, 0-based from the front
    pub host_position: usize,
    pub host_cmd_speed: f64,
    pub desired_gap: f64,
}

impl PlatoonStatus {
    /// Status reported while the engine is standing by
    pub fn disabled() -> Self {
        Self {
            state: PlatoonStateKind::Disabled,
            platoon_id: None,
            size: 1,
            size_limit: 0,
            leader_id: String::new(),
            leader_downtrack: 0.0,
            leader_cmd_speed: 0.0,
            host_position: 0,
            host_cmd_speed: 0.0,
            desired_gap: 0.0,
        }
    }
}
