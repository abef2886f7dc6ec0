use uuid::Uuid;

use crate::status::PlatoonStateKind;

/// Closed set of negotiation states.
///
/// Each variant owns at most one periodic duty worker while active; the
/// engine replaces the worker atomically with the state itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatoonState {
    /// No platoon; idle, listening
    Standby,
    /// Host is the platoon front and broadcasts INFO
    Leader,
    /// Host is negotiating acceptance of one joining candidate at the rear
    LeaderWaiting { candidate_id: String },
    /// Host has sent a join request to a target leader and awaits the answer
    CandidateFollower {
        target_leader_id: String,
        /// Platoon id learned from the target leader's INFO broadcast
        platoon_id: Uuid,
    },
    /// Host is a platoon member behind the front
    Follower,
}

impl PlatoonState {
    pub fn name(&self) -> &'static str {
        match self {
            PlatoonState::Standby => "STANDBY",
            PlatoonState::Leader => "LEADER",
            PlatoonState::LeaderWaiting { .. } => "LEADER_WAITING",
            PlatoonState::CandidateFollower { .. } => "CANDIDATE_FOLLOWER",
            PlatoonState::Follower => "FOLLOWER",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: &PlatoonState) -> bool {
        use PlatoonState::*;

        match (self, target) {
            // From Standby
            (Standby, Leader) => true,               // activated, searching
            (Standby, LeaderWaiting { .. }) => true, // join request observed
            (Standby, CandidateFollower { .. }) => true, // leader discovered

            // From Leader
            (Leader, LeaderWaiting { .. }) => true, // join request accepted
            (Leader, Standby) => true,              // last member left

            // From LeaderWaiting
            (LeaderWaiting { .. }, Leader) => true, // confirmed or timed out

            // From CandidateFollower
            (CandidateFollower { .. }, Follower) => true, // join accepted
            (CandidateFollower { .. }, Standby) => true,  // rejected or timed out

            // From Follower
            (Follower, Standby) => true, // leader lost, nobody behind
            (Follower, Leader) => true,  // leader lost, host takes over

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Externally visible state, given the current platoon size
    pub fn kind(&self, platoon_size: usize) -> PlatoonStateKind {
        match self {
            PlatoonState::Standby => PlatoonStateKind::Disabled,
            PlatoonState::Leader => {
                if platoon_size == 1 {
                    PlatoonStateKind::Searching
                } else {
                    PlatoonStateKind::Leading
                }
            }
            PlatoonState::LeaderWaiting { .. } => PlatoonStateKind::ConnectingToNewFollower,
            PlatoonState::CandidateFollower { .. } => PlatoonStateKind::ConnectingToNewLeader,
            PlatoonState::Follower => PlatoonStateKind::Following,
        }
    }
}

impl std::fmt::Display for PlatoonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
