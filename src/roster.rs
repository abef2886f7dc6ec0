//! Live platoon membership, ordered by downtrack distance.
//!
//! The roster is the only entity mutated from more than one worker (message
//! handling and expiry), so every operation goes through one mutex and
//! readers only ever see a fully applied update.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

/// A peer vehicle currently tracked in the platoon
#[derive(Debug, Clone)]
pub struct PlatoonMember {
    /// Unique static vehicle id
    pub static_id: String,
    /// Position along the route (m)
    pub downtrack: f64,
    /// Measured speed (m/s)
    pub speed: f64,
    /// Speed the member is currently commanded to drive (m/s)
    pub cmd_speed: f64,
    /// When this member was last heard from
    pub last_update: Instant,
}

#[derive(Debug, Default)]
struct RosterInner {
    /// Members sorted by descending downtrack distance (front first).
    /// The host vehicle is not stored here.
    members: Vec<PlatoonMember>,
    platoon_id: Option<Uuid>,
}

/// Synchronized membership roster
#[derive(Debug, Default)]
pub struct Roster {
    inner: Mutex<RosterInner>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a member, keeping front-first ordering.
    ///
    /// Idempotent under repeated identical updates.
    pub fn upsert(
        &self,
        static_id: &str,
        downtrack: f64,
        speed: f64,
        cmd_speed: f64,
        now: Instant,
    ) {
        let mut inner = self.inner.lock().expect("roster lock poisoned");
        match inner.members.iter_mut().find(|m| m.static_id == static_id) {
            Some(member) => {
                member.downtrack = downtrack;
                member.speed = speed;
                member.cmd_speed = cmd_speed;
                member.last_update = now;
            }
            None => {
                debug!("Roster gained member {static_id} at dtd {downtrack:.2}");
                inner.members.push(PlatoonMember {
                    static_id: static_id.to_string(),
                    downtrack,
                    speed,
                    cmd_speed,
                    last_update: now,
                });
            }
        }
        inner
            .members
            .sort_by(|a, b| b.downtrack.total_cmp(&a.downtrack));
    }

    /// Drop members not heard from within `timeout`, returning their ids
    pub fn expire_stale(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut inner = self.inner.lock().expect("roster lock poisoned");
        let mut removed = Vec::new();
        inner.members.retain(|m| {
            let stale = now.duration_since(m.last_update) > timeout;
            if stale {
                removed.push(m.static_id.clone());
            }
            !stale
        });
        for id in &removed {
            info!("Roster member {id} timed out and was removed");
        }
        removed
    }

    /// Frontmost member, or none when the roster is empty (host leads)
    pub fn leader_of(&self) -> Option<PlatoonMember> {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner.members.first().cloned()
    }

    /// Rearmost member, or none when the roster is empty
    pub fn rear_of(&self) -> Option<PlatoonMember> {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner.members.last().cloned()
    }

    /// Nearest member strictly ahead of the given downtrack position
    pub fn predecessor_of(&self, downtrack: f64) -> Option<PlatoonMember> {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner
            .members
            .iter()
            .rev()
            .find(|m| m.downtrack > downtrack)
            .cloned()
    }

    /// 0-based position of a member: the count of members strictly ahead
    pub fn position_of(&self, static_id: &str) -> Option<usize> {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner
            .members
            .iter()
            .position(|m| m.static_id == static_id)
    }

    /// 0-based position the host occupies, given its downtrack distance
    pub fn host_position(&self, downtrack: f64) -> usize {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner
            .members
            .iter()
            .filter(|m| m.downtrack > downtrack)
            .count()
    }

    /// Count of members ahead of the host (alias used by status reporting)
    pub fn vehicles_in_front(&self, host_downtrack: f64) -> usize {
        self.host_position(host_downtrack)
    }

    /// Total platoon size including the host vehicle
    pub fn size(&self) -> usize {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner.members.len() + 1
    }

    /// Consistent copy of the current membership, front first
    pub fn snapshot(&self) -> Vec<PlatoonMember> {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner.members.clone()
    }

    pub fn platoon_id(&self) -> Option<Uuid> {
        let inner = self.inner.lock().expect("roster lock poisoned");
        inner.platoon_id
    }

    pub fn set_platoon_id(&self, id: Option<Uuid>) {
        let mut inner = self.inner.lock().expect("roster lock poisoned");
        inner.platoon_id = id;
    }

    /// Remove everyone and forget the platoon identity
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("roster lock poisoned");
        if !inner.members.is_empty() {
            info!("Roster cleared ({} members dropped)", inner.members.len());
        }
        inner.members.clear();
        inner.platoon_id = None;
    }
}
