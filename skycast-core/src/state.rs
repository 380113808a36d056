use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::Location;

/// Independently tracked branch of an update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Conditions,
    Hourly,
}

/// Process-wide session state of the update pipeline.
///
/// Each slot counts its launched branches that have not resolved yet, so
/// overlapping cycles keep the slot busy until the last one finishes.
#[derive(Debug, Clone, Default)]
pub struct UpdateState {
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_fetch_location: Option<Location>,
    conditions_in_flight: u32,
    hourly_in_flight: u32,
}

impl UpdateState {
    pub fn in_progress(&self) -> bool {
        self.conditions_in_flight > 0 || self.hourly_in_flight > 0
    }

    pub fn slot_in_progress(&self, slot: Slot) -> bool {
        self.in_flight(slot) > 0
    }

    /// Record the start of a cycle that launches `slots`.
    pub fn begin(&mut self, now: DateTime<Utc>, location: Location, slots: &[Slot]) {
        self.last_attempt_at = Some(now);
        self.last_fetch_location = Some(location);
        for slot in slots {
            let count = self.counter_mut(*slot);
            *count = count.saturating_add(1);
        }
    }

    /// Mark one branch as resolved.
    pub fn finish(&mut self, slot: Slot) {
        let count = self.counter_mut(slot);
        *count = count.saturating_sub(1);
    }

    fn in_flight(&self, slot: Slot) -> u32 {
        match slot {
            Slot::Conditions => self.conditions_in_flight,
            Slot::Hourly => self.hourly_in_flight,
        }
    }

    fn counter_mut(&mut self, slot: Slot) -> &mut u32 {
        match slot {
            Slot::Conditions => &mut self.conditions_in_flight,
            Slot::Hourly => &mut self.hourly_in_flight,
        }
    }
}

/// Handle shared between the orchestrator and its in-flight branches.
pub type SharedState = Arc<Mutex<UpdateState>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_idle() {
        let state = UpdateState::default();
        assert!(!state.in_progress());
        assert!(state.last_attempt_at.is_none());
        assert!(state.last_fetch_location.is_none());
    }

    #[test]
    fn in_progress_until_every_branch_finishes() {
        let mut state = UpdateState::default();
        let now = Utc::now();
        state.begin(now, Location::new(1.0, 2.0), &[Slot::Conditions, Slot::Hourly]);

        assert!(state.in_progress());
        assert_eq!(state.last_attempt_at, Some(now));

        state.finish(Slot::Hourly);
        assert!(state.in_progress());
        assert!(state.slot_in_progress(Slot::Conditions));

        state.finish(Slot::Conditions);
        assert!(!state.in_progress());
    }

    #[test]
    fn overlapping_cycles_stay_in_progress_until_the_last_resolves() {
        let mut state = UpdateState::default();
        let now = Utc::now();
        state.begin(now, Location::new(42.0, -93.6), &[Slot::Conditions]);
        state.begin(now, Location::new(42.02, -93.6), &[Slot::Conditions]);

        state.finish(Slot::Conditions);
        assert!(state.in_progress());
        assert!(state.slot_in_progress(Slot::Conditions));

        state.finish(Slot::Conditions);
        assert!(!state.in_progress());
    }

    #[test]
    fn finishing_twice_is_harmless() {
        let mut state = UpdateState::default();
        state.begin(Utc::now(), Location::new(0.0, 0.0), &[Slot::Conditions]);
        state.finish(Slot::Conditions);
        state.finish(Slot::Conditions);
        assert!(!state.in_progress());
    }
}
