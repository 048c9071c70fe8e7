//! Acknowledgement tracking across lanes.
//!
//! Lanes finish events out of relative global order, so the engine cannot
//! checkpoint the last position it dispatched. This tracker computes the safe
//! lower bound instead: the highest position below everything still in
//! flight. Only ordering of positions is relied on, never gap-freeness.

use roomline_core::stream::GlobalPosition;
use std::collections::BTreeSet;

/// Tracks which dispatched events have been acknowledged by their lane.
///
/// Dispatches arrive in strictly increasing global order (the engine reads
/// the log in order), which is what makes `min(in-flight) - 1` a safe
/// checkpoint: every position below it was dispatched earlier and has
/// already been acknowledged.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    in_flight: BTreeSet<u64>,
    /// Highest acknowledged position, once anything has been acknowledged.
    acknowledged: Option<u64>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `position` was handed to a lane.
    pub fn dispatched(&mut self, position: GlobalPosition) {
        self.in_flight.insert(position.value());
    }

    /// Record that the lane finished every handler for `position`.
    pub fn acknowledged(&mut self, position: GlobalPosition) {
        self.in_flight.remove(&position.value());
        self.acknowledged = self.acknowledged.max(Some(position.value()));
    }

    /// The highest position safe to checkpoint, if any.
    ///
    /// With lanes fully drained this is the highest acknowledged position;
    /// otherwise it is just below the oldest in-flight event. `None` means
    /// nothing can be said yet (nothing acknowledged, or the very first
    /// event is still in flight).
    #[must_use]
    pub fn safe_position(&self) -> Option<GlobalPosition> {
        match self.in_flight.first() {
            None => self.acknowledged.map(GlobalPosition::new),
            Some(&oldest) => oldest.checked_sub(1).map(GlobalPosition::new),
        }
    }

    /// Whether any dispatched event is still unacknowledged.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(value: u64) -> GlobalPosition {
        GlobalPosition::new(value)
    }

    #[test]
    fn nothing_to_say_before_first_ack() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.safe_position(), None);
    }

    #[test]
    fn drained_tracker_reports_high_water() {
        let mut tracker = ProgressTracker::new();
        for p in [3, 5, 9] {
            tracker.dispatched(pos(p));
        }
        for p in [3, 5, 9] {
            tracker.acknowledged(pos(p));
        }
        assert!(tracker.is_drained());
        assert_eq!(tracker.safe_position(), Some(pos(9)));
    }

    #[test]
    fn slow_lane_holds_the_checkpoint_back() {
        let mut tracker = ProgressTracker::new();
        for p in [4, 5, 6, 7] {
            tracker.dispatched(pos(p));
        }
        // 5..=7 finish while 4 is stuck.
        tracker.acknowledged(pos(5));
        tracker.acknowledged(pos(6));
        tracker.acknowledged(pos(7));

        assert_eq!(tracker.safe_position(), Some(pos(3)));

        tracker.acknowledged(pos(4));
        assert_eq!(tracker.safe_position(), Some(pos(7)));
    }

    #[test]
    fn first_event_in_flight_means_no_checkpoint() {
        let mut tracker = ProgressTracker::new();
        tracker.dispatched(pos(0));
        tracker.dispatched(pos(1));
        tracker.acknowledged(pos(1));

        assert_eq!(tracker.safe_position(), None);
    }
}
