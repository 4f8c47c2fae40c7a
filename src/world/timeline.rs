//! Deterministic future-message queue.

use crate::entity::{EntityId, HandlerSpec};
use serde_json::Value;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A call scheduled for a logical time.
#[derive(Debug, Clone)]
pub(crate) struct Scheduled {
    pub(crate) time: u64,
    seq: u64,
    pub(crate) target: EntityId,
    pub(crate) spec: HandlerSpec,
    pub(crate) args: Vec<Value>,
}

// ordered by (time, seq) only; the payload never takes part
impl PartialEq for Scheduled {
    fn eq(&self, other: &Scheduled) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Scheduled) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Scheduled) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Logical clock plus the queue of calls waiting for it.
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    now: u64,
    seq: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,
}

impl Timeline {
    pub(crate) fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn schedule(&mut self, delay: u64, target: EntityId, spec: HandlerSpec, args: Vec<Value>) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            time: self.now.saturating_add(delay),
            seq,
            target,
            spec,
            args,
        }));
    }

    /// Pops the next call due at or before `time`, moving the clock to its time.
    pub(crate) fn pop_due(&mut self, time: u64) -> Option<Scheduled> {
        match self.queue.peek() {
            Some(Reverse(next)) if next.time <= time => (),
            _ => return None,
        }
        let Reverse(next) = self.queue.pop()?;
        self.now = self.now.max(next.time);
        Some(next)
    }

    /// Moves the clock forward; it never goes back.
    pub(crate) fn set_now(&mut self, time: u64) {
        self.now = self.now.max(time);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str) -> HandlerSpec {
        HandlerSpec::new(Some("T"), name)
    }

    #[test]
    fn pops_in_time_then_schedule_order() {
        let mut timeline = Timeline::default();
        let target = EntityId::from("0002");
        timeline.schedule(20, target.clone(), op("late"), vec![]);
        timeline.schedule(10, target.clone(), op("first"), vec![]);
        timeline.schedule(10, target.clone(), op("second"), vec![]);

        assert!(timeline.pop_due(5).is_none());
        let order: Vec<_> = std::iter::from_fn(|| timeline.pop_due(15))
            .map(|s| s.spec.operation)
            .collect();
        assert_eq!(order, vec!["first", "second"]);
        assert_eq!(timeline.now(), 10);
        assert_eq!(timeline.len(), 1);

        timeline.set_now(15);
        timeline.schedule(0, target, op("now"), vec![]);
        assert_eq!(timeline.pop_due(15).map(|s| s.time), Some(15));
    }
}
