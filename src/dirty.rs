//! Dirty tracking.

use crate::entity::EntityId;
use std::collections::HashSet;
use std::mem;

/// The set of entities touched since the last reconciliation tick.
///
/// Starts out as [`DirtySet::All`] so that the first tick paints everything.
#[derive(Debug, Clone)]
pub enum DirtySet {
    /// Everything needs updating.
    All,
    /// Only these identities, in the order they were first marked.
    Tracking {
        order: Vec<EntityId>,
        members: HashSet<EntityId>,
    },
}

/// The result of draining a dirty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drained {
    All,
    Ids(Vec<EntityId>),
}

impl Default for DirtySet {
    fn default() -> Self {
        DirtySet::All
    }
}

impl DirtySet {
    pub fn new() -> DirtySet {
        DirtySet::default()
    }

    fn empty() -> DirtySet {
        DirtySet::Tracking {
            order: Vec::new(),
            members: HashSet::new(),
        }
    }

    pub fn mark(&mut self, id: &EntityId) {
        match self {
            DirtySet::All => (),
            DirtySet::Tracking { order, members } => {
                if members.insert(id.clone()) {
                    order.push(id.clone());
                }
            }
        }
    }

    pub fn mark_all(&mut self) {
        *self = DirtySet::All;
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        match self {
            DirtySet::All => true,
            DirtySet::Tracking { members, .. } => members.contains(id),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DirtySet::All => false,
            DirtySet::Tracking { order, .. } => order.is_empty(),
        }
    }

    /// Swaps in an empty set and returns what was marked. `full` forces [`Drained::All`].
    pub fn drain(&mut self, full: bool) -> Drained {
        match mem::replace(self, DirtySet::empty()) {
            DirtySet::All => Drained::All,
            _ if full => Drained::All,
            DirtySet::Tracking { order, .. } => Drained::Ids(order),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_as_all() {
        let mut set = DirtySet::new();
        set.mark(&EntityId::from("0001"));
        assert_eq!(set.drain(false), Drained::All);
        assert!(set.is_empty());
    }

    #[test]
    fn drain_keeps_first_mark_order() {
        let mut set = DirtySet::new();
        set.drain(false);

        set.mark(&EntityId::from("0003"));
        set.mark(&EntityId::from("0001"));
        set.mark(&EntityId::from("0003"));
        assert!(set.contains(&EntityId::from("0001")));
        assert_eq!(
            set.drain(false),
            Drained::Ids(vec![EntityId::from("0003"), EntityId::from("0001")])
        );
        assert_eq!(set.drain(false), Drained::Ids(Vec::new()));
    }

    #[test]
    fn full_refresh_overrides() {
        let mut set = DirtySet::new();
        set.drain(false);
        set.mark(&EntityId::from("0002"));
        assert_eq!(set.drain(true), Drained::All);
    }
}
