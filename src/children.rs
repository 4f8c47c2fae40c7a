//! Child-list reconciliation.
//!
//! Walks the rendered child keys and the target keys with two cursors and produces inserts and
//! removals that turn one into the other. Reorders that cannot be expressed as "insert the
//! missing keys in front of the next rendered one" fall back to rebuilding the whole list. This
//! is a bounded best-effort matcher, not a minimal edit script.

use crate::entity::EntityId;
use crate::error::ReconcileError;
use std::collections::{HashMap, HashSet};

/// One incremental step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildOp {
    /// Insert `key` in front of `before`, or at the end.
    Insert {
        key: EntityId,
        before: Option<EntityId>,
    },
    /// Remove `key`.
    Remove(EntityId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Apply these in order.
    Incremental(Vec<ChildOp>),
    /// Remove every rendered child and insert the target in order.
    Rebuild,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Plan::Incremental(ops) if ops.is_empty())
    }
}

/// Plans the transformation of `existing` into `target`.
///
/// Duplicate keys in `target` are rejected. Duplicates in `existing` force a rebuild.
pub fn plan(existing: &[EntityId], target: &[EntityId]) -> Result<Plan, ReconcileError> {
    let mut target_pos = HashMap::with_capacity(target.len());
    for (index, key) in target.iter().enumerate() {
        if target_pos.insert(key, index).is_some() {
            return Err(ReconcileError::DuplicateKey(key.clone()));
        }
    }

    let mut existing_set = HashSet::with_capacity(existing.len());
    for key in existing {
        if !existing_set.insert(key) {
            tracing::debug!(key = %key, "duplicate rendered child, rebuilding");
            return Ok(Plan::Rebuild);
        }
    }

    let mut ops = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < existing.len() {
        let key = &existing[i];
        if target.get(j) == Some(key) {
            i += 1;
            j += 1;
            continue;
        }
        match target_pos.get(key) {
            Some(&p) if p >= j => {
                // everything up to the rendered key's new position goes in front of it
                for missing in &target[j..p] {
                    if existing_set.contains(missing) {
                        tracing::debug!(key = %missing, "non-monotonic reorder, rebuilding");
                        return Ok(Plan::Rebuild);
                    }
                    ops.push(ChildOp::Insert {
                        key: missing.clone(),
                        before: Some(key.clone()),
                    });
                }
                i += 1;
                j = p + 1;
            }
            Some(_) => {
                tracing::debug!(key = %key, "key outran by a later one, rebuilding");
                return Ok(Plan::Rebuild);
            }
            None => {
                ops.push(ChildOp::Remove(key.clone()));
                i += 1;
            }
        }
    }

    for missing in &target[j.min(target.len())..] {
        if existing_set.contains(missing) {
            return Ok(Plan::Rebuild);
        }
        ops.push(ChildOp::Insert {
            key: missing.clone(),
            before: None,
        });
    }

    Ok(Plan::Incremental(ops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn keys(names: &[&str]) -> Vec<EntityId> {
        names.iter().map(|n| EntityId::from(*n)).collect()
    }

    /// Applies a plan, asserting no intermediate state holds a key twice.
    fn apply(existing: &[EntityId], target: &[EntityId], plan: &Plan) -> Vec<EntityId> {
        match plan {
            Plan::Rebuild => target.to_vec(),
            Plan::Incremental(ops) => {
                let mut list = existing.to_vec();
                for op in ops {
                    match op {
                        ChildOp::Insert { key, before } => {
                            assert!(!list.contains(key), "{} inserted twice", key);
                            let index = match before {
                                Some(before) => list.iter().position(|k| k == before).unwrap(),
                                None => list.len(),
                            };
                            list.insert(index, key.clone());
                        }
                        ChildOp::Remove(key) => {
                            let index = list.iter().position(|k| k == key).unwrap();
                            list.remove(index);
                        }
                    }
                }
                list
            }
        }
    }

    #[test]
    fn pure_append() {
        let plan = plan(&keys(&["b"]), &keys(&["b", "c"])).unwrap();
        assert_eq!(
            plan,
            Plan::Incremental(vec![ChildOp::Insert {
                key: "c".into(),
                before: None
            }])
        );
    }

    #[test]
    fn swap_rebuilds() {
        let existing = keys(&["b", "c", "d"]);
        let target = keys(&["c", "b", "d"]);
        let plan = plan(&existing, &target).unwrap();
        assert_eq!(plan, Plan::Rebuild);
        assert_eq!(apply(&existing, &target, &plan), target);
    }

    #[test]
    fn single_removal_is_incremental() {
        let plan = plan(&keys(&["b", "c", "d"]), &keys(&["b", "d"])).unwrap();
        assert_eq!(plan, Plan::Incremental(vec![ChildOp::Remove("c".into())]));
    }

    #[test]
    fn insert_in_the_middle() {
        let plan = plan(&keys(&["a", "c"]), &keys(&["a", "b", "c"])).unwrap();
        assert_eq!(
            plan,
            Plan::Incremental(vec![ChildOp::Insert {
                key: "b".into(),
                before: Some("c".into())
            }])
        );
    }

    #[test]
    fn duplicates() {
        assert_eq!(
            plan(&keys(&["a"]), &keys(&["a", "b", "a"])),
            Err(ReconcileError::DuplicateKey("a".into()))
        );
        assert_eq!(plan(&keys(&["a", "a"]), &keys(&["a"])), Ok(Plan::Rebuild));
    }

    #[test]
    fn unchanged_and_empty() {
        assert!(plan(&keys(&["a", "b"]), &keys(&["a", "b"])).unwrap().is_noop());
        assert!(plan(&[], &[]).unwrap().is_noop());
        assert_eq!(
            plan(&keys(&["a", "b"]), &[]).unwrap(),
            Plan::Incremental(vec![ChildOp::Remove("a".into()), ChildOp::Remove("b".into())])
        );
    }

    fn key_list() -> impl Strategy<Value = Vec<EntityId>> {
        proptest::collection::hash_set(0..12u8, 0..8)
            .prop_map(|set| set.into_iter().map(|n| EntityId::from(format!("{:04}", n))).collect::<Vec<_>>())
            .prop_shuffle()
    }

    proptest! {
        #[test]
        fn plan_always_reaches_target(existing in key_list(), target in key_list()) {
            let plan = plan(&existing, &target).unwrap();
            prop_assert_eq!(apply(&existing, &target, &plan), target.clone());
        }

        #[test]
        fn appends_and_removals_never_rebuild(existing in key_list(), keep in proptest::collection::vec(any::<bool>(), 8), extra in 12..20u8) {
            let mut target: Vec<EntityId> = existing
                .iter()
                .zip(keep.iter().chain(std::iter::repeat(&true)))
                .filter(|(_, keep)| **keep)
                .map(|(key, _)| key.clone())
                .collect();
            target.push(EntityId::from(format!("{:04}", extra)));
            prop_assert!(matches!(plan(&existing, &target).unwrap(), Plan::Incremental(_)));
        }
    }
}
