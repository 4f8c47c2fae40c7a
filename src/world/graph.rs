//! Structural mutations of the entity tree.
//!
//! An entity is in at most one child list. Moving a child that already has a parent goes
//! through [`World::move_child`], which detaches it from its current parent first.

use super::World;
use crate::entity::EntityId;
use crate::error::TreeError;

impl World {
    /// Logs a guarded consistency error and hands it back.
    fn refuse(&self, error: TreeError) -> Result<(), TreeError> {
        tracing::warn!(error = %error, "ignoring inconsistent tree mutation");
        Err(error)
    }

    fn is_ancestor_or_self(&self, ancestor: &EntityId, of: &EntityId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.entities.get(id).and_then(|entity| entity.parent.as_ref());
        }
        false
    }

    fn check_insert(&self, parent: &EntityId, child: &EntityId) -> Result<(), TreeError> {
        if !self.entities.contains_key(parent) {
            return self.refuse(TreeError::NoSuchEntity(parent.clone()));
        }
        if !self.entities.contains_key(child) {
            return self.refuse(TreeError::NoSuchEntity(child.clone()));
        }
        if self.is_ancestor_or_self(child, parent) {
            return self.refuse(TreeError::Cycle {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        Ok(())
    }

    /// Inserts a detached child at `index` (clamped).
    fn attach(&mut self, parent: &EntityId, child: &EntityId, index: usize) {
        if let Some(entity) = self.entities.get_mut(parent) {
            let index = index.min(entity.children.len());
            entity.children.insert(index, child.clone());
        }
        if let Some(entity) = self.entities.get_mut(child) {
            entity.parent = Some(parent.clone());
        }
        self.dirty.mark(parent);
        self.dirty.mark(child);
    }

    /// Unlinks a child from its parent without destroying it.
    fn detach(&mut self, child: &EntityId) {
        let parent = match self.entities.get_mut(child).and_then(|e| e.parent.take()) {
            Some(parent) => parent,
            None => return,
        };
        if let Some(entity) = self.entities.get_mut(&parent) {
            entity.children.retain(|c| c != child);
        }
        self.dirty.mark(&parent);
        self.dirty.mark(child);
    }

    fn parent_of(&self, id: &EntityId) -> Option<EntityId> {
        self.entities.get(id).and_then(|entity| entity.parent.clone())
    }

    /// Appends `child` to `parent`'s children.
    pub fn append_child(&mut self, parent: &EntityId, child: &EntityId) -> Result<(), TreeError> {
        let end = self.children(parent).len();
        match self.parent_of(child) {
            Some(old) => self.move_child(parent, &old, child, end),
            None => {
                self.check_insert(parent, child)?;
                self.attach(parent, child, end);
                Ok(())
            }
        }
    }

    /// Inserts `child` before `reference`. A reference that is not a child of `parent` appends.
    pub fn insert_before(
        &mut self,
        parent: &EntityId,
        child: &EntityId,
        reference: Option<&EntityId>,
    ) -> Result<(), TreeError> {
        let siblings = self.children(parent);
        let index = match reference {
            Some(reference) => match siblings.iter().position(|c| c == reference) {
                Some(index) => index,
                None => {
                    tracing::warn!(parent = %parent, reference = %reference, "reference is not a child; appending");
                    siblings.len()
                }
            },
            None => siblings.len(),
        };
        match self.parent_of(child) {
            Some(old) => self.move_child(parent, &old, child, index),
            None => {
                self.check_insert(parent, child)?;
                self.attach(parent, child, index);
                Ok(())
            }
        }
    }

    /// Inserts `child` as the first child of `parent`.
    pub fn insert_first(&mut self, parent: &EntityId, child: &EntityId) -> Result<(), TreeError> {
        match self.parent_of(child) {
            Some(old) => self.move_child(parent, &old, child, 0),
            None => {
                self.check_insert(parent, child)?;
                self.attach(parent, child, 0);
                Ok(())
            }
        }
    }

    /// Moves `child` to position `to_index` of `dest`.
    ///
    /// `to_index` counts positions in `dest`'s current list: the child ends up in front of
    /// the entity currently at that index. Within the same parent, moving to the child's own index
    /// or the one after it is a no-op. The child is taken from wherever it actually is;
    /// `from_parent` must exist.
    pub fn move_child(
        &mut self,
        dest: &EntityId,
        from_parent: &EntityId,
        child: &EntityId,
        to_index: usize,
    ) -> Result<(), TreeError> {
        if !self.entities.contains_key(from_parent) {
            return self.refuse(TreeError::NoSuchParent(from_parent.clone()));
        }
        if !self.entities.contains_key(child) {
            return self.refuse(TreeError::NoSuchEntity(child.clone()));
        }

        let current = self.parent_of(child);
        if current.as_ref() != Some(from_parent) {
            tracing::debug!(child = %child, from = %from_parent, "moving from actual parent instead");
        }

        if current.as_ref() == Some(dest) {
            let siblings = match self.entities.get_mut(dest) {
                Some(entity) => &mut entity.children,
                None => return self.refuse(TreeError::NoSuchEntity(dest.clone())),
            };
            let from = match siblings.iter().position(|c| c == child) {
                Some(from) => from,
                None => return Ok(()),
            };
            if to_index == from || to_index == from + 1 {
                return Ok(());
            }
            siblings.remove(from);
            let to = if to_index > from { to_index - 1 } else { to_index };
            let to = to.min(siblings.len());
            siblings.insert(to, child.clone());
            self.dirty.mark(dest);
            return Ok(());
        }

        self.check_insert(dest, child)?;
        self.detach(child);
        self.attach(dest, child, to_index);
        Ok(())
    }

    /// Removes `child` from `parent` and destroys it with all its descendants.
    pub fn remove_child(&mut self, parent: &EntityId, child: &EntityId) -> Result<(), TreeError> {
        if !self.entities.contains_key(parent) {
            return self.refuse(TreeError::NoSuchEntity(parent.clone()));
        }
        if self.parent_of(child).as_ref() != Some(parent) {
            return self.refuse(TreeError::NotAChild {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        self.detach(child);
        self.destroy(child);
        Ok(())
    }

    /// Removes the entity from its parent (if any) and destroys it.
    pub fn remove(&mut self, id: &EntityId) -> Result<(), TreeError> {
        if id == &self.root {
            return self.refuse(TreeError::RemoveWorld);
        }
        if !self.entities.contains_key(id) {
            return self.refuse(TreeError::NoSuchEntity(id.clone()));
        }
        match self.parent_of(id) {
            Some(parent) => self.remove_child(&parent, id),
            None => {
                self.destroy(id);
                Ok(())
            }
        }
    }

    /// Destroys an entity and its descendants, descendants first.
    fn destroy(&mut self, id: &EntityId) {
        let children = match self.entities.get(id) {
            Some(entity) => entity.children.clone(),
            None => return,
        };
        for child in &children {
            self.destroy(child);
        }
        self.entities.remove(id);
        self.resolved.remove(id);
        self.subscriptions.remove_entity(id);
        self.dirty.mark(id);
        tracing::trace!(entity = %id, "destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::world;
    use super::super::ELEMENT;
    use crate::entity::EntityId;
    use crate::error::TreeError;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ids(world: &mut super::World, n: usize) -> Vec<EntityId> {
        (0..n).map(|_| world.create(ELEMENT).unwrap()).collect()
    }

    #[test]
    fn append_and_insert() {
        let mut world = world();
        let v = ids(&mut world, 4);
        let (a, b, c, d) = (&v[0], &v[1], &v[2], &v[3]);
        world.append_child(a, b).unwrap();
        world.append_child(a, c).unwrap();
        world.insert_before(a, d, Some(c)).unwrap();
        assert_eq!(world.children(a), [b.clone(), d.clone(), c.clone()]);
        assert_eq!(world.get(d).unwrap().parent(), Some(a));

        world.insert_first(a, c).unwrap();
        assert_eq!(world.children(a), [c.clone(), b.clone(), d.clone()]);
    }

    #[test]
    fn move_within_parent() {
        let mut world = world();
        let v = ids(&mut world, 5);
        let parent = &v[0];
        for child in &v[1..] {
            world.append_child(parent, child).unwrap();
        }
        let (b, c, d, e) = (&v[1], &v[2], &v[3], &v[4]);

        // own index and the one after are no-ops
        world.move_child(parent, parent, c, 1).unwrap();
        world.move_child(parent, parent, c, 2).unwrap();
        assert_eq!(world.children(parent), [b.clone(), c.clone(), d.clone(), e.clone()]);

        world.move_child(parent, parent, b, 3).unwrap();
        assert_eq!(world.children(parent), [c.clone(), d.clone(), b.clone(), e.clone()]);

        world.move_child(parent, parent, e, 0).unwrap();
        assert_eq!(world.children(parent), [e.clone(), c.clone(), d.clone(), b.clone()]);
    }

    #[test]
    fn move_across_parents_keeps_the_child() {
        let mut world = world();
        let v = ids(&mut world, 4);
        let (p, q, x, y) = (&v[0], &v[1], &v[2], &v[3]);
        world.append_child(p, x).unwrap();
        world.append_child(x, y).unwrap();

        world.move_child(q, p, x, 0).unwrap();
        assert!(world.children(p).is_empty());
        assert_eq!(world.children(q), [x.clone()]);
        assert_eq!(world.children(x), [y.clone()]);
        assert!(world.contains(y));
    }

    #[test]
    fn guarded_errors() {
        let mut world = world();
        let v = ids(&mut world, 3);
        let (a, b, c) = (&v[0], &v[1], &v[2]);
        world.append_child(a, b).unwrap();

        assert_eq!(
            world.append_child(b, a),
            Err(TreeError::Cycle {
                parent: b.clone(),
                child: a.clone()
            })
        );
        let ghost = EntityId::from("9999");
        assert_eq!(
            world.move_child(c, &ghost, b, 0),
            Err(TreeError::NoSuchParent(ghost.clone()))
        );
        assert_eq!(world.children(a), [b.clone()]);
        assert!(matches!(world.remove_child(c, b), Err(TreeError::NotAChild { .. })));
        let root = world.root().clone();
        assert_eq!(world.remove(&root), Err(TreeError::RemoveWorld));
    }

    #[test]
    fn removal_destroys_descendants() {
        let mut world = world();
        let v = ids(&mut world, 4);
        let (a, b, c, d) = (&v[0], &v[1], &v[2], &v[3]);
        world.append_child(a, b).unwrap();
        world.append_child(b, c).unwrap();
        world.append_child(b, d).unwrap();
        world.changed_elements(false);

        world.remove(b).unwrap();
        assert!(world.children(a).is_empty());
        for gone in [b, c, d] {
            assert!(!world.contains(gone));
        }
        let changed = world.changed_elements(false);
        for id in [a, b, c, d] {
            assert!(changed.contains(id), "{} should be dirty", id);
        }

        // destroyed identities are never handed out again
        let next = world.create(ELEMENT).unwrap();
        assert!(![a, b, c, d].contains(&&next));
    }

    #[test]
    fn repeated_mutations_are_idempotent() {
        let mut world = world();
        let v = ids(&mut world, 4);
        let (a, b, c, d) = (&v[0], &v[1], &v[2], &v[3]);
        world.append_child(a, b).unwrap();
        world.append_child(a, c).unwrap();
        world.append_child(a, c).unwrap();
        world.insert_before(a, d, Some(b)).unwrap();
        world.insert_before(a, d, Some(b)).unwrap();
        world.move_child(a, a, b, 3).unwrap();
        let once = world.children(a).to_vec();
        world.move_child(a, a, b, 3).unwrap();
        assert_eq!(world.children(a), once.as_slice());
        assert_eq!(once, vec![d.clone(), c.clone(), b.clone()]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append(usize),
        InsertBefore(usize, usize),
        Move(usize, usize),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..8usize).prop_map(Op::Append),
            (0..8usize, 0..8usize).prop_map(|(a, b)| Op::InsertBefore(a, b)),
            (0..8usize, 0..10usize).prop_map(|(a, b)| Op::Move(a, b)),
            (0..8usize).prop_map(Op::Remove),
        ]
    }

    /// Plain list model of a single parent's children.
    fn model_apply(model: &mut Vec<usize>, removed: &mut Vec<usize>, op: &Op) {
        match *op {
            Op::Append(x) if !removed.contains(&x) => {
                model.retain(|&y| y != x);
                model.push(x);
            }
            Op::InsertBefore(x, r) if !removed.contains(&x) && x != r => {
                if model.contains(&x) {
                    let from = model.iter().position(|&y| y == x).unwrap();
                    let to = model.iter().position(|&y| y == r).unwrap_or(model.len());
                    if to != from && to != from + 1 {
                        model.remove(from);
                        let to = if to > from { to - 1 } else { to };
                        model.insert(to, x);
                    }
                } else {
                    let to = model.iter().position(|&y| y == r).unwrap_or(model.len());
                    model.insert(to, x);
                }
            }
            Op::Move(x, to) => {
                if let Some(from) = model.iter().position(|&y| y == x) {
                    if to != from && to != from + 1 {
                        model.remove(from);
                        let to = if to > from { to - 1 } else { to };
                        model.insert(to.min(model.len()), x);
                    }
                }
            }
            Op::Remove(x) => {
                if model.contains(&x) {
                    model.retain(|&y| y != x);
                    removed.push(x);
                }
            }
            _ => (),
        }
    }

    proptest! {
        #[test]
        fn children_match_list_model(ops in proptest::collection::vec(op(), 0..40)) {
            let mut world = world();
            let parent = world.create(ELEMENT).unwrap();
            let pool = ids(&mut world, 8);
            let mut model = Vec::new();
            let mut removed = Vec::new();

            for op in &ops {
                match *op {
                    Op::Append(x) => {
                        let _ = world.append_child(&parent, &pool[x]);
                    }
                    Op::InsertBefore(x, r) => {
                        if x != r {
                            let _ = world.insert_before(&parent, &pool[x], Some(&pool[r]));
                        }
                    }
                    Op::Move(x, to) => {
                        if world.get(&pool[x]).and_then(|e| e.parent()) == Some(&parent) {
                            let _ = world.move_child(&parent, &parent, &pool[x], to);
                        }
                    }
                    Op::Remove(x) => {
                        if world.get(&pool[x]).and_then(|e| e.parent()) == Some(&parent) {
                            let _ = world.remove_child(&parent, &pool[x]);
                        }
                    }
                }
                model_apply(&mut model, &mut removed, op);

                let expected: Vec<EntityId> = model.iter().map(|&i| pool[i].clone()).collect();
                prop_assert_eq!(world.children(&parent), expected.as_slice());
            }
        }
    }
}
