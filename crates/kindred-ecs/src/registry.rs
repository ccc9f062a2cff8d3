//! The set registry: every live query set, kept current as entities change.
//!
//! Each mutation costs one matcher evaluation per live set. Reads never
//! recompute anything; membership is already materialized.

use std::fmt;

use tracing::{debug, trace};

use crate::entity::{Entity, SlotAllocator, SlotKey};
use crate::query::{EntityRef, Matcher, QuerySet};
use crate::store::MutationObserver;

/// Handle to a registered query set, returned by `create_set`.
///
/// Handles are generational: once a set is removed its handle never resolves
/// again, even if the slot is reused by a later set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle {
    index: u32,
    generation: u32,
}

impl SlotKey for QueryHandle {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    fn slot(&self) -> u32 {
        self.index
    }

    fn slot_generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({}v{})", self.index, self.generation)
    }
}

/// Owns all live query sets of one world.
#[derive(Default)]
pub struct SetRegistry {
    handles: SlotAllocator<QueryHandle>,
    sets: Vec<Option<QuerySet>>,
}

impl SetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new set, then scan `known` once to seed its membership.
    pub fn create_set<'w>(
        &mut self,
        matcher: Box<dyn Matcher>,
        known: impl IntoIterator<Item = EntityRef<'w>>,
    ) -> QueryHandle {
        let handle = self.handles.allocate();
        let mut set = QuerySet::new(matcher);
        for entity in known {
            if set.matches(entity) {
                set.add(entity.entity());
            }
        }
        debug!(?handle, members = set.len(), "created query set");

        let idx = handle.index as usize;
        if idx >= self.sets.len() {
            self.sets.resize_with(idx + 1, || None);
        }
        self.sets[idx] = Some(set);
        handle
    }

    /// Deregister a set and hand back its final, frozen membership.
    ///
    /// Returns `None` for a handle that was already removed.
    pub fn remove_set(&mut self, handle: QueryHandle) -> Option<QuerySet> {
        if !self.handles.deallocate(handle) {
            return None;
        }
        let set = self.sets[handle.index as usize].take();
        debug!(?handle, "removed query set");
        set
    }

    pub fn get(&self, handle: QueryHandle) -> Option<&QuerySet> {
        if !self.handles.is_alive(handle) {
            return None;
        }
        self.sets.get(handle.index as usize)?.as_ref()
    }

    /// Re-test one entity against every live set and fix up membership.
    pub fn notify_mutated(&mut self, entity: EntityRef<'_>) {
        let id = entity.entity();
        for set in self.sets.iter_mut().flatten() {
            if set.matches(entity) {
                if set.add(id) {
                    trace!(entity = %id, "entity joined query set");
                }
            } else if set.remove(id) {
                trace!(entity = %id, "entity left query set");
            }
        }
    }

    /// Drop an entity from every set, whatever the matchers say.
    pub fn forget(&mut self, entity: Entity) {
        for set in self.sets.iter_mut().flatten() {
            set.remove(entity);
        }
    }

    /// Handles of every live set.
    pub fn handles(&self) -> impl Iterator<Item = QueryHandle> + '_ {
        self.handles.iter()
    }

    /// Number of live sets.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl MutationObserver for SetRegistry {
    fn entity_mutated(&mut self, entity: EntityRef<'_>) {
        self.notify_mutated(entity);
    }

    fn entity_removed(&mut self, entity: Entity) {
        self.forget(entity);
    }
}
