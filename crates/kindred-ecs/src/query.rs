//! Matchers and the live entity sets they define.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::component::{Component, ComponentStorage, SparseSet};
use crate::entity::Entity;
use crate::kind::{ComponentKind, KindRegistry, KindSet};

pub(crate) type Storages = HashMap<ComponentKind, Box<dyn ComponentStorage>>;

static NO_KINDS: KindSet = KindSet { words: Vec::new() };

/// Read-only view of one entity's components, handed to matchers.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    pub(crate) entity: Entity,
    pub(crate) kinds: &'w KindSet,
    pub(crate) storages: &'w Storages,
    pub(crate) registry: &'w KindRegistry,
}

impl<'w> EntityRef<'w> {
    /// View of an entity the store holds no record for.
    pub(crate) fn absent(entity: Entity, storages: &'w Storages, registry: &'w KindRegistry) -> Self {
        Self {
            entity,
            kinds: &NO_KINDS,
            storages,
            registry,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Kinds currently attached.
    pub fn kinds(&self) -> &'w KindSet {
        self.kinds
    }

    pub fn contains_kind(&self, kind: ComponentKind) -> bool {
        self.kinds.contains(kind)
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.registry
            .lookup::<T>()
            .map_or(false, |kind| self.kinds.contains(kind))
    }

    /// Component value, for matchers that look past the kind set.
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        let kind = self.registry.lookup::<T>()?;
        if !self.kinds.contains(kind) {
            return None;
        }
        self.storages
            .get(&kind)?
            .as_any()
            .downcast_ref::<SparseSet<T>>()?
            .get(self.entity.index)
    }
}

/// Predicate deciding whether an entity belongs in a query set.
///
/// Must be pure: the answer may depend only on the entity's current components.
pub trait Matcher: Send + Sync + 'static {
    fn matches(&self, entity: EntityRef<'_>) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(EntityRef<'_>) -> bool + Send + Sync + 'static,
{
    fn matches(&self, entity: EntityRef<'_>) -> bool {
        (self)(entity)
    }
}

/// Matches entities that have every kind in a set.
///
/// An empty kind set is vacuously satisfied: it matches every entity, including
/// freshly created ones with no components, rather than matching nothing.
#[derive(Debug, Clone)]
pub struct HasAll {
    kinds: KindSet,
}

impl HasAll {
    pub fn new(kinds: KindSet) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &KindSet {
        &self.kinds
    }
}

impl Matcher for HasAll {
    fn matches(&self, entity: EntityRef<'_>) -> bool {
        entity.kinds().contains_all(&self.kinds)
    }
}

/// A live set of entities defined by a matcher.
///
/// Membership is maintained by the world's set registry after every mutation;
/// readers get it already materialized. Iteration order is unspecified.
pub struct QuerySet {
    matcher: Box<dyn Matcher>,
    members: HashSet<Entity>,
}

impl QuerySet {
    pub(crate) fn new(matcher: Box<dyn Matcher>) -> Self {
        Self {
            matcher,
            members: HashSet::new(),
        }
    }

    /// Evaluate the matcher against an entity, without touching membership.
    pub fn matches(&self, entity: EntityRef<'_>) -> bool {
        self.matcher.matches(entity)
    }

    /// Returns `true` if the entity was not already a member.
    pub(crate) fn add(&mut self, entity: Entity) -> bool {
        self.members.insert(entity)
    }

    /// Returns `true` if the entity was a member.
    pub(crate) fn remove(&mut self, entity: Entity) -> bool {
        self.members.remove(&entity)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.members.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.members.iter().copied()
    }
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a QuerySet {
    type Item = &'a Entity;
    type IntoIter = std::collections::hash_set::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Velocity;
    impl Component for Velocity {}

    #[derive(Debug, PartialEq)]
    struct Armor(u32);
    impl Component for Armor {}

    fn view<'w>(
        entity: Entity,
        kinds: &'w KindSet,
        storages: &'w Storages,
        registry: &'w KindRegistry,
    ) -> EntityRef<'w> {
        EntityRef {
            entity,
            kinds,
            storages,
            registry,
        }
    }

    #[test]
    fn has_all_matcher() {
        let mut registry = KindRegistry::new();
        let pos = registry.register::<Position>();
        let vel = registry.register::<Velocity>();
        let storages = Storages::new();
        let e = Entity::from_raw(0, 0);

        let matcher = HasAll::new([pos, vel].into_iter().collect());
        let only_pos: KindSet = [pos].into_iter().collect();
        let both: KindSet = [pos, vel].into_iter().collect();
        assert!(!matcher.matches(view(e, &only_pos, &storages, &registry)));
        assert!(matcher.matches(view(e, &both, &storages, &registry)));
    }

    #[test]
    fn empty_has_all_matches_everything() {
        let registry = KindRegistry::new();
        let storages = Storages::new();
        let matcher = HasAll::new(KindSet::new());
        let e = Entity::from_raw(4, 1);
        assert!(matcher.matches(EntityRef::absent(e, &storages, &registry)));
    }

    #[test]
    fn closure_matcher() {
        let mut registry = KindRegistry::new();
        let pos = registry.register::<Position>();
        let storages = Storages::new();
        let kinds: KindSet = [pos].into_iter().collect();
        let without_velocity = |e: EntityRef<'_>| e.contains::<Position>() && !e.contains::<Velocity>();
        let set = QuerySet::new(Box::new(without_velocity));
        assert!(set.matches(view(Entity::from_raw(0, 0), &kinds, &storages, &registry)));
    }

    #[test]
    fn add_remove_idempotent() {
        let mut set = QuerySet::new(Box::new(HasAll::new(KindSet::new())));
        let e = Entity::from_raw(1, 0);
        assert!(set.add(e));
        assert!(!set.add(e));
        assert_eq!(set.len(), 1);
        assert!(set.remove(e));
        assert!(!set.remove(e));
        assert!(set.is_empty());
        assert!(!set.contains(e));
    }

    #[test]
    fn value_lookup_requires_attached_kind() {
        let mut registry = KindRegistry::new();
        let kind = registry.register::<Armor>();
        let mut storage = SparseSet::<Armor>::new();
        storage.insert(0, Armor(9)).unwrap();
        let mut storages = Storages::new();
        storages.insert(kind, Box::new(storage));

        let e = Entity::from_raw(0, 0);
        let attached: KindSet = [kind].into_iter().collect();
        assert_eq!(view(e, &attached, &storages, &registry).get::<Armor>(), Some(&Armor(9)));
        assert_eq!(EntityRef::absent(e, &storages, &registry).get::<Armor>(), None);
    }
}
