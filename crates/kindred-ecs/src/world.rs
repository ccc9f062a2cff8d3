use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::component::Component;
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityAllocator};
use crate::error::{EcsError, Result};
use crate::kind::{ComponentKind, ComponentTuple};
use crate::query::{EntityRef, HasAll, Matcher, QuerySet};
use crate::registry::{QueryHandle, SetRegistry};
use crate::store::{ComponentRef, ComponentStore};

/// A world behind a lock, for callers that hand one world to several threads.
/// Every operation still runs to completion under a single lock holder.
pub type SharedWorld = Arc<Mutex<World>>;

/// The central ECS container. Owns all entities, components, and query sets.
///
/// Every registered query set is kept exactly equal to the entities its matcher
/// accepts: attach, detach, update and release re-evaluate the affected entity
/// against each live set before returning.
pub struct World {
    entities: EntityAllocator,
    labels: Vec<Option<String>>,
    store: ComponentStore,
    sets: SetRegistry,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(&WorldConfig::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(&WorldConfig {
            initial_capacity: capacity,
        })
    }

    pub fn with_config(config: &WorldConfig) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.initial_capacity),
            labels: Vec::with_capacity(config.initial_capacity),
            store: ComponentStore::with_capacity(config.initial_capacity),
            sets: SetRegistry::new(),
        }
    }

    pub fn into_shared(self) -> SharedWorld {
        Arc::new(Mutex::new(self))
    }

    // ---- Entity management ----

    /// Create a new entity with no components, recycling a released slot if one
    /// is free.
    pub fn create(&mut self, label: Option<&str>) -> Entity {
        let entity = self.entities.allocate();
        let idx = entity.index as usize;
        if idx >= self.labels.len() {
            self.labels.resize_with(idx + 1, || None);
        }
        self.labels[idx] = label.map(str::to_owned);
        let registered = self.store.register_entity(entity, &mut self.sets);
        debug_assert!(registered, "fresh entity {entity:?} already had a record");
        debug!(%entity, label, "created entity");
        entity
    }

    /// Release an entity: detach every component (releasing each value and
    /// updating query sets), then forget the entity everywhere.
    ///
    /// Unknown or already-released entities are ignored. Every component is
    /// detached even if a release fails; the first failure is returned.
    pub fn release(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Ok(());
        }
        let mut first_error = None;
        for kind in self.store.kinds(entity) {
            if let Err(err) = self.store.detach(entity, kind, &mut self.sets) {
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.store.remove_entity(entity, &mut self.sets) {
            first_error.get_or_insert(err);
        }
        self.entities.deallocate(entity);
        self.labels[entity.index as usize] = None;
        debug!(%entity, "released entity");
        first_error.map_or(Ok(()), Err)
    }

    /// Check whether an entity is alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Debug label given at creation.
    pub fn label(&self, entity: Entity) -> Option<&str> {
        if !self.is_alive(entity) {
            return None;
        }
        self.labels.get(entity.index as usize)?.as_deref()
    }

    /// Every live entity, in slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Number of alive entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ---- Component management ----

    /// The kind id used for `T` in this world.
    pub fn kind_of<T: Component>(&mut self) -> ComponentKind {
        self.store.kind_of::<T>()
    }

    /// Attach a component, replacing any existing component of the same type.
    ///
    /// A replaced value is released (see [`Component::release`]) before it is
    /// dropped.
    pub fn attach<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        self.store.attach(entity, component, &mut self.sets)
    }

    /// Check whether an entity has a component of the given type.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.store.has::<T>(entity)
    }

    /// Check whether an entity has a component of the given kind.
    pub fn contains(&self, entity: Entity, kind: ComponentKind) -> bool {
        self.store.contains(entity, kind)
    }

    /// Get an immutable reference to a component on an entity.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.store.get::<T>(entity)
    }

    /// Number of entities holding a `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.store.count::<T>()
    }

    /// Mutate a component in place. Query sets are re-evaluated afterwards.
    pub fn update<T: Component, R>(&mut self, entity: Entity, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.store.update(entity, f, &mut self.sets)
    }

    /// Remove a component from an entity. Missing components are ignored.
    pub fn detach<T: Component>(&mut self, entity: Entity) -> Result<()> {
        self.store.detach_component::<T>(entity, &mut self.sets)
    }

    pub fn detach_kind(&mut self, entity: Entity, kind: ComponentKind) -> Result<()> {
        self.store.detach(entity, kind, &mut self.sets)
    }

    /// Snapshot of the components on an entity.
    pub fn components(&self, entity: Entity) -> Vec<ComponentRef<'_>> {
        self.store.components(entity)
    }

    /// Snapshot of the kinds on an entity.
    pub fn kinds(&self, entity: Entity) -> Vec<ComponentKind> {
        self.store.kinds(entity)
    }

    pub fn entity_ref(&self, entity: Entity) -> EntityRef<'_> {
        self.store.entity_ref(entity)
    }

    // ---- Queries ----

    /// Register a live query set. Its membership is seeded by one scan over the
    /// current entities and kept up to date from then on.
    pub fn create_set(&mut self, matcher: impl Matcher) -> QueryHandle {
        self.sets.create_set(Box::new(matcher), self.store.entity_refs())
    }

    /// Register a live set of entities having every component type in `Q`.
    ///
    /// # Example
    /// ```ignore
    /// let moving = world.create_set_containing::<(Position, Velocity)>();
    /// for entity in world.query(moving).unwrap() {
    ///     // ...
    /// }
    /// ```
    pub fn create_set_containing<Q: ComponentTuple>(&mut self) -> QueryHandle {
        let kinds = self.store.kinds_for::<Q>();
        self.create_set(HasAll::new(kinds))
    }

    /// Deregister a set. The returned set is frozen at its last membership.
    pub fn remove_set(&mut self, handle: QueryHandle) -> Option<QuerySet> {
        self.sets.remove_set(handle)
    }

    /// Current membership of a registered set.
    pub fn query(&self, handle: QueryHandle) -> Option<&QuerySet> {
        self.sets.get(handle)
    }

    /// Number of registered query sets.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
