//! Component storage: which components each entity has, and the values themselves.
//!
//! Every mutation is reported to a [`MutationObserver`] once the post-mutation
//! state is in place, so observers never see a half-applied change.

use std::any::Any;
use std::fmt;

use tracing::{trace, warn};

use crate::component::{Component, SparseSet};
use crate::entity::Entity;
use crate::error::{BoxError, EcsError, Result};
use crate::kind::{ComponentKind, ComponentTuple, KindRegistry, KindSet};
use crate::query::{EntityRef, Storages};

/// Receives a callback after every change to an entity's components.
pub trait MutationObserver {
    /// The entity's components changed; `entity` shows the new state.
    fn entity_mutated(&mut self, entity: EntityRef<'_>);

    /// The entity's record was dropped from the store.
    fn entity_removed(&mut self, entity: Entity);
}

/// Observer that ignores every notification.
impl MutationObserver for () {
    fn entity_mutated(&mut self, _entity: EntityRef<'_>) {}

    fn entity_removed(&mut self, _entity: Entity) {}
}

struct EntityRecord {
    entity: Entity,
    kinds: KindSet,
}

/// A borrowed, type-erased component, as returned by [`ComponentStore::components`].
#[derive(Clone, Copy)]
pub struct ComponentRef<'w> {
    kind: ComponentKind,
    name: &'static str,
    value: &'w dyn Any,
}

impl<'w> ComponentRef<'w> {
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Type name of the component.
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&'w T> {
        self.value.downcast_ref()
    }

    pub fn is<T: Component>(&self) -> bool {
        self.value.is::<T>()
    }
}

impl fmt::Debug for ComponentRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("kind", &self.kind)
            .field("type", &self.name)
            .finish()
    }
}

/// Owns every component value, keyed by entity and kind.
///
/// An entity the store has no record for behaves exactly like one with zero
/// components.
pub struct ComponentStore {
    records: Vec<Option<EntityRecord>>,
    storages: Storages,
    registry: KindRegistry,
    len: usize,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            storages: Storages::new(),
            registry: KindRegistry::new(),
            len: 0,
        }
    }

    pub fn kind_registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// The kind used for `T`, registering it on first use.
    pub fn kind_of<T: Component>(&mut self) -> ComponentKind {
        self.registry.register::<T>()
    }

    /// Kinds of every component type in `Q`, registering any that are new.
    pub fn kinds_for<Q: ComponentTuple>(&mut self) -> KindSet {
        Q::kinds(&mut self.registry)
    }

    fn storage_mut<T: Component>(&mut self, kind: ComponentKind) -> &mut SparseSet<T> {
        self.storages
            .entry(kind)
            .or_insert_with(|| Box::new(SparseSet::<T>::new()))
            .as_any_mut()
            .downcast_mut::<SparseSet<T>>()
            .expect("component kind mismatch")
    }

    fn storage<T: Component>(&self, kind: ComponentKind) -> Option<&SparseSet<T>> {
        self.storages
            .get(&kind)
            .and_then(|s| s.as_any().downcast_ref::<SparseSet<T>>())
    }

    fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        self.records
            .get(entity.index as usize)?
            .as_ref()
            .filter(|record| record.entity == entity)
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        self.records
            .get_mut(entity.index as usize)?
            .as_mut()
            .filter(|record| record.entity == entity)
    }

    /// Find or create the record for `entity`. Fails if its slot belongs to
    /// another generation.
    fn ensure_record(&mut self, entity: Entity) -> Result<()> {
        let idx = entity.index as usize;
        if idx >= self.records.len() {
            self.records.resize_with(idx + 1, || None);
        }
        match &self.records[idx] {
            Some(record) if record.entity != entity => Err(EcsError::DeadEntity(entity)),
            Some(_) => Ok(()),
            None => {
                self.records[idx] = Some(EntityRecord {
                    entity,
                    kinds: KindSet::new(),
                });
                self.len += 1;
                Ok(())
            }
        }
    }

    fn notify(&self, entity: Entity, observer: &mut dyn MutationObserver) {
        observer.entity_mutated(self.entity_ref(entity));
    }

    fn release_error(&self, entity: Entity, kind: ComponentKind, source: BoxError) -> EcsError {
        let kind = self.registry.name(kind).unwrap_or("<unregistered>");
        warn!(%entity, kind, error = %source, "component release failed");
        EcsError::Release {
            entity,
            kind,
            source,
        }
    }

    /// Add an entity with no components. Returns `false` if it was already known
    /// or its slot is held by another generation.
    pub fn register_entity(
        &mut self,
        entity: Entity,
        observer: &mut dyn MutationObserver,
    ) -> bool {
        if self.is_known(entity) {
            return false;
        }
        if self.ensure_record(entity).is_err() {
            return false;
        }
        self.notify(entity, observer);
        true
    }

    /// Drop an entity's record.
    ///
    /// Components still attached are detached and released first;
    /// the first release failure is returned after the record is gone.
    pub fn remove_entity(
        &mut self,
        entity: Entity,
        observer: &mut dyn MutationObserver,
    ) -> Result<bool> {
        if !self.is_known(entity) {
            return Ok(false);
        }
        let mut first_error = None;
        for kind in self.kinds(entity) {
            if let Err(err) = self.detach(entity, kind, observer) {
                first_error.get_or_insert(err);
            }
        }
        self.records[entity.index as usize] = None;
        self.len -= 1;
        observer.entity_removed(entity);
        first_error.map_or(Ok(true), Err)
    }

    /// Insert or replace the `T` component on `entity`.
    ///
    /// Creates the entity's record if this is its first component. The observer
    /// is notified on both the first-attach and the replace path. A replaced
    /// value is released before it is dropped; if that fails the new value is
    /// still attached and the failure is returned.
    pub fn attach<T: Component>(
        &mut self,
        entity: Entity,
        component: T,
        observer: &mut dyn MutationObserver,
    ) -> Result<()> {
        let kind = self.registry.register::<T>();
        self.ensure_record(entity)?;
        if let Some(record) = self.record_mut(entity) {
            record.kinds.insert(kind);
        }
        let replaced = self.storage_mut::<T>(kind).insert(entity.index, component);
        trace!(%entity, ?kind, "attached component");
        self.notify(entity, observer);
        replaced
            .map(|_| ())
            .map_err(|source| self.release_error(entity, kind, source))
    }

    /// Remove the component of `kind` from `entity`. Missing entity or kind is a no-op.
    pub fn detach(
        &mut self,
        entity: Entity,
        kind: ComponentKind,
        observer: &mut dyn MutationObserver,
    ) -> Result<()> {
        let Some(record) = self.record_mut(entity) else {
            return Ok(());
        };
        if !record.kinds.remove(kind) {
            return Ok(());
        }
        let removed = match self.storages.get_mut(&kind) {
            Some(storage) => storage.remove(entity.index),
            None => Ok(false),
        };
        trace!(%entity, ?kind, "detached component");
        self.notify(entity, observer);
        removed
            .map(|_| ())
            .map_err(|source| self.release_error(entity, kind, source))
    }

    /// Remove the `T` component from `entity`, if any.
    pub fn detach_component<T: Component>(
        &mut self,
        entity: Entity,
        observer: &mut dyn MutationObserver,
    ) -> Result<()> {
        match self.registry.lookup::<T>() {
            Some(kind) => self.detach(entity, kind, observer),
            None => Ok(()),
        }
    }

    /// Whether `entity` has a component of `kind`. Never allocates.
    pub fn contains(&self, entity: Entity, kind: ComponentKind) -> bool {
        self.record(entity)
            .map_or(false, |record| record.kinds.contains(kind))
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.registry
            .lookup::<T>()
            .map_or(false, |kind| self.contains(entity, kind))
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let kind = self.registry.lookup::<T>()?;
        if !self.contains(entity, kind) {
            return None;
        }
        self.storage::<T>(kind)?.get(entity.index)
    }

    /// Number of entities holding a `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.registry
            .lookup::<T>()
            .and_then(|kind| self.storage::<T>(kind))
            .map_or(0, SparseSet::len)
    }

    /// Mutate a component in place, then notify the observer so matchers that
    /// inspect values see the change.
    pub fn update<T: Component, R>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut T) -> R,
        observer: &mut dyn MutationObserver,
    ) -> Option<R> {
        let kind = self.registry.lookup::<T>()?;
        if !self.contains(entity, kind) {
            return None;
        }
        let value = self.storage_mut::<T>(kind).get_mut(entity.index)?;
        let out = f(value);
        self.notify(entity, observer);
        Some(out)
    }

    /// Snapshot of the kinds attached to `entity`. Empty if unknown.
    pub fn kinds(&self, entity: Entity) -> Vec<ComponentKind> {
        self.record(entity)
            .map(|record| record.kinds.iter().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the components attached to `entity`, in kind order. Empty if unknown.
    pub fn components(&self, entity: Entity) -> Vec<ComponentRef<'_>> {
        let Some(record) = self.record(entity) else {
            return Vec::new();
        };
        record
            .kinds
            .iter()
            .filter_map(|kind| {
                let value = self.storages.get(&kind)?.get_any(entity.index)?;
                Some(ComponentRef {
                    kind,
                    name: self.registry.name(kind).unwrap_or("<unregistered>"),
                    value,
                })
            })
            .collect()
    }

    /// Read-only view of one entity, as matchers see it.
    pub fn entity_ref(&self, entity: Entity) -> EntityRef<'_> {
        match self.record(entity) {
            Some(record) => EntityRef {
                entity,
                kinds: &record.kinds,
                storages: &self.storages,
                registry: &self.registry,
            },
            None => EntityRef::absent(entity, &self.storages, &self.registry),
        }
    }

    /// Views of every known entity.
    pub fn entity_refs(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.records.iter().flatten().map(move |record| EntityRef {
            entity: record.entity,
            kinds: &record.kinds,
            storages: &self.storages,
            registry: &self.registry,
        })
    }

    /// Every entity the store holds a record for.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.records.iter().flatten().map(|record| record.entity)
    }

    pub fn is_known(&self, entity: Entity) -> bool {
        self.record(entity).is_some()
    }

    /// Number of known entities.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for ComponentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {}

    struct Layer(u8);
    impl Component for Layer {}

    struct FileHandle {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Component for FileHandle {
        fn release(&mut self) -> std::result::Result<(), BoxError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("handle already closed".into())
            } else {
                Ok(())
            }
        }
    }

    /// Records each notification as (entity, kind count), or `None` for removal.
    #[derive(Default)]
    struct Recorder {
        events: Vec<(Entity, Option<usize>)>,
    }

    impl MutationObserver for Recorder {
        fn entity_mutated(&mut self, entity: EntityRef<'_>) {
            self.events.push((entity.entity(), Some(entity.kinds().len())));
        }

        fn entity_removed(&mut self, entity: Entity) {
            self.events.push((entity, None));
        }
    }

    #[test]
    fn attach_creates_record_and_notifies() {
        let mut store = ComponentStore::new();
        let mut recorder = Recorder::default();
        let e = Entity::from_raw(2, 0);
        store.attach(e, Position { x: 0.0, y: 0.0 }, &mut recorder).unwrap();
        assert!(store.is_known(e));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get::<Position>(e), Some(&Position { x: 0.0, y: 0.0 }));
        assert_eq!(recorder.events, vec![(e, Some(1))]);
    }

    #[test]
    fn replace_notifies_and_keeps_single_value() {
        let mut store = ComponentStore::new();
        let mut recorder = Recorder::default();
        let e = Entity::from_raw(0, 0);
        store.attach(e, Position { x: 1.0, y: 1.0 }, &mut recorder).unwrap();
        store.attach(e, Position { x: 2.0, y: 2.0 }, &mut recorder).unwrap();
        assert_eq!(store.get::<Position>(e), Some(&Position { x: 2.0, y: 2.0 }));
        assert_eq!(store.kinds(e).len(), 1);
        assert_eq!(store.count::<Position>(), 1);
        assert_eq!(store.count::<Velocity>(), 0);
        assert_eq!(recorder.events.len(), 2);
    }

    #[test]
    fn contains_and_get_absent() {
        let mut store = ComponentStore::new();
        let e = Entity::from_raw(0, 0);
        let kind = store.kind_of::<Velocity>();
        assert!(!store.contains(e, kind));
        assert!(!store.has::<Position>(e));
        assert_eq!(store.get::<Position>(e), None);

        store.attach(e, Position { x: 0.0, y: 0.0 }, &mut ()).unwrap();
        assert!(!store.contains(e, kind));
        assert_eq!(store.get::<Velocity>(e), None);
    }

    #[test]
    fn detach_missing_is_silent() {
        let mut store = ComponentStore::new();
        let mut recorder = Recorder::default();
        let e = Entity::from_raw(0, 0);
        let kind = store.kind_of::<Position>();
        store.detach(e, kind, &mut recorder).unwrap();
        store.detach_component::<Velocity>(e, &mut recorder).unwrap();

        store.attach(e, Velocity { dx: 1.0, dy: 0.0 }, &mut ()).unwrap();
        store.detach(e, kind, &mut recorder).unwrap();
        assert!(recorder.events.is_empty());
        assert!(store.has::<Velocity>(e));
    }

    #[test]
    fn detach_notifies_with_post_state() {
        let mut store = ComponentStore::new();
        let e = Entity::from_raw(0, 0);
        store.attach(e, Position { x: 0.0, y: 0.0 }, &mut ()).unwrap();
        store.attach(e, Velocity { dx: 0.0, dy: 0.0 }, &mut ()).unwrap();

        let mut recorder = Recorder::default();
        store.detach_component::<Position>(e, &mut recorder).unwrap();
        assert_eq!(recorder.events, vec![(e, Some(1))]);
        assert!(!store.has::<Position>(e));
        assert!(store.has::<Velocity>(e));
    }

    #[test]
    fn stale_handle_cannot_attach() {
        let mut store = ComponentStore::new();
        let live = Entity::from_raw(0, 1);
        let stale = Entity::from_raw(0, 0);
        store.register_entity(live, &mut ());
        let err = store.attach(stale, Position { x: 0.0, y: 0.0 }, &mut ());
        assert!(matches!(err, Err(EcsError::DeadEntity(e)) if e == stale));
        assert!(!store.has::<Position>(live));
        assert!(!store.is_known(stale));
    }

    #[test]
    fn snapshots_survive_mutation() {
        let mut store = ComponentStore::new();
        let e = Entity::from_raw(0, 0);
        store.attach(e, Position { x: 0.0, y: 0.0 }, &mut ()).unwrap();
        store.attach(e, Velocity { dx: 0.0, dy: 0.0 }, &mut ()).unwrap();

        let kinds = store.kinds(e);
        for kind in &kinds {
            store.detach(e, *kind, &mut ()).unwrap();
        }
        assert_eq!(kinds.len(), 2);
        assert!(store.kinds(e).is_empty());
        assert!(store.components(Entity::from_raw(9, 0)).is_empty());
    }

    #[test]
    fn components_downcast() {
        let mut store = ComponentStore::new();
        let e = Entity::from_raw(0, 0);
        store.attach(e, Position { x: 3.0, y: 4.0 }, &mut ()).unwrap();
        store.attach(e, Layer(7), &mut ()).unwrap();

        let components = store.components(e);
        assert_eq!(components.len(), 2);
        let pos = components.iter().find_map(|c| c.downcast_ref::<Position>());
        assert_eq!(pos, Some(&Position { x: 3.0, y: 4.0 }));
        assert!(components.iter().any(|c| c.is::<Layer>()));
        assert_eq!(components.iter().find_map(|c| c.downcast_ref::<Layer>()).map(|l| l.0), Some(7));
    }

    #[test]
    fn update_notifies() {
        let mut store = ComponentStore::new();
        let mut recorder = Recorder::default();
        let e = Entity::from_raw(0, 0);
        store.attach(e, Position { x: 0.0, y: 0.0 }, &mut ()).unwrap();
        let out = store.update(e, |p: &mut Position| {
            p.x = 5.0;
            p.x
        }, &mut recorder);
        assert_eq!(out, Some(5.0));
        assert_eq!(store.get::<Position>(e).unwrap().x, 5.0);
        assert_eq!(recorder.events.len(), 1);
        assert_eq!(store.update(e, |_: &mut Velocity| (), &mut recorder), None);
    }

    #[test]
    fn release_runs_on_replace_and_detach() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut store = ComponentStore::new();
        let e = Entity::from_raw(0, 0);
        let handle = || FileHandle {
            closes: closes.clone(),
            fail: false,
        };
        store.attach(e, handle(), &mut ()).unwrap();
        store.attach(e, handle(), &mut ()).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        store.detach_component::<FileHandle>(e, &mut ()).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        store.detach_component::<FileHandle>(e, &mut ()).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn release_failure_propagates_after_mutation() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut store = ComponentStore::new();
        let mut recorder = Recorder::default();
        let e = Entity::from_raw(0, 0);
        store
            .attach(
                e,
                FileHandle {
                    closes: closes.clone(),
                    fail: true,
                },
                &mut (),
            )
            .unwrap();
        let err = store.detach_component::<FileHandle>(e, &mut recorder);
        assert!(matches!(err, Err(EcsError::Release { .. })));
        assert!(!store.has::<FileHandle>(e));
        assert_eq!(recorder.events, vec![(e, Some(0))]);
    }

    #[test]
    fn remove_entity_detaches_leftovers() {
        let mut store = ComponentStore::new();
        let mut recorder = Recorder::default();
        let e = Entity::from_raw(1, 0);
        store.attach(e, Position { x: 0.0, y: 0.0 }, &mut ()).unwrap();
        assert!(store.remove_entity(e, &mut recorder).unwrap());
        assert!(!store.remove_entity(e, &mut recorder).unwrap());
        assert!(!store.is_known(e));
        assert!(store.is_empty());
        assert_eq!(recorder.events, vec![(e, Some(0)), (e, None)]);
        assert_eq!(store.entities().count(), 0);
    }
}
