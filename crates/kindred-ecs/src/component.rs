use std::any::Any;

use crate::error::BoxError;

/// Trait for types that can be stored as ECS components.
///
/// Implemented explicitly per type (`impl Component for Position {}`).
/// Components that own resources needing explicit cleanup (file handles,
/// native handles, pooled buffers) override [`release`]: the store calls it
/// exactly once on every value before dropping it, whether the value is being
/// replaced, detached, or released together with its entity.
///
/// [`release`]: Component::release
pub trait Component: 'static + Send + Sync {
    fn release(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Type-erased component storage interface.
pub(crate) trait ComponentStorage: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Remove the component for an entity index, releasing it first.
    ///
    /// Returns `Ok(false)` if nothing was stored. The value is removed and
    /// dropped even when its release fails.
    fn remove(&mut self, index: u32) -> Result<bool, BoxError>;
    fn get_any(&self, index: u32) -> Option<&dyn Any>;
}

/// Sparse-set storage for a single component type. Provides O(1) insert/remove/lookup
/// and dense iteration.
pub(crate) struct SparseSet<T> {
    /// Maps entity index → dense index. `None` means the entity has no component.
    sparse: Vec<Option<usize>>,
    /// Packed component values.
    dense: Vec<T>,
    /// Entity indices corresponding to each dense slot (for iteration).
    entities: Vec<u32>,
}

impl<T: Component> SparseSet<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Insert or replace a component for the given entity index.
    ///
    /// Returns `Ok(true)` when a previous value was replaced. The previous value
    /// is released before it is dropped; if that fails the new value is still
    /// stored and the release error is returned.
    pub fn insert(&mut self, index: u32, value: T) -> Result<bool, BoxError> {
        let idx = index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        if let Some(dense_idx) = self.sparse[idx] {
            let mut old = std::mem::replace(&mut self.dense[dense_idx], value);
            old.release()?;
            Ok(true)
        } else {
            let dense_idx = self.dense.len();
            self.sparse[idx] = Some(dense_idx);
            self.dense.push(value);
            self.entities.push(index);
            Ok(false)
        }
    }

    /// Get an immutable reference to the component for an entity.
    pub fn get(&self, index: u32) -> Option<&T> {
        let idx = index as usize;
        self.sparse
            .get(idx)
            .and_then(|s| s.map(|dense_idx| &self.dense[dense_idx]))
    }

    /// Get a mutable reference to the component for an entity.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        let idx = index as usize;
        self.sparse
            .get(idx)
            .and_then(|s| s.map(|dense_idx| &mut self.dense[dense_idx]))
    }

    /// Number of components stored.
    pub fn len(&self) -> usize {
        self.dense.len()
    }
}

impl<T: Component> ComponentStorage for SparseSet<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, index: u32) -> Result<bool, BoxError> {
        let idx = index as usize;
        let Some(dense_idx) = self.sparse.get(idx).copied().flatten() else {
            return Ok(false);
        };
        self.sparse[idx] = None;

        // Swap-remove: the last element moves into the freed slot.
        let mut value = self.dense.swap_remove(dense_idx);
        self.entities.swap_remove(dense_idx);
        if let Some(&moved) = self.entities.get(dense_idx) {
            self.sparse[moved as usize] = Some(dense_idx);
        }
        value.release()?;
        Ok(true)
    }

    fn get_any(&self, index: u32) -> Option<&dyn Any> {
        self.get(index).map(|value| value as &dyn Any)
    }
}
