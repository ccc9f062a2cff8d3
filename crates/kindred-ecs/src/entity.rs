use std::fmt;
use std::marker::PhantomData;

/// A generational entity handle. Uses compact u32 index + generation so a released
/// handle can never alias whatever entity later reuses its slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Entity {
    /// Create an entity from raw parts (mainly for testing).
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot index of this entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation of this entity (incremented on reuse).
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Handles built from a slot index plus a generation counter.
pub(crate) trait SlotKey: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn slot(&self) -> u32;
    fn slot_generation(&self) -> u32;
}

impl SlotKey for Entity {
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

/// Allocates and recycles slots with generational tracking.
pub(crate) struct SlotAllocator<K> {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_list: Vec<u32>,
    len: usize,
    _key: PhantomData<fn() -> K>,
}

/// Allocator for entity handles.
pub(crate) type EntityAllocator = SlotAllocator<Entity>;

impl<K: SlotKey> SlotAllocator<K> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            alive: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Allocate a new key, reusing a freed slot if available.
    pub fn allocate(&mut self) -> K {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            self.alive[index as usize] = true;
            K::from_parts(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            K::from_parts(index, 0)
        }
    }

    /// Deallocate a key. Returns `true` if it was alive.
    pub fn deallocate(&mut self, key: K) -> bool {
        if !self.is_alive(key) {
            return false;
        }
        let idx = key.slot() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_list.push(key.slot());
        self.len -= 1;
        true
    }

    /// Check if a key is currently alive.
    pub fn is_alive(&self, key: K) -> bool {
        let idx = key.slot() as usize;
        idx < self.alive.len() && self.alive[idx] && self.generations[idx] == key.slot_generation()
    }

    /// Iterate over every currently alive key, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(idx, _)| K::from_parts(idx as u32, self.generations[idx]))
    }

    /// Number of currently alive keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no alive keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<K: SlotKey> Default for SlotAllocator<K> {
    fn default() -> Self {
        Self::new()
    }
}
