//! Component kinds: the small integer ids that key component storage, and the
//! bitset signatures built from them.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::component::Component;

/// Identifier of one component category, assigned by a [`KindRegistry`].
///
/// Kinds are only meaningful for the registry (and so the world) that issued them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKind(pub(crate) u32);

impl ComponentKind {
    /// The raw numeric id.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", self.0)
    }
}

/// Maps Rust component types to dense [`ComponentKind`] ids.
#[derive(Default)]
pub struct KindRegistry {
    ids: HashMap<TypeId, ComponentKind>,
    names: Vec<&'static str>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the kind for `T`, assigning the next free id on first use.
    pub fn register<T: Component>(&mut self) -> ComponentKind {
        if let Some(kind) = self.ids.get(&TypeId::of::<T>()) {
            return *kind;
        }
        let kind = ComponentKind(self.names.len() as u32);
        self.ids.insert(TypeId::of::<T>(), kind);
        self.names.push(type_name::<T>());
        kind
    }

    /// The kind for `T`, if it was ever registered.
    pub fn lookup<T: Component>(&self) -> Option<ComponentKind> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    /// Type name recorded for a kind.
    pub fn name(&self, kind: ComponentKind) -> Option<&'static str> {
        self.names.get(kind.0 as usize).copied()
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

const WORD_BITS: u32 = u64::BITS;

/// A set of component kinds, stored as a bitset.
///
/// Trailing zero words are never kept, so two sets holding the same kinds
/// always compare equal.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct KindSet {
    pub(crate) words: Vec<u64>,
}

impl KindSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn split(kind: ComponentKind) -> (usize, u64) {
        ((kind.0 / WORD_BITS) as usize, 1u64 << (kind.0 % WORD_BITS))
    }

    /// Add a kind. Returns `true` if it was not already present.
    pub fn insert(&mut self, kind: ComponentKind) -> bool {
        let (word, bit) = Self::split(kind);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let added = self.words[word] & bit == 0;
        self.words[word] |= bit;
        added
    }

    /// Remove a kind. Returns `true` if it was present.
    pub fn remove(&mut self, kind: ComponentKind) -> bool {
        let (word, bit) = Self::split(kind);
        let Some(slot) = self.words.get_mut(word) else {
            return false;
        };
        let removed = *slot & bit != 0;
        *slot &= !bit;
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
        removed
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        let (word, bit) = Self::split(kind);
        self.words.get(word).map_or(false, |w| w & bit != 0)
    }

    /// Whether every kind in `other` is also in `self`.
    pub fn contains_all(&self, other: &KindSet) -> bool {
        other.words.iter().enumerate().all(|(i, &theirs)| {
            let ours = self.words.get(i).copied().unwrap_or(0);
            ours & theirs == theirs
        })
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterate kinds in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| ComponentKind(i as u32 * WORD_BITS + bit))
        })
    }
}

impl FromIterator<ComponentKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        let mut set = KindSet::new();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Tuples of component types, used to build "has all of these" queries.
pub trait ComponentTuple {
    /// Register every type in the tuple and return their kinds.
    fn kinds(registry: &mut KindRegistry) -> KindSet;
}

impl ComponentTuple for () {
    fn kinds(_registry: &mut KindRegistry) -> KindSet {
        KindSet::new()
    }
}

macro_rules! impl_component_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentTuple for ($($name,)+) {
            fn kinds(registry: &mut KindRegistry) -> KindSet {
                let mut set = KindSet::new();
                $(set.insert(registry.register::<$name>());)+
                set
            }
        }
    };
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);
impl_component_tuple!(A, B, C, D, E);
impl_component_tuple!(A, B, C, D, E, F);
impl_component_tuple!(A, B, C, D, E, F, G);
impl_component_tuple!(A, B, C, D, E, F, G, H);
