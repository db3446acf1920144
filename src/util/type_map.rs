use {
    crate::{component::ComponentId, util::NoOpHasher},
    core::{any::TypeId, hash::BuildHasherDefault},
    hashbrown::HashMap,
};

/// HashMap that utilize the fact that `TypeId`s are already hashed.
pub type TypeIdMap<T> = HashMap<TypeId, T, BuildHasherDefault<NoOpHasher>>;

/// HashMap keyed by sorted component id lists.
pub type ComponentIdListMap<T> = HashMap<Box<[ComponentId]>, T>;
