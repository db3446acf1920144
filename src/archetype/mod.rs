mod chunk;

pub use self::chunk::*;

use {
    crate::{
        component::{ComponentId, ComponentInfo},
        query::CHUNK_MASK_BITS,
        util::Punctuated,
    },
    std::fmt,
};

/// Chunk capacity used when `WorldBuilder` doesn't override it.
pub fn default_chunk_capacity() -> usize {
    std::option_env!("SIEVE_CHUNK_CAPACITY")
        .and_then(|s| s.parse().ok())
        .unwrap_or(CHUNK_MASK_BITS)
        .clamp(1, CHUNK_MASK_BITS)
}

/// Index of archetype in world's insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Defines set of components shared by all entities of an archetype.
#[derive(Clone)]
pub struct ArchetypeInfo {
    id: ArchetypeId,

    /// Information about each component in the archetype.
    /// Sorted by id.
    components: Box<[ComponentInfo]>,

    /// Maximum number of entities fit in one chunk.
    chunk_capacity: usize,
}

impl fmt::Debug for ArchetypeInfo {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "Archetype {:?} [{}]",
            self.id,
            Punctuated(self.components.iter().map(|c| c.name()))
        )
    }
}

impl ArchetypeInfo {
    /// Create archetype info for specified set of components.
    ///
    /// # Panics
    ///
    /// This function panics if array of components is not sorted or contains duplicates.
    pub(crate) fn new(id: ArchetypeId, components: Box<[ComponentInfo]>, chunk_capacity: usize) -> Self {
        assert!(
            components.windows(2).all(|w| w[0].id() < w[1].id()),
            "components must be sorted and unique",
        );
        assert!(chunk_capacity > 0 && chunk_capacity <= CHUNK_MASK_BITS);

        ArchetypeInfo {
            id,
            components,
            chunk_capacity,
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    /// Returns an iterator over component ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + Clone + '_ {
        self.components.iter().map(|c| c.id())
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Returns column position of the component.
    /// Returns `None` if archetype doesn't have specified component.
    pub fn position(&self, component: ComponentId) -> Option<usize> {
        self.components
            .binary_search_by_key(&component, |c| c.id())
            .ok()
    }

    /// Returns true if archetype has specified component.
    pub fn has(&self, component: ComponentId) -> bool {
        self.position(component).is_some()
    }

    /// Returns true if archetype has specified component and it is enableable.
    pub fn has_enableable(&self, component: ComponentId) -> bool {
        self.position(component)
            .map_or(false, |p| self.components[p].is_enableable())
    }

    /// Checks if archetype matches specified components set exactly.
    /// `components` iterator SHOULD yield components in ascending order.
    pub fn is(&self, mut components: impl Iterator<Item = ComponentId>) -> bool {
        self.components
            .iter()
            .all(|c| Some(c.id()) == components.next())
            && components.next().is_none()
    }

    pub(crate) fn new_chunk(&self) -> Chunk {
        Chunk::new(
            self.chunk_capacity,
            self.components
                .iter()
                .map(|c| c.new_column(self.chunk_capacity)),
        )
    }
}

/// Archetype stores all entities with same set of components.
/// They are created on demand when first entity with particular components set is spawned.
#[derive(Debug)]
pub struct Archetype {
    pub(crate) info: ArchetypeInfo,

    /// Chunks storing entities of this archetype.
    pub(crate) chunks: Vec<Chunk>,
}

impl Archetype {
    pub(crate) fn new(info: ArchetypeInfo) -> Self {
        log::trace!("New {:?}", info);
        Archetype {
            info,
            chunks: Vec::new(),
        }
    }

    pub fn info(&self) -> &ArchetypeInfo {
        &self.info
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of entities in this archetype.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Chunk::is_empty)
    }

    /// Returns index of chunk with free slot, allocating one when all are full.
    pub(crate) fn chunk_for_insert(&mut self) -> usize {
        match self.chunks.iter().rposition(|c| !c.is_full()) {
            Some(index) => index,
            None => {
                self.chunks.push(self.info.new_chunk());
                self.chunks.len() - 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::registry::TypeRegistry};

    struct A;
    struct B(u32);
    struct C(u64);

    fn archetype_info(registry: &TypeRegistry, mut ids: Vec<ComponentId>) -> ArchetypeInfo {
        ids.sort();
        let components = ids
            .iter()
            .map(|&id| *registry.info(id).unwrap())
            .collect::<Box<[_]>>();
        ArchetypeInfo::new(ArchetypeId(0), components, 16)
    }

    #[test]
    fn positions_follow_ids() {
        let registry = TypeRegistry::builder()
            .register::<A>()
            .register_enableable::<B>()
            .register::<C>()
            .build()
            .unwrap();
        let a = registry.id_of::<A>().unwrap();
        let b = registry.id_of::<B>().unwrap();
        let c = registry.id_of::<C>().unwrap();

        let info = archetype_info(&registry, vec![c, a]);
        assert_eq!(info.position(a), Some(0));
        assert_eq!(info.position(c), Some(1));
        assert_eq!(info.position(b), None);
        assert!(info.is(vec![a, c].into_iter()));
        assert!(!info.is(vec![a].into_iter()));

        let info = archetype_info(&registry, vec![b]);
        assert!(info.has_enableable(b));
        assert!(!info.has_enableable(a));
    }

    #[test]
    fn chunk_columns_match_components() {
        let registry = TypeRegistry::builder()
            .register::<B>()
            .register::<C>()
            .build()
            .unwrap();
        let b = registry.id_of::<B>().unwrap();
        let c = registry.id_of::<C>().unwrap();
        let info = archetype_info(&registry, vec![b, c]);

        let chunk = info.new_chunk();
        assert_eq!(chunk.capacity(), 16);
        assert!(chunk.is_empty());
        assert!(chunk.column::<B>(0).is_some());
        assert!(chunk.column::<C>(0).is_none());
        assert!(chunk.column::<C>(1).is_some());
    }
}
