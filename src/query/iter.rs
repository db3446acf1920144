use {
    super::{ChunkMask, ChunkPlan, EnabledIter, ResolvedChunk, TypeHandle},
    crate::{
        archetype::{Archetype, ArchetypeId, ArchetypeInfo, Chunk},
        entity::Entity,
        error::QueryError,
        registry::TypeRegistry,
    },
    smallvec::SmallVec,
    std::{fmt, vec},
};

/// Counters collected while enumerating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IterStats {
    /// Number of chunks resolved.
    pub resolves: usize,

    /// Number of combined enabled masks computed.
    pub mask_computations: usize,

    /// Number of chunks skipped as empty or unchanged.
    pub skipped_chunks: usize,
}

/// How entities of a chunk are selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChunkSelection {
    Skip,
    Every,
    Masked(ChunkMask),
}

impl ChunkSelection {
    pub fn indices(self, len: usize) -> EnabledIter {
        match self {
            ChunkSelection::Skip => EnabledIter::unconditional(0),
            ChunkSelection::Every => EnabledIter::unconditional(len),
            ChunkSelection::Masked(mask) => EnabledIter::new(mask, len),
        }
    }

    pub fn count(self, len: usize) -> usize {
        match self {
            ChunkSelection::Skip => 0,
            ChunkSelection::Every => len,
            ChunkSelection::Masked(mask) => mask.count_below(len),
        }
    }
}

/// Plans of descriptors matching one archetype.
#[derive(Clone, Debug)]
pub(crate) struct ArchetypePlan {
    pub plans: SmallVec<[ChunkPlan; 1]>,
}

impl ArchetypePlan {
    /// Selects chunk's entities.
    /// Entity is selected if it satisfies any descriptor whose change filter accepts the chunk.
    pub fn select(&self, chunk: &Chunk, since: u64, stats: &mut IterStats) -> ChunkSelection {
        if chunk.is_empty() {
            return ChunkSelection::Skip;
        }

        let mut accepted = self
            .plans
            .iter()
            .filter(|plan| plan.accepts_changes(chunk, since))
            .peekable();

        if accepted.peek().is_none() {
            return ChunkSelection::Skip;
        }

        if self
            .plans
            .iter()
            .any(|plan| plan.mask.is_unconditional() && plan.accepts_changes(chunk, since))
        {
            return ChunkSelection::Every;
        }

        let mask = accepted.fold(ChunkMask::EMPTY, |mask, plan| {
            stats.mask_computations += 1;
            mask | plan.mask.compute(chunk)
        });

        if mask.is_empty() {
            ChunkSelection::Skip
        } else {
            ChunkSelection::Masked(mask)
        }
    }
}

/// Chunk of a matched archetype waiting to be resolved.
pub(crate) struct PendingChunk<'q> {
    pub info: &'q ArchetypeInfo,
    pub plan: &'q ArchetypePlan,
    pub chunk: &'q mut Chunk,
}

/// Collects chunks of matched archetypes in archetype order.
/// `matched` must be sorted.
pub(crate) fn pending_chunks<'q>(
    archetypes: &'q mut [Archetype],
    matched: &'q [ArchetypeId],
    plans: &'q [ArchetypePlan],
) -> Vec<PendingChunk<'q>> {
    let mut pending = Vec::new();
    let mut next = 0;

    for (index, archetype) in archetypes.iter_mut().enumerate() {
        if next == matched.len() {
            break;
        }
        if matched[next].index() != index {
            continue;
        }

        let plan = &plans[next];
        next += 1;

        let Archetype { info, chunks } = archetype;
        let info = &*info;
        pending.extend(chunks.iter_mut().map(|chunk| PendingChunk { info, plan, chunk }));
    }
    pending
}

/// Data shared by all chunks of one enumeration.
#[derive(Clone, Copy)]
pub(crate) struct ChunkContext<'q> {
    pub registry: &'q TypeRegistry,
    pub handle: &'q TypeHandle,
    /// Change filter passes columns written after this version.
    pub since: u64,
    /// Version stamped on columns written by this enumeration.
    pub version: u64,
}

impl<'q> ChunkContext<'q> {
    /// Selects entities and resolves columns of the chunk.
    /// Returns `None` if chunk is skipped.
    pub fn prepare(
        &self,
        pending: PendingChunk<'q>,
        stats: &mut IterStats,
    ) -> Result<Option<(ResolvedChunk<'q>, EnabledIter)>, QueryError> {
        let selection = pending.plan.select(pending.chunk, self.since, stats);
        if selection == ChunkSelection::Skip {
            stats.skipped_chunks += 1;
            return Ok(None);
        }

        let indices = selection.indices(pending.chunk.len());
        let chunk = self
            .handle
            .resolve_chunk(self.registry, pending.info, pending.chunk, self.version)?;
        stats.resolves += 1;
        Ok(Some((chunk, indices)))
    }
}

enum State<'q> {
    NotStarted,
    WithinChunk {
        chunk: ResolvedChunk<'q>,
        indices: EnabledIter,
        current: usize,
    },
    Exhausted,
}

/// Enumerates entities of chunks matched by a query.
///
/// Chunks are visited in archetype creation order, then in storage order.
/// Entities within a chunk are visited in ascending index order.
pub struct QueryEnumerator<'q> {
    context: ChunkContext<'q>,
    chunks: vec::IntoIter<PendingChunk<'q>>,
    state: State<'q>,
    stats: IterStats,
}

impl fmt::Debug for QueryEnumerator<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::NotStarted => "NotStarted",
            State::WithinChunk { .. } => "WithinChunk",
            State::Exhausted => "Exhausted",
        };
        fmt.debug_struct("QueryEnumerator")
            .field("state", &state)
            .field("pending_chunks", &self.chunks.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<'q> QueryEnumerator<'q> {
    pub(crate) fn new(context: ChunkContext<'q>, chunks: Vec<PendingChunk<'q>>) -> Self {
        QueryEnumerator {
            context,
            chunks: chunks.into_iter(),
            state: State::NotStarted,
            stats: IterStats::default(),
        }
    }

    /// Advances to the next selected entity.
    /// Returns false once all chunks are visited, and on every call afterwards.
    pub fn move_next(&mut self) -> bool {
        loop {
            match &mut self.state {
                State::Exhausted => return false,
                State::WithinChunk {
                    indices, current, ..
                } => {
                    if let Some(index) = indices.next() {
                        *current = index;
                        return true;
                    }
                }
                State::NotStarted => {}
            }

            let pending = match self.chunks.next() {
                Some(pending) => pending,
                None => {
                    self.state = State::Exhausted;
                    return false;
                }
            };

            match self.context.prepare(pending, &mut self.stats) {
                Ok(None) => {}
                Ok(Some((chunk, mut indices))) => {
                    if let Some(current) = indices.next() {
                        self.state = State::WithinChunk {
                            chunk,
                            indices,
                            current,
                        };
                        return true;
                    }
                }
                Err(err) => {
                    log::error!("Failed to resolve chunk: {}", err);
                    self.state = State::Exhausted;
                    return false;
                }
            }
        }
    }

    /// Returns index of current entity in its chunk and the resolved chunk.
    pub fn current(&mut self) -> Result<(usize, &mut ResolvedChunk<'q>), QueryError> {
        match &mut self.state {
            State::WithinChunk { chunk, current, .. } => Ok((*current, chunk)),
            _ => {
                log::error!("`current` called on enumerator not positioned at an entity");
                Err(QueryError::InvalidIteratorState)
            }
        }
    }

    /// Returns current entity.
    pub fn entity(&self) -> Result<Entity, QueryError> {
        match &self.state {
            State::WithinChunk { chunk, current, .. } => Ok(chunk.entities()[*current]),
            _ => Err(QueryError::InvalidIteratorState),
        }
    }

    pub fn stats(&self) -> IterStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            query::{EntityQuery, IterMode, QueryOptions},
            world::World,
        },
        std::sync::Arc,
    };

    #[derive(Debug, PartialEq)]
    struct Position(u32);

    #[derive(Debug, PartialEq)]
    struct Velocity(u32);

    fn world(capacity: usize) -> World {
        let registry = TypeRegistry::builder()
            .register_enableable::<Position>()
            .register::<Velocity>()
            .build()
            .unwrap();
        World::builder(Arc::new(registry))
            .chunk_capacity(capacity)
            .build()
    }

    fn collect(query: &mut EntityQuery, world: &mut World) -> Vec<u32> {
        let mut values = Vec::new();
        let mut iter = query.iter(world).unwrap();
        while iter.move_next() {
            let (index, chunk) = iter.current().unwrap();
            values.push(chunk.get::<Velocity>(index).unwrap().0);
        }
        values
    }

    #[test]
    fn current_requires_position() {
        let mut world = world(4);
        world.spawn((Velocity(1),)).unwrap();
        let mut query = world.query().with_all::<Velocity>().build().unwrap();

        let mut iter = query.iter(&mut world).unwrap();
        assert_eq!(iter.current().err(), Some(QueryError::InvalidIteratorState));
        assert_eq!(iter.entity(), Err(QueryError::InvalidIteratorState));
        assert!(iter.move_next());
        assert!(iter.current().is_ok());
        assert!(!iter.move_next());
        assert_eq!(iter.current().err(), Some(QueryError::InvalidIteratorState));
        assert!(!iter.move_next());
    }

    #[test]
    fn visits_chunks_in_storage_order() {
        let mut world = world(3);
        world.spawn_batch((0..8).map(|i| (Velocity(i),))).unwrap();
        let mut query = world.query().with_all::<Velocity>().build().unwrap();

        assert_eq!(collect(&mut query, &mut world), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let mut world = world(2);
        let entities = world
            .spawn_batch((0..4).map(|i| (Velocity(i),)))
            .unwrap();
        world.despawn(entities[0]).unwrap();
        world.despawn(entities[1]).unwrap();

        let mut query = world.query().with_all::<Velocity>().build().unwrap();
        let mut iter = query.iter(&mut world).unwrap();
        let mut seen = Vec::new();
        while iter.move_next() {
            seen.push(iter.entity().unwrap());
        }
        assert_eq!(seen, &entities[2..]);
        assert_eq!(iter.stats().resolves, 1);
        assert_eq!(iter.stats().skipped_chunks, 1);
    }

    #[test]
    fn dense_masks_use_ranges() {
        let mut world = world(128);
        let entities = world
            .spawn_batch((0..100).map(|i| (Position(i), Velocity(i))))
            .unwrap();
        for &e in &entities[40..60] {
            world.set_enabled::<Position>(e, false).unwrap();
        }

        let mut query = world.query().with_all::<Position>().build().unwrap();
        let mut modes = Vec::new();
        query
            .for_each_chunk(&mut world, |_, indices| modes.push(indices.mode()))
            .unwrap();
        assert_eq!(modes, [IterMode::Ranges]);
        assert_eq!(query.calculate_entity_count(&world), Ok(80));

        let mut ignoring = world
            .query()
            .with_all::<Position>()
            .with_options(QueryOptions::IGNORE_COMPONENT_ENABLED_STATE)
            .build()
            .unwrap();
        assert_eq!(ignoring.calculate_entity_count(&world), Ok(100));
    }
}
