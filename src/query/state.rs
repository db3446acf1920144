use {
    super::{
        iter::{pending_chunks, ArchetypePlan, ChunkContext, ChunkSelection, PendingChunk},
        ArchetypeQueryDescriptor, EnabledIter, IterStats, JobDependencies, NoDependencies,
        QueryBuilder, QueryEnumerator, ResolvedChunk, TypeHandle,
    },
    crate::{
        archetype::{ArchetypeId, ArchetypeInfo, Chunk},
        entity::Entity,
        error::QueryError,
        registry::TypeRegistry,
        world::World,
    },
    smallvec::SmallVec,
    std::sync::Arc,
};

/// Query over entities of a world.
///
/// Caches archetypes matching any of its descriptors.
/// Cache is refreshed incrementally as new archetypes appear.
#[derive(Debug)]
pub struct EntityQuery {
    registry: Arc<TypeRegistry>,
    descriptors: SmallVec<[ArchetypeQueryDescriptor; 1]>,
    handle: TypeHandle,

    /// World the cache was built for.
    world: Option<u64>,
    /// Number of world archetypes already checked.
    checked_archetypes: usize,
    /// Matched archetypes in creation order.
    matched: Vec<ArchetypeId>,
    /// Plan for each matched archetype.
    plans: Vec<ArchetypePlan>,

    last_change_version: u64,
}

impl EntityQuery {
    pub fn builder(registry: Arc<TypeRegistry>) -> QueryBuilder {
        QueryBuilder::new(registry)
    }

    /// Creates query matching archetypes that match any of descriptors.
    pub fn new(
        registry: Arc<TypeRegistry>,
        descriptors: impl IntoIterator<Item = ArchetypeQueryDescriptor>,
    ) -> Result<Self, QueryError> {
        let descriptors: SmallVec<[_; 1]> = descriptors.into_iter().collect();
        if descriptors.is_empty() {
            return Err(QueryError::invalid("Query has no descriptors"));
        }

        let handle = TypeHandle::for_descriptors(&descriptors);
        log::trace!(
            "New query with {} descriptors accessing {} types",
            descriptors.len(),
            handle.refs().len()
        );

        Ok(EntityQuery {
            registry,
            descriptors,
            handle,
            world: None,
            checked_archetypes: 0,
            matched: Vec::new(),
            plans: Vec::new(),
            last_change_version: 0,
        })
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn descriptors(&self) -> &[ArchetypeQueryDescriptor] {
        &self.descriptors
    }

    pub fn handle(&self) -> &TypeHandle {
        &self.handle
    }

    /// World change version assigned to last enumeration.
    /// Columns written by later enumerations or through the world carry greater versions.
    pub fn last_change_version(&self) -> u64 {
        self.last_change_version
    }

    /// Makes change filter accept every chunk on next enumeration.
    pub fn reset_change_filter(&mut self) {
        self.last_change_version = 0;
    }

    /// Checks if archetype matches any of descriptors.
    pub fn matches_archetype(&self, archetype: &ArchetypeInfo) -> bool {
        self.descriptors.iter().any(|d| d.matches(archetype))
    }

    /// Returns matched archetypes in creation order.
    pub fn matched_archetypes(&mut self, world: &World) -> Result<&[ArchetypeId], QueryError> {
        self.refresh(world)?;
        Ok(&self.matched)
    }

    fn refresh(&mut self, world: &World) -> Result<(), QueryError> {
        if !Arc::ptr_eq(&self.registry, world.registry()) {
            log::error!("Query is used with world of another registry");
            return Err(QueryError::invalid(
                "Query and world use different registries",
            ));
        }

        if self.world != Some(world.id()) {
            self.world = Some(world.id());
            self.checked_archetypes = 0;
            self.matched.clear();
            self.plans.clear();
            self.last_change_version = 0;
        }

        let archetypes = world.archetypes();
        for archetype in &archetypes[self.checked_archetypes..] {
            let info = archetype.info();
            let plans: SmallVec<[_; 1]> = self
                .descriptors
                .iter()
                .filter(|d| d.matches(info))
                .map(|d| d.chunk_plan(info))
                .collect();

            if !plans.is_empty() {
                log::trace!("Query matched {:?}", info);
                self.matched.push(info.id());
                self.plans.push(ArchetypePlan { plans });
            }
        }
        self.checked_archetypes = archetypes.len();
        Ok(())
    }

    fn for_each_selected(
        &mut self,
        world: &World,
        mut f: impl FnMut(&Chunk, ChunkSelection),
    ) -> Result<(), QueryError> {
        self.refresh(world)?;

        let mut stats = IterStats::default();
        for (id, plan) in self.matched.iter().zip(&self.plans) {
            for chunk in world.archetypes()[id.index()].chunks() {
                f(chunk, plan.select(chunk, self.last_change_version, &mut stats));
            }
        }
        Ok(())
    }

    /// Counts entities the next enumeration would visit.
    pub fn calculate_entity_count(&mut self, world: &World) -> Result<usize, QueryError> {
        let mut count = 0;
        self.for_each_selected(world, |chunk, selection| {
            count += selection.count(chunk.len())
        })?;
        Ok(count)
    }

    pub fn is_empty(&mut self, world: &World) -> Result<bool, QueryError> {
        Ok(self.calculate_entity_count(world)? == 0)
    }

    /// Collects entities the next enumeration would visit.
    pub fn to_entity_vec(&mut self, world: &World) -> Result<Vec<Entity>, QueryError> {
        let mut entities = Vec::new();
        self.for_each_selected(world, |chunk, selection| {
            let chunk_entities = chunk.entities();
            entities.extend(
                selection
                    .indices(chunk.len())
                    .map(|index| chunk_entities[index]),
            );
        })?;
        Ok(entities)
    }

    /// Refreshes cache, completes dependencies and updates handle.
    fn begin<'q>(
        &'q mut self,
        world: &'q mut World,
        dependencies: &dyn JobDependencies,
    ) -> Result<(ChunkContext<'q>, Vec<PendingChunk<'q>>), QueryError> {
        self.refresh(world)?;
        self.handle.complete_dependencies(dependencies);
        self.handle.update(world);
        let version = world.bump_change_version();
        let since = std::mem::replace(&mut self.last_change_version, version);

        let this: &'q EntityQuery = self;
        let (registry, archetypes, _) = world.split_mut();
        let chunks = pending_chunks(archetypes, &this.matched, &this.plans);

        Ok((
            ChunkContext {
                registry,
                handle: &this.handle,
                since,
                version,
            },
            chunks,
        ))
    }

    /// Starts enumeration without job dependencies.
    pub fn iter<'q>(&'q mut self, world: &'q mut World) -> Result<QueryEnumerator<'q>, QueryError> {
        self.iter_with(world, &NoDependencies)
    }

    /// Starts enumeration.
    /// Dependencies of accessed types are completed before first chunk is resolved.
    pub fn iter_with<'q>(
        &'q mut self,
        world: &'q mut World,
        dependencies: &dyn JobDependencies,
    ) -> Result<QueryEnumerator<'q>, QueryError> {
        let (context, chunks) = self.begin(world, dependencies)?;
        Ok(QueryEnumerator::new(context, chunks))
    }

    /// Calls `f` for each chunk with entities to visit.
    pub fn for_each_chunk<F>(&mut self, world: &mut World, f: F) -> Result<IterStats, QueryError>
    where
        F: FnMut(&mut ResolvedChunk<'_>, EnabledIter),
    {
        self.for_each_chunk_with(world, &NoDependencies, f)
    }

    pub fn for_each_chunk_with<F>(
        &mut self,
        world: &mut World,
        dependencies: &dyn JobDependencies,
        mut f: F,
    ) -> Result<IterStats, QueryError>
    where
        F: FnMut(&mut ResolvedChunk<'_>, EnabledIter),
    {
        let (context, chunks) = self.begin(world, dependencies)?;
        let mut stats = IterStats::default();
        for pending in chunks {
            if let Some((mut chunk, indices)) = context.prepare(pending, &mut stats)? {
                f(&mut chunk, indices);
            }
        }
        Ok(stats)
    }

    /// Calls `f` for each chunk with entities to visit on rayon worker threads.
    /// Chunks are never split between workers.
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    pub fn par_for_each_chunk<F>(
        &mut self,
        world: &mut World,
        dependencies: &dyn JobDependencies,
        f: F,
    ) -> Result<(), QueryError>
    where
        F: Fn(&mut ResolvedChunk<'_>, EnabledIter) + Send + Sync,
    {
        use rayon::prelude::*;

        let (context, chunks) = self.begin(world, dependencies)?;
        log::trace!("Running query over {} chunks on rayon", chunks.len());

        chunks.into_par_iter().try_for_each(|pending| {
            let mut stats = IterStats::default();
            if let Some((mut chunk, indices)) = context.prepare(pending, &mut stats)? {
                f(&mut chunk, indices);
            }
            Ok(())
        })
    }
}
