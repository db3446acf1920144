use {
    crate::{
        archetype::{default_chunk_capacity, Archetype, ArchetypeId, ArchetypeInfo, Chunk},
        bundle::{sorted_ids, Bundle},
        component::{Component, ComponentId, ComponentInfo},
        entity::{Entity, EntityLocations, Location},
        error::QueryError,
        query::{QueryBuilder, CHUNK_MASK_BITS},
        registry::{self, TypeRegistry},
        util::ComponentIdListMap,
    },
    std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(0);

/// Configures and creates [`World`].
#[derive(Debug)]
pub struct WorldBuilder {
    registry: Arc<TypeRegistry>,
    chunk_capacity: usize,
}

impl WorldBuilder {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        WorldBuilder {
            registry,
            chunk_capacity: default_chunk_capacity(),
        }
    }

    /// Overrides number of entities per chunk.
    /// Value is clamped to `1..=128`.
    pub fn chunk_capacity(mut self, capacity: usize) -> Self {
        let clamped = capacity.clamp(1, CHUNK_MASK_BITS);
        if clamped != capacity {
            log::warn!(
                "Chunk capacity {} is out of range, using {}",
                capacity,
                clamped
            );
        }
        self.chunk_capacity = clamped;
        self
    }

    pub fn build(self) -> World {
        World {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            registry: self.registry,
            archetypes: Vec::new(),
            archetype_map: ComponentIdListMap::default(),
            entities: EntityLocations::new(),
            chunk_capacity: self.chunk_capacity,
            tick: 1,
            change_version: 0,
        }
    }
}

/// World is container for entities.
///
/// Entities are stored in archetypes, which are created when first entity
/// with particular set of components is spawned.
/// World never moves entities between archetypes.
#[derive(Debug)]
pub struct World {
    id: u64,
    registry: Arc<TypeRegistry>,
    archetypes: Vec<Archetype>,
    archetype_map: ComponentIdListMap<ArchetypeId>,
    entities: EntityLocations,
    chunk_capacity: usize,
    tick: u64,
    /// Bumped by every write and every enumeration start.
    change_version: u64,
}

impl World {
    /// Create new empty `World` with default configuration.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        WorldBuilder::new(registry).build()
    }

    pub fn builder(registry: Arc<TypeRegistry>) -> WorldBuilder {
        WorldBuilder::new(registry)
    }

    /// Create new empty `World` using process-wide registry.
    pub fn with_global_registry() -> Result<Self, QueryError> {
        Ok(World::new(registry::global()?))
    }

    /// Returns unique id of this world.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Returns query builder bound to world's registry.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.registry.clone())
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Returns current tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Starts new logical step.
    /// Handles must be updated again before resolving chunks.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns latest change version stamped on columns.
    pub fn change_version(&self) -> u64 {
        self.change_version
    }

    /// Returns new change version, greater than any version stamped before.
    pub(crate) fn bump_change_version(&mut self) -> u64 {
        self.change_version += 1;
        self.change_version
    }

    /// Returns all archetypes in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Number of alive entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.len() == 0
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.get(entity).is_some()
    }

    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.entities.get(entity)
    }

    /// Spawn new entity with components from `Bundle`.
    /// All components of new entity are enabled.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Result<Entity, QueryError> {
        let ids = B::component_ids(&self.registry)?;
        let archetype = self.archetype_for(&ids)?;
        self.tick += 1;
        let version = self.bump_change_version();
        Ok(self.insert(archetype, &ids, bundle, version))
    }

    /// Spawn entities with components from each bundle in the iterator.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<Entity>, QueryError>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let ids = B::component_ids(&self.registry)?;
        let archetype = self.archetype_for(&ids)?;
        self.tick += 1;
        let version = self.bump_change_version();

        let bundles = bundles.into_iter();
        let mut spawned = Vec::with_capacity(bundles.size_hint().0);
        for bundle in bundles {
            spawned.push(self.insert(archetype, &ids, bundle, version));
        }
        Ok(spawned)
    }

    /// Despawn an entity dropping all its components.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), QueryError> {
        let location = self.entities.despawn(entity).ok_or(QueryError::NoSuchEntity)?;
        self.tick += 1;
        let version = self.bump_change_version();

        let chunk = &mut self.archetypes[location.archetype.index()].chunks[location.chunk as usize];
        if let Some(moved) = chunk.swap_remove(location.index as usize, version) {
            self.entities.relocate(moved, location);
        }
        Ok(())
    }

    /// Returns component of specified entity.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, QueryError> {
        let id = self.registry.id_of::<T>()?;
        let (archetype, chunk, index) = self.locate(entity)?;
        let position = archetype
            .position(id)
            .ok_or(QueryError::MissingComponent(id))?;
        chunk
            .column::<T>(position)
            .and_then(|column| column.get(index))
            .ok_or(QueryError::MissingComponent(id))
    }

    /// Returns mutable component of specified entity.
    /// Bumps change version of the component's column.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, QueryError> {
        let id = self.registry.id_of::<T>()?;
        let version = self.bump_change_version();
        let (position, chunk, index) = self.locate_component_mut(entity, id)?;
        chunk.touch(position, version);
        chunk
            .column_mut::<T>(position)
            .and_then(|column| column.as_mut_slice().get_mut(index))
            .ok_or(QueryError::MissingComponent(id))
    }

    /// Returns true if entity's component is enabled.
    /// Components that are not enableable are always enabled.
    pub fn is_enabled<T: Component>(&self, entity: Entity) -> Result<bool, QueryError> {
        let id = self.registry.id_of::<T>()?;
        let (archetype, chunk, index) = self.locate(entity)?;
        let position = archetype
            .position(id)
            .ok_or(QueryError::MissingComponent(id))?;

        if archetype.components()[position].is_enableable() {
            Ok(chunk.enabled_mask(position).get(index))
        } else {
            Ok(true)
        }
    }

    /// Enables or disables entity's component.
    /// Entity stays in its archetype.
    pub fn set_enabled<T: Component>(
        &mut self,
        entity: Entity,
        enabled: bool,
    ) -> Result<(), QueryError> {
        let id = self.registry.id_of::<T>()?;
        if !self.registry.is_enableable(id) {
            log::error!("Attempt to toggle component `{}` that is not enableable", T::type_name());
            return Err(QueryError::invalid(format!(
                "Component `{}` is not enableable",
                T::type_name()
            )));
        }

        let (position, chunk, index) = self.locate_component_mut(entity, id)?;
        chunk.set_enabled(position, index, enabled);
        Ok(())
    }

    /// Returns registry, archetypes and current tick
    /// borrowed separately for enumeration.
    pub(crate) fn split_mut(&mut self) -> (&TypeRegistry, &mut [Archetype], u64) {
        (&*self.registry, self.archetypes.as_mut_slice(), self.tick)
    }

    /// Returns archetype and chunk holding the entity, and index in the chunk.
    pub(crate) fn locate(&self, entity: Entity) -> Result<(&ArchetypeInfo, &Chunk, usize), QueryError> {
        let location = self.entities.get(entity).ok_or(QueryError::NoSuchEntity)?;
        let archetype = &self.archetypes[location.archetype.index()];
        Ok((
            &archetype.info,
            &archetype.chunks[location.chunk as usize],
            location.index as usize,
        ))
    }

    /// Returns column position, chunk and index of entity's component.
    pub(crate) fn locate_component_mut(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Result<(usize, &mut Chunk, usize), QueryError> {
        let location = self.entities.get(entity).ok_or(QueryError::NoSuchEntity)?;
        let archetype = &mut self.archetypes[location.archetype.index()];
        let position = archetype
            .info
            .position(id)
            .ok_or(QueryError::MissingComponent(id))?;
        Ok((
            position,
            &mut archetype.chunks[location.chunk as usize],
            location.index as usize,
        ))
    }

    /// Finds or creates archetype for the bundle ids.
    fn archetype_for(&mut self, ids: &[ComponentId]) -> Result<ArchetypeId, QueryError> {
        let sorted = sorted_ids(&self.registry, ids.iter().copied().collect())?;
        if let Some(&id) = self.archetype_map.get(&sorted[..]) {
            return Ok(id);
        }

        let components = sorted
            .iter()
            .map(|&id| {
                self.registry
                    .info(id)
                    .copied()
                    .ok_or_else(|| QueryError::invalid(format!("Unknown component {}", id)))
            })
            .collect::<Result<Box<[ComponentInfo]>, _>>()?;

        let id = match u32::try_from(self.archetypes.len()) {
            Ok(index) => ArchetypeId(index),
            Err(_) => panic!("Too many archetypes"),
        };

        self.archetypes.push(Archetype::new(ArchetypeInfo::new(
            id,
            components,
            self.chunk_capacity,
        )));
        self.archetype_map.insert(sorted[..].into(), id);
        self.tick += 1;
        Ok(id)
    }

    fn insert<B: Bundle>(
        &mut self,
        archetype: ArchetypeId,
        ids: &[ComponentId],
        bundle: B,
        version: u64,
    ) -> Entity {
        let archetype_data = &mut self.archetypes[archetype.index()];
        let chunk_index = archetype_data.chunk_for_insert();
        let chunk = &mut archetype_data.chunks[chunk_index];

        bundle.push_components(ids, &archetype_data.info, chunk);

        let entity = self.entities.spawn(Location {
            archetype,
            chunk: chunk_index as u32,
            index: chunk.len() as u32,
        });
        chunk.finish_push(entity, version);
        entity
    }
}
