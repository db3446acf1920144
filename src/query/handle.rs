use {
    super::{ArchetypeQueryDescriptor, ChunkMask, JobDependencies, RequirementSet},
    crate::{
        archetype::{ArchetypeId, ArchetypeInfo, Chunk, ColumnSlot, TypedColumn},
        component::{AccessMode, Component, ComponentId, ComponentTypeRef},
        entity::Entity,
        error::QueryError,
        registry::TypeRegistry,
        world::World,
    },
    smallvec::SmallVec,
    std::{
        cell::{Ref, RefCell, RefMut},
        fmt,
        marker::PhantomData,
    },
};

/// Fails with `StaleHandle` if handle was updated at another tick.
/// The check is compiled out in release builds.
pub(crate) fn check_tick(recorded: u64, current: u64) -> Result<(), QueryError> {
    if cfg!(debug_assertions) && recorded != current {
        log::error!(
            "Handle updated at tick {} is used at tick {}",
            recorded,
            current
        );
        return Err(QueryError::StaleHandle);
    }
    Ok(())
}

/// Binds referenced component types to live chunk columns.
///
/// Handle must be [`update`](TypeHandle::update)d in the same logical step
/// before resolving chunks.
#[derive(Clone, Debug)]
pub struct TypeHandle {
    /// Sorted by id.
    refs: SmallVec<[ComponentTypeRef; 8]>,
    tick: u64,
}

impl TypeHandle {
    /// Creates handle for union of type references.
    pub fn new(refs: impl IntoIterator<Item = ComponentTypeRef>) -> Self {
        let mut set = RequirementSet::new();
        set.extend(refs);

        let mut refs: SmallVec<[ComponentTypeRef; 8]> = set.as_slice().into();
        refs.sort_unstable_by_key(|r| r.id);
        TypeHandle { refs, tick: 0 }
    }

    /// Creates handle for types accessed by any of descriptors.
    pub fn for_descriptors(descriptors: &[ArchetypeQueryDescriptor]) -> Self {
        TypeHandle::new(descriptors.iter().flat_map(|d| d.accessed().copied()))
    }

    pub fn refs(&self) -> &[ComponentTypeRef] {
        &self.refs
    }

    /// Returns access granted to the component.
    pub fn access(&self, id: ComponentId) -> Option<AccessMode> {
        self.refs
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|index| self.refs[index].access)
    }

    /// Tick of the last update.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Records current world tick.
    pub fn update(&mut self, world: &World) {
        self.tick = world.tick();
    }

    /// Waits for jobs conflicting with referenced types.
    pub fn complete_dependencies(&self, dependencies: &dyn JobDependencies) {
        for r in &self.refs {
            match r.access {
                AccessMode::ReadOnly => dependencies.complete_read(r.id),
                AccessMode::ReadWrite => dependencies.complete_write(r.id),
            }
        }
    }

    /// Resolves columns of one chunk.
    /// Columns accessed for write are stamped with new change version.
    pub fn resolve<'w>(
        &self,
        world: &'w mut World,
        archetype: ArchetypeId,
        chunk: usize,
    ) -> Result<ResolvedChunk<'w>, QueryError> {
        check_tick(self.tick, world.tick())?;
        let version = world.bump_change_version();
        let (registry, archetypes, _) = world.split_mut();

        let archetype = archetypes
            .get_mut(archetype.index())
            .ok_or_else(|| QueryError::invalid(format!("No archetype {:?}", archetype)))?;
        let chunk = archetype
            .chunks
            .get_mut(chunk)
            .ok_or_else(|| QueryError::invalid(format!("No chunk {}", chunk)))?;

        self.resolve_chunk(registry, &archetype.info, chunk, version)
    }

    /// Resolves columns of one chunk without tick check.
    /// Writable columns are stamped with `version`.
    pub(crate) fn resolve_chunk<'w>(
        &self,
        registry: &'w TypeRegistry,
        archetype: &ArchetypeInfo,
        chunk: &'w mut Chunk,
        version: u64,
    ) -> Result<ResolvedChunk<'w>, QueryError> {
        let (entities, slots) = chunk.split_mut();
        let mut slots = slots.iter_mut().enumerate();

        let mut views = SmallVec::with_capacity(self.refs.len());
        for &type_ref in &self.refs {
            let slot = match archetype.position(type_ref.id) {
                None => None,
                Some(position) => {
                    // Refs and columns are both sorted by id.
                    let (_, slot) = slots
                        .find(|(index, _)| *index == position)
                        .ok_or(QueryError::MissingComponent(type_ref.id))?;

                    Some(RefCell::new(match type_ref.access {
                        AccessMode::ReadOnly => SlotRef::Shared(slot),
                        AccessMode::ReadWrite => {
                            slot.version = version;
                            SlotRef::Exclusive(slot)
                        }
                    }))
                }
            };

            views.push(ColumnView {
                type_ref,
                enableable: archetype.has_enableable(type_ref.id),
                slot,
            });
        }

        log::trace!(
            "Resolved {} columns of {:?} chunk with {} entities",
            views.len(),
            archetype.id(),
            entities.len()
        );

        Ok(ResolvedChunk {
            registry,
            entities,
            views,
        })
    }
}

enum SlotRef<'w> {
    Shared(&'w ColumnSlot),
    Exclusive(&'w mut ColumnSlot),
}

impl SlotRef<'_> {
    fn get(&self) -> &ColumnSlot {
        match self {
            SlotRef::Shared(slot) => slot,
            SlotRef::Exclusive(slot) => slot,
        }
    }

    fn get_mut(&mut self) -> Option<&mut ColumnSlot> {
        match self {
            SlotRef::Shared(_) => None,
            SlotRef::Exclusive(slot) => Some(slot),
        }
    }
}

struct ColumnView<'w> {
    type_ref: ComponentTypeRef,
    enableable: bool,
    /// `None` if chunk's archetype lacks the component.
    slot: Option<RefCell<SlotRef<'w>>>,
}

/// Typed column views of one chunk.
///
/// Read-only references give shared views and read-write references give exclusive views.
/// Views of different columns can be borrowed simultaneously.
pub struct ResolvedChunk<'w> {
    registry: &'w TypeRegistry,
    entities: &'w [Entity],
    views: SmallVec<[ColumnView<'w>; 8]>,
}

impl fmt::Debug for ResolvedChunk<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ResolvedChunk")
            .field("len", &self.entities.len())
            .field(
                "columns",
                &self
                    .views
                    .iter()
                    .map(|v| (v.type_ref, v.slot.is_some()))
                    .collect::<SmallVec<[_; 8]>>(),
            )
            .finish()
    }
}

impl<'w> ResolvedChunk<'w> {
    /// Number of entities in the chunk.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &'w [Entity] {
        self.entities
    }

    pub fn registry(&self) -> &'w TypeRegistry {
        self.registry
    }

    fn view(&self, id: ComponentId) -> Result<&ColumnView<'w>, QueryError> {
        self.views
            .binary_search_by_key(&id, |v| v.type_ref.id)
            .map(|index| &self.views[index])
            .map_err(|_| QueryError::AccessDenied(id))
    }

    fn slot(&self, id: ComponentId) -> Result<&RefCell<SlotRef<'w>>, QueryError> {
        self.view(id)?
            .slot
            .as_ref()
            .ok_or(QueryError::MissingComponent(id))
    }

    fn writable_slot(&self, id: ComponentId) -> Result<&RefCell<SlotRef<'w>>, QueryError> {
        let view = self.view(id)?;
        if view.type_ref.is_read_only() {
            log::error!("Write access to read-only component {}", id);
            return Err(QueryError::AccessDenied(id));
        }
        view.slot.as_ref().ok_or(QueryError::MissingComponent(id))
    }

    /// Returns true if chunk has the component.
    /// Components of `any` set may be missing.
    pub fn has<T: Component>(&self) -> bool {
        self.registry
            .id_of::<T>()
            .map_or(false, |id| self.has_id(id))
    }

    pub fn has_id(&self, id: ComponentId) -> bool {
        self.view(id).map_or(false, |v| v.slot.is_some())
    }

    /// Returns shared view of the column.
    pub fn column<T: Component>(&self) -> Result<Ref<'_, [T]>, QueryError> {
        let id = self.registry.id_of::<T>()?;
        let slot = self
            .slot(id)?
            .try_borrow()
            .map_err(|_| QueryError::Borrowed(id))?;

        Ref::filter_map(slot, |slot| {
            slot.get()
                .data
                .as_any()
                .downcast_ref::<TypedColumn<T>>()
                .map(TypedColumn::as_slice)
        })
        .map_err(|_| QueryError::MissingComponent(id))
    }

    /// Returns exclusive view of the column.
    /// Component must be referenced with write access.
    pub fn column_mut<T: Component>(&self) -> Result<RefMut<'_, [T]>, QueryError> {
        let id = self.registry.id_of::<T>()?;
        let slot = self
            .writable_slot(id)?
            .try_borrow_mut()
            .map_err(|_| QueryError::Borrowed(id))?;

        RefMut::filter_map(slot, |slot| {
            slot.get_mut()
                .and_then(|slot| slot.data.as_any_mut().downcast_mut::<TypedColumn<T>>())
                .map(TypedColumn::as_mut_slice)
        })
        .map_err(|_| QueryError::MissingComponent(id))
    }

    /// Returns component of entity at `index`.
    pub fn get<T: Component>(&self, index: usize) -> Result<Ref<'_, T>, QueryError> {
        self.check_index(index)?;
        Ok(Ref::map(self.column::<T>()?, |column| &column[index]))
    }

    /// Returns mutable component of entity at `index`.
    pub fn get_mut<T: Component>(&self, index: usize) -> Result<RefMut<'_, T>, QueryError> {
        self.check_index(index)?;
        Ok(RefMut::map(self.column_mut::<T>()?, |column| {
            &mut column[index]
        }))
    }

    fn check_index(&self, index: usize) -> Result<(), QueryError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(QueryError::IndexOutOfBounds {
                index,
                len: self.len(),
            })
        }
    }

    /// Returns enabled mask of the column.
    /// Components that are not enableable report every entity as enabled.
    pub fn enabled_mask<T: Component>(&self) -> Result<ChunkMask, QueryError> {
        self.enabled_mask_of(self.registry.id_of::<T>()?)
    }

    pub fn enabled_mask_of(&self, id: ComponentId) -> Result<ChunkMask, QueryError> {
        let view = self.view(id)?;
        let slot = view
            .slot
            .as_ref()
            .ok_or(QueryError::MissingComponent(id))?
            .try_borrow()
            .map_err(|_| QueryError::Borrowed(id))?;

        if view.enableable {
            Ok(slot.get().enabled & ChunkMask::first(self.len()))
        } else {
            Ok(ChunkMask::first(self.len()))
        }
    }

    pub fn is_enabled<T: Component>(&self, index: usize) -> Result<bool, QueryError> {
        Ok(self.enabled_mask::<T>()?.get(index))
    }

    /// Enables or disables component of entity at `index`.
    /// Component must be enableable and referenced with write access.
    ///
    /// Indices already yielded by enumerator for this chunk are not affected.
    pub fn set_enabled<T: Component>(&self, index: usize, enabled: bool) -> Result<(), QueryError> {
        let id = self.registry.id_of::<T>()?;
        self.check_index(index)?;

        let cell = self.writable_slot(id)?;
        if !self.view(id)?.enableable {
            return Err(QueryError::invalid(format!(
                "Component `{}` is not enableable",
                T::type_name()
            )));
        }

        let mut slot = cell.try_borrow_mut().map_err(|_| QueryError::Borrowed(id))?;
        match slot.get_mut() {
            Some(slot) => {
                slot.enabled.set(index, enabled);
                Ok(())
            }
            None => Err(QueryError::AccessDenied(id)),
        }
    }
}

/// By-entity access to components of type `T`.
///
/// Follows the same update contract as [`TypeHandle`].
pub struct ComponentLookup<T> {
    id: ComponentId,
    access: AccessMode,
    tick: u64,
    marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for ComponentLookup<T>
where
    T: Component,
{
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ComponentLookup")
            .field("component", &T::type_name())
            .field("access", &self.access)
            .field("tick", &self.tick)
            .finish()
    }
}

impl<T> ComponentLookup<T>
where
    T: Component,
{
    pub fn new(registry: &TypeRegistry, access: AccessMode) -> Result<Self, QueryError> {
        Ok(ComponentLookup {
            id: registry.id_of::<T>()?,
            access,
            tick: 0,
            marker: PhantomData,
        })
    }

    pub fn read_only(registry: &TypeRegistry) -> Result<Self, QueryError> {
        Self::new(registry, AccessMode::ReadOnly)
    }

    pub fn read_write(registry: &TypeRegistry) -> Result<Self, QueryError> {
        Self::new(registry, AccessMode::ReadWrite)
    }

    pub fn type_ref(&self) -> ComponentTypeRef {
        ComponentTypeRef {
            id: self.id,
            access: self.access,
        }
    }

    /// Records current world tick.
    pub fn update(&mut self, world: &World) {
        self.tick = world.tick();
    }

    pub fn complete_dependencies(&self, dependencies: &dyn JobDependencies) {
        match self.access {
            AccessMode::ReadOnly => dependencies.complete_read(self.id),
            AccessMode::ReadWrite => dependencies.complete_write(self.id),
        }
    }

    fn check_write(&self) -> Result<(), QueryError> {
        match self.access {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => {
                log::error!("Write access through read-only lookup of `{}`", T::type_name());
                Err(QueryError::AccessDenied(self.id))
            }
        }
    }

    /// Returns true if entity has the component.
    pub fn has(&self, world: &World, entity: Entity) -> Result<bool, QueryError> {
        check_tick(self.tick, world.tick())?;
        let (archetype, _, _) = world.locate(entity)?;
        Ok(archetype.has(self.id))
    }

    pub fn get<'w>(&self, world: &'w World, entity: Entity) -> Result<&'w T, QueryError> {
        check_tick(self.tick, world.tick())?;
        world.get::<T>(entity)
    }

    /// Returns mutable component and bumps its column change version.
    pub fn get_mut<'w>(&self, world: &'w mut World, entity: Entity) -> Result<&'w mut T, QueryError> {
        check_tick(self.tick, world.tick())?;
        self.check_write()?;
        world.get_mut::<T>(entity)
    }

    pub fn is_enabled(&self, world: &World, entity: Entity) -> Result<bool, QueryError> {
        check_tick(self.tick, world.tick())?;
        world.is_enabled::<T>(entity)
    }

    pub fn set_enabled(&self, world: &mut World, entity: Entity, enabled: bool) -> Result<(), QueryError> {
        check_tick(self.tick, world.tick())?;
        self.check_write()?;
        world.set_enabled::<T>(entity, enabled)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    #[derive(Debug, PartialEq)]
    struct Position(i32);

    #[derive(Debug, PartialEq)]
    struct Velocity(i32);

    struct Health(u32);

    fn world() -> World {
        let registry = TypeRegistry::builder()
            .register_enableable::<Position>()
            .register::<Velocity>()
            .register::<Health>()
            .build()
            .unwrap();
        World::new(Arc::new(registry))
    }

    fn handle(world: &World, position: AccessMode, velocity: AccessMode) -> TypeHandle {
        let registry = world.registry();
        TypeHandle::new(vec![
            ComponentTypeRef {
                id: registry.id_of::<Velocity>().unwrap(),
                access: velocity,
            },
            ComponentTypeRef {
                id: registry.id_of::<Position>().unwrap(),
                access: position,
            },
        ])
    }

    #[test]
    fn refs_are_merged_and_sorted() {
        let handle = TypeHandle::new(vec![
            ComponentTypeRef::read_only(ComponentId(5)),
            ComponentTypeRef::read_only(ComponentId(3)),
            ComponentTypeRef::read_write(ComponentId(5)),
        ]);
        assert_eq!(
            handle.refs(),
            &[
                ComponentTypeRef::read_only(ComponentId(3)),
                ComponentTypeRef::read_write(ComponentId(5)),
            ]
        );
        assert_eq!(handle.access(ComponentId(5)), Some(AccessMode::ReadWrite));
        assert_eq!(handle.access(ComponentId(4)), None);
    }

    #[test]
    fn resolved_views_respect_access() {
        let mut world = world();
        world
            .spawn_batch((0..3).map(|i| (Position(i), Velocity(i * 10))))
            .unwrap();

        let mut handle = handle(&world, AccessMode::ReadOnly, AccessMode::ReadWrite);
        handle.update(&world);
        let chunk = handle.resolve(&mut world, ArchetypeId(0), 0).unwrap();

        assert_eq!(chunk.len(), 3);
        assert_eq!(*chunk.get::<Position>(1).unwrap(), Position(1));
        chunk.get_mut::<Velocity>(2).unwrap().0 += 1;
        assert_eq!(&*chunk.column::<Velocity>().unwrap(), &[Velocity(0), Velocity(10), Velocity(21)]);

        assert!(matches!(chunk.column_mut::<Position>(), Err(QueryError::AccessDenied(_))));
        assert!(matches!(chunk.column::<Health>(), Err(QueryError::AccessDenied(_))));
        assert!(matches!(
            chunk.set_enabled::<Position>(0, false),
            Err(QueryError::AccessDenied(_))
        ));
    }

    #[test]
    fn exclusive_view_is_borrow_checked() {
        let mut world = world();
        world.spawn((Position(0), Velocity(0))).unwrap();

        let mut handle = handle(&world, AccessMode::ReadWrite, AccessMode::ReadWrite);
        handle.update(&world);
        let chunk = handle.resolve(&mut world, ArchetypeId(0), 0).unwrap();

        let mut positions = chunk.column_mut::<Position>().unwrap();
        let mut velocities = chunk.column_mut::<Velocity>().unwrap();
        positions[0].0 = 1;
        velocities[0].0 = 2;
        assert!(matches!(chunk.column::<Position>(), Err(QueryError::Borrowed(_))));
        drop(positions);
        drop(velocities);

        chunk.set_enabled::<Position>(0, false).unwrap();
        assert_eq!(chunk.is_enabled::<Position>(0), Ok(false));
        assert!(matches!(
            chunk.set_enabled::<Velocity>(0, false),
            Err(QueryError::InvalidQuery(_))
        ));
        assert_eq!(chunk.enabled_mask::<Velocity>(), Ok(ChunkMask::first(1)));
    }

    #[test]
    fn missing_component_resolves_to_nothing() {
        let mut world = world();
        world.spawn((Velocity(0),)).unwrap();

        let mut handle = handle(&world, AccessMode::ReadOnly, AccessMode::ReadOnly);
        handle.update(&world);
        let chunk = handle.resolve(&mut world, ArchetypeId(0), 0).unwrap();

        assert!(chunk.has::<Velocity>());
        assert!(!chunk.has::<Position>());
        assert!(matches!(chunk.column::<Position>(), Err(QueryError::MissingComponent(_))));
    }

    #[test]
    fn out_of_bounds_index_is_an_error() {
        let mut world = world();
        world.spawn((Position(0), Velocity(0))).unwrap();

        let mut handle = handle(&world, AccessMode::ReadWrite, AccessMode::ReadOnly);
        handle.update(&world);
        let chunk = handle.resolve(&mut world, ArchetypeId(0), 0).unwrap();

        let out_of_bounds = QueryError::IndexOutOfBounds { index: 1, len: 1 };
        assert_eq!(chunk.set_enabled::<Position>(1, false), Err(out_of_bounds.clone()));
        assert!(matches!(chunk.get::<Velocity>(1), Err(ref err) if *err == out_of_bounds));
        assert!(matches!(chunk.get_mut::<Position>(1), Err(ref err) if *err == out_of_bounds));

        assert_eq!(chunk.set_enabled::<Position>(0, false), Ok(()));
        assert_eq!(chunk.is_enabled::<Position>(0), Ok(false));
    }

    #[test]
    fn write_resolve_bumps_version() {
        let mut world = world();
        world.spawn((Position(0), Velocity(0))).unwrap();
        let spawned_at = world.change_version();
        world.advance_tick();

        let mut handle = handle(&world, AccessMode::ReadOnly, AccessMode::ReadWrite);
        handle.update(&world);
        drop(handle.resolve(&mut world, ArchetypeId(0), 0).unwrap());

        let chunk = &world.archetypes()[0].chunks()[0];
        let info = world.archetypes()[0].info();
        let position = info.position(world.registry().id_of::<Position>().unwrap()).unwrap();
        let velocity = info.position(world.registry().id_of::<Velocity>().unwrap()).unwrap();
        assert_eq!(chunk.version(position), spawned_at);
        assert_eq!(chunk.version(velocity), world.change_version());
        assert!(world.change_version() > spawned_at);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn stale_handle_is_rejected() {
        let mut world = world();
        world.spawn((Position(0), Velocity(0))).unwrap();

        let mut handle = handle(&world, AccessMode::ReadOnly, AccessMode::ReadOnly);
        handle.update(&world);
        world.advance_tick();
        assert!(matches!(
            handle.resolve(&mut world, ArchetypeId(0), 0),
            Err(QueryError::StaleHandle)
        ));

        let mut lookup = ComponentLookup::<Velocity>::read_only(world.registry()).unwrap();
        let entity = world.spawn((Velocity(3),)).unwrap();
        assert_eq!(lookup.get(&world, entity), Err(QueryError::StaleHandle));
        lookup.update(&world);
        assert_eq!(lookup.get(&world, entity), Ok(&Velocity(3)));
    }

    #[test]
    fn lookup_respects_access() {
        let mut world = world();
        let entity = world.spawn((Position(1), Velocity(2))).unwrap();

        let mut read = ComponentLookup::<Position>::read_only(world.registry()).unwrap();
        let mut write = ComponentLookup::<Position>::read_write(world.registry()).unwrap();
        read.update(&world);
        write.update(&world);

        assert_eq!(read.has(&world, entity), Ok(true));
        assert!(matches!(
            read.set_enabled(&mut world, entity, false),
            Err(QueryError::AccessDenied(_))
        ));
        write.set_enabled(&mut world, entity, false).unwrap();
        assert_eq!(read.is_enabled(&world, entity), Ok(false));

        write.get_mut(&mut world, entity).unwrap().0 = 7;
        assert_eq!(read.get(&world, entity), Ok(&Position(7)));
    }
}
