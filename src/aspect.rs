//! Aspects are fixed composites of component accesses.
//!
//! An aspect declares the components it needs once, in a static table built by
//! [`RegistryBuilder::register_aspect`](crate::registry::RegistryBuilder::register_aspect).
//! Queries merge the table into their `all` set and handles fetch
//! aspect items from resolved chunks.

use {
    crate::{
        archetype::ArchetypeId,
        component::{Component, ComponentTypeRef},
        entity::Entity,
        error::QueryError,
        query::{check_tick, JobDependencies, RequirementSet, ResolvedChunk, TypeHandle},
        registry::TypeRegistry,
        world::World,
    },
    std::{
        cell::{Ref, RefMut},
        fmt,
        marker::PhantomData,
    },
};

/// Composite of component accesses fetched together.
pub trait Aspect: Sized + 'static {
    /// Item fetched for one entity.
    type Item<'a>;

    /// Number of entries written by `add_required_component_types`.
    fn required_component_count() -> usize;

    /// Writes required component types into `types`.
    /// `types` has exactly `required_component_count()` entries.
    /// Entries are written in the same order every time.
    fn add_required_component_types(
        registry: &TypeRegistry,
        types: &mut [ComponentTypeRef],
    ) -> Result<(), QueryError>;

    /// Merges registered requirement table into `set`.
    /// Types already in the set keep the widest access.
    fn add_component_requirements_to(
        registry: &TypeRegistry,
        set: &mut RequirementSet,
    ) -> Result<(), QueryError> {
        set.extend(registry.aspect_requirements::<Self>()?.iter().copied());
        Ok(())
    }

    /// Fetches item of entity at `index`.
    fn fetch<'a>(chunk: &'a ResolvedChunk<'_>, index: usize) -> Result<Self::Item<'a>, QueryError>;

    /// Completes jobs writing any of aspect's components.
    fn complete_dependency_before_ro(
        registry: &TypeRegistry,
        dependencies: &dyn JobDependencies,
    ) -> Result<(), QueryError> {
        for r in registry.aspect_requirements::<Self>()? {
            dependencies.complete_read(r.id);
        }
        Ok(())
    }

    /// Completes jobs accessing any of aspect's components.
    fn complete_dependency_before_rw(
        registry: &TypeRegistry,
        dependencies: &dyn JobDependencies,
    ) -> Result<(), QueryError> {
        for r in registry.aspect_requirements::<Self>()? {
            dependencies.complete_write(r.id);
        }
        Ok(())
    }
}

/// Shared access to component `T`.
pub struct Read<T>(PhantomData<fn() -> T>);

/// Exclusive access to component `T`.
pub struct Write<T>(PhantomData<fn() -> T>);

impl<T: Component> Aspect for Read<T> {
    type Item<'a> = Ref<'a, T>;

    fn required_component_count() -> usize {
        1
    }

    fn add_required_component_types(
        registry: &TypeRegistry,
        types: &mut [ComponentTypeRef],
    ) -> Result<(), QueryError> {
        types[0] = ComponentTypeRef::read_only(registry.id_of::<T>()?);
        Ok(())
    }

    fn fetch<'a>(chunk: &'a ResolvedChunk<'_>, index: usize) -> Result<Ref<'a, T>, QueryError> {
        chunk.get::<T>(index)
    }
}

impl<T: Component> Aspect for Write<T> {
    type Item<'a> = RefMut<'a, T>;

    fn required_component_count() -> usize {
        1
    }

    fn add_required_component_types(
        registry: &TypeRegistry,
        types: &mut [ComponentTypeRef],
    ) -> Result<(), QueryError> {
        types[0] = ComponentTypeRef::read_write(registry.id_of::<T>()?);
        Ok(())
    }

    fn fetch<'a>(chunk: &'a ResolvedChunk<'_>, index: usize) -> Result<RefMut<'a, T>, QueryError> {
        chunk.get_mut::<T>(index)
    }
}

macro_rules! impl_aspect_for_tuple {
    ($($a:ident),+) => {
        impl<$($a),+> Aspect for ($($a,)+)
        where
            $($a: Aspect,)+
        {
            type Item<'a> = ($($a::Item<'a>,)+);

            fn required_component_count() -> usize {
                0 $(+ $a::required_component_count())+
            }

            fn add_required_component_types(
                registry: &TypeRegistry,
                types: &mut [ComponentTypeRef],
            ) -> Result<(), QueryError> {
                let mut offset = 0;
                $(
                    let count = $a::required_component_count();
                    $a::add_required_component_types(registry, &mut types[offset..offset + count])?;
                    offset += count;
                )+
                debug_assert_eq!(offset, types.len());
                Ok(())
            }

            fn fetch<'a>(chunk: &'a ResolvedChunk<'_>, index: usize) -> Result<Self::Item<'a>, QueryError> {
                Ok(($($a::fetch(chunk, index)?,)+))
            }
        }
    };
}

impl_aspect_for_tuple!(A);
impl_aspect_for_tuple!(A, B);
impl_aspect_for_tuple!(A, B, C);
impl_aspect_for_tuple!(A, B, C, D);
impl_aspect_for_tuple!(A, B, C, D, E);
impl_aspect_for_tuple!(A, B, C, D, E, F);

/// Type handle fetching aspect items from resolved chunks.
pub struct AspectTypeHandle<A> {
    handle: TypeHandle,
    marker: PhantomData<fn() -> A>,
}

impl<A> fmt::Debug for AspectTypeHandle<A> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AspectTypeHandle")
            .field("aspect", &std::any::type_name::<A>())
            .field("handle", &self.handle)
            .finish()
    }
}

impl<A: Aspect> AspectTypeHandle<A> {
    pub fn new(registry: &TypeRegistry) -> Result<Self, QueryError> {
        Ok(AspectTypeHandle {
            handle: TypeHandle::new(registry.aspect_requirements::<A>()?.iter().copied()),
            marker: PhantomData,
        })
    }

    pub fn handle(&self) -> &TypeHandle {
        &self.handle
    }

    pub fn update(&mut self, world: &World) {
        self.handle.update(world)
    }

    pub fn complete_dependencies(&self, dependencies: &dyn JobDependencies) {
        self.handle.complete_dependencies(dependencies)
    }

    pub fn resolve<'w>(
        &self,
        world: &'w mut World,
        archetype: ArchetypeId,
        chunk: usize,
    ) -> Result<ResolvedChunk<'w>, QueryError> {
        self.handle.resolve(world, archetype, chunk)
    }

    /// Fetches aspect item of entity at `index`.
    /// Chunk may be resolved by any handle that references aspect's components.
    pub fn get<'a>(&self, chunk: &'a ResolvedChunk<'_>, index: usize) -> Result<A::Item<'a>, QueryError> {
        A::fetch(chunk, index)
    }
}

/// By-entity access to aspect items.
pub struct AspectLookup<A> {
    handle: TypeHandle,
    marker: PhantomData<fn() -> A>,
}

impl<A> fmt::Debug for AspectLookup<A> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AspectLookup")
            .field("aspect", &std::any::type_name::<A>())
            .field("handle", &self.handle)
            .finish()
    }
}

impl<A: Aspect> AspectLookup<A> {
    pub fn new(registry: &TypeRegistry) -> Result<Self, QueryError> {
        Ok(AspectLookup {
            handle: TypeHandle::new(registry.aspect_requirements::<A>()?.iter().copied()),
            marker: PhantomData,
        })
    }

    pub fn update(&mut self, world: &World) {
        self.handle.update(world)
    }

    pub fn complete_dependencies(&self, dependencies: &dyn JobDependencies) {
        self.handle.complete_dependencies(dependencies)
    }

    /// Returns true if entity has every component of the aspect.
    pub fn has(&self, world: &World, entity: Entity) -> Result<bool, QueryError> {
        check_tick(self.handle.tick(), world.tick())?;
        let (archetype, _, _) = world.locate(entity)?;
        Ok(self.handle.refs().iter().all(|r| archetype.has(r.id)))
    }

    /// Calls `f` with aspect item of the entity.
    pub fn with<R>(
        &self,
        world: &mut World,
        entity: Entity,
        f: impl FnOnce(A::Item<'_>) -> R,
    ) -> Result<R, QueryError> {
        let location = world.location(entity).ok_or(QueryError::NoSuchEntity)?;
        let chunk = self
            .handle
            .resolve(world, location.archetype, location.chunk as usize)?;
        let item = A::fetch(&chunk, location.index as usize)?;
        Ok(f(item))
    }
}
