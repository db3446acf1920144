//! Component type registry.
//!
//! Registry maps Rust types to dense [`ComponentId`]s and stores
//! static requirement tables of aspects.
//! It is built once with [`RegistryBuilder`] and is immutable afterwards.
//!
//! A process-wide instance can be installed with [`initialize`]
//! and removed with [`shutdown`].
//! Queries built from the global registry before [`initialize`] fail with
//! [`QueryError::RegistryNotInitialized`].

use {
    crate::{
        aspect::Aspect,
        component::{
            Component, ComponentId, ComponentInfo, ComponentTypeRef, Disabled, Prefab,
            DISABLED_ID, PREFAB_ID,
        },
        error::QueryError,
        util::TypeIdMap,
    },
    lazy_static::lazy_static,
    parking_lot::RwLock,
    smallvec::SmallVec,
    std::{
        any::{type_name, TypeId},
        sync::Arc,
    },
};

/// Static requirement table of one aspect.
pub type AspectRequirements = SmallVec<[ComponentTypeRef; 8]>;

type AspectTableFn = fn(&TypeRegistry) -> Result<AspectRequirements, QueryError>;

/// Immutable table of registered component types.
#[derive(Debug)]
pub struct TypeRegistry {
    /// Indexed by `ComponentId`.
    infos: Vec<ComponentInfo>,
    by_type: TypeIdMap<ComponentId>,
    aspects: TypeIdMap<AspectRequirements>,
}

impl TypeRegistry {
    /// Returns builder with built-in marker components registered.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Returns id of the component type `T`.
    pub fn id_of<T: Component>(&self) -> Result<ComponentId, QueryError> {
        self.id_of_type(TypeId::of::<T>())
            .ok_or_else(|| QueryError::UnregisteredComponent(T::type_name()))
    }

    /// Returns id of the component with specified `TypeId`.
    pub fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns info of the registered component.
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.as_usize())
    }

    /// Returns true if component can be toggled per entity.
    /// Unknown ids are never enableable.
    pub fn is_enableable(&self, id: ComponentId) -> bool {
        self.info(id).map_or(false, ComponentInfo::is_enableable)
    }

    /// Returns size of the component.
    pub fn size_of(&self, id: ComponentId) -> Option<usize> {
        self.info(id).map(ComponentInfo::size)
    }

    /// Returns alignment of the component.
    pub fn align_of(&self, id: ComponentId) -> Option<usize> {
        self.info(id).map(ComponentInfo::align)
    }

    /// Returns type name of the component, or `"<unknown>"`.
    pub fn name_of(&self, id: ComponentId) -> &'static str {
        self.info(id).map_or("<unknown>", ComponentInfo::name)
    }

    /// Returns number of registered components.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Returns requirement table of registered aspect `A`.
    pub fn aspect_requirements<A: Aspect>(&self) -> Result<&[ComponentTypeRef], QueryError> {
        self.aspects
            .get(&TypeId::of::<A>())
            .map(|table| &table[..])
            .ok_or_else(|| QueryError::UnregisteredComponent(type_name::<A>()))
    }

    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }
}

/// Builder for [`TypeRegistry`].
/// Registration order defines component ids.
pub struct RegistryBuilder {
    infos: Vec<ComponentInfo>,
    by_type: TypeIdMap<ComponentId>,
    aspects: Vec<(TypeId, &'static str, AspectTableFn)>,
}

impl RegistryBuilder {
    fn new() -> Self {
        let mut builder = RegistryBuilder {
            infos: Vec::new(),
            by_type: TypeIdMap::default(),
            aspects: Vec::new(),
        };
        builder.push::<Prefab>(false);
        builder.push::<Disabled>(false);
        debug_assert_eq!(builder.infos[PREFAB_ID.as_usize()].type_id(), TypeId::of::<Prefab>());
        debug_assert_eq!(
            builder.infos[DISABLED_ID.as_usize()].type_id(),
            TypeId::of::<Disabled>()
        );
        builder
    }

    fn push<T: Component>(&mut self, enableable: bool) {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&type_id) {
            let existing = &self.infos[id.as_usize()];
            if existing.is_enableable() != enableable {
                log::warn!(
                    "Component `{}` registered twice with different enableable flag. Keeping the first registration",
                    T::type_name(),
                );
            }
            return;
        }

        let index = match u32::try_from(self.infos.len()) {
            Ok(index) => index,
            Err(_) => panic!("Too many component types registered"),
        };
        let id = ComponentId(index);
        self.infos.push(ComponentInfo::of::<T>(id, enableable));
        self.by_type.insert(type_id, id);
        log::trace!("Registered component `{}` as {}", T::type_name(), id);
    }

    /// Registers component that is always enabled when present.
    pub fn register<T: Component>(mut self) -> Self {
        self.push::<T>(false);
        self
    }

    /// Registers component that can be toggled per entity.
    pub fn register_enableable<T: Component>(mut self) -> Self {
        self.push::<T>(true);
        self
    }

    /// Registers aspect requirement table.
    /// Table is resolved in [`RegistryBuilder::build`]
    /// after all components are known.
    pub fn register_aspect<A: Aspect>(mut self) -> Self {
        self.aspects
            .push((TypeId::of::<A>(), type_name::<A>(), aspect_table::<A>));
        self
    }

    /// Finishes registration.
    ///
    /// Fails if an aspect requires unregistered component.
    pub fn build(self) -> Result<TypeRegistry, QueryError> {
        let mut registry = TypeRegistry {
            infos: self.infos,
            by_type: self.by_type,
            aspects: TypeIdMap::default(),
        };

        for (type_id, name, table) in self.aspects {
            let requirements = table(&registry)?;
            log::trace!(
                "Registered aspect `{}` with {} requirements",
                name,
                requirements.len()
            );
            registry.aspects.insert(type_id, requirements);
        }

        Ok(registry)
    }
}

fn aspect_table<A: Aspect>(registry: &TypeRegistry) -> Result<AspectRequirements, QueryError> {
    let mut table: AspectRequirements = std::iter::repeat(ComponentTypeRef::read_only(PREFAB_ID))
        .take(A::required_component_count())
        .collect();
    A::add_required_component_types(registry, &mut table)?;
    Ok(table)
}

lazy_static! {
    static ref GLOBAL: RwLock<Option<Arc<TypeRegistry>>> = RwLock::new(None);
}

/// Installs process-wide registry.
///
/// Fails if registry is already installed.
pub fn initialize(registry: TypeRegistry) -> Result<Arc<TypeRegistry>, QueryError> {
    let mut global = GLOBAL.write();
    if global.is_some() {
        log::error!("Attempt to initialize component registry twice");
        return Err(QueryError::RegistryAlreadyInitialized);
    }

    let registry = Arc::new(registry);
    *global = Some(registry.clone());
    log::debug!(
        "Component registry initialized with {} types",
        registry.len()
    );
    Ok(registry)
}

/// Removes process-wide registry.
/// Returns false if it was not installed.
///
/// Queries and worlds holding the registry keep it alive.
pub fn shutdown() -> bool {
    let taken = GLOBAL.write().take();
    if taken.is_some() {
        log::debug!("Component registry shut down");
    }
    taken.is_some()
}

/// Returns process-wide registry.
pub fn global() -> Result<Arc<TypeRegistry>, QueryError> {
    GLOBAL
        .read()
        .clone()
        .ok_or(QueryError::RegistryNotInitialized)
}

pub fn is_initialized() -> bool {
    GLOBAL.read().is_some()
}
