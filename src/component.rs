use {
    crate::archetype::{Column, TypedColumn},
    std::{
        alloc::Layout,
        any::TypeId,
        cmp::{Ord, Ordering, PartialOrd},
        fmt,
    },
};

/// Component is basic block of data in ECS
pub trait Component: Sized + Send + Sync + 'static {
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T> Component for T where T: Send + Sync + 'static {}

/// Dense index of a registered component type.
///
/// Ids are assigned by [`TypeRegistry`](crate::registry::TypeRegistry)
/// in registration order and never change afterwards.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Returns id for raw index.
    pub const fn from_index(index: u32) -> Self {
        ComponentId(index)
    }

    /// Returns raw index of this id.
    pub const fn index(self) -> u32 {
        self.0
    }

    pub(crate) fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "#{}", self.0)
    }
}

/// Component storage information.
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    /// Index assigned on registration.
    id: ComponentId,
    /// Type id of the component.
    type_id: TypeId,
    /// Component layout.
    layout: Layout,
    /// Type name.
    name: &'static str,
    /// Whether instances can be toggled per entity.
    enableable: bool,
    /// Creates empty column for chunk with given capacity.
    new_column: fn(ComponentId, usize) -> Box<dyn Column>,
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("enableable", &self.enableable)
            .finish()
    }
}

impl PartialEq for ComponentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.type_id == other.type_id
    }
}

impl Eq for ComponentInfo {}

impl ComponentInfo {
    pub(crate) fn of<T: Component>(id: ComponentId, enableable: bool) -> Self {
        ComponentInfo {
            id,
            type_id: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            name: T::type_name(),
            enableable,
            new_column: TypedColumn::<T>::boxed,
        }
    }

    pub(crate) fn new_column(&self, capacity: usize) -> Box<dyn Column> {
        (self.new_column)(self.id, capacity)
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if component can be enabled and disabled
    /// per entity without moving it to another archetype.
    pub fn is_enableable(&self) -> bool {
        self.enableable
    }
}

/// Ordered by id, which is the order of columns in chunks.
impl Ord for ComponentInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        Ord::cmp(&self.id, &other.id)
    }
}

impl PartialOrd for ComponentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Ord::cmp(self, other).into()
    }
}

/// Kind of access to the particular component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessMode {
    /// Allows only immutable access.
    /// Multiple read access can be performed simultaneously.
    ReadOnly,

    /// Allows mutable access.
    /// Only one write access and no reads can be performed at a time.
    ReadWrite,
}

impl AccessMode {
    /// Returns the least restrictive mode that grants both.
    pub fn union(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }
}

/// Reference to a component type together with requested access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentTypeRef {
    pub id: ComponentId,
    pub access: AccessMode,
}

impl ComponentTypeRef {
    pub fn read_only(id: ComponentId) -> Self {
        ComponentTypeRef {
            id,
            access: AccessMode::ReadOnly,
        }
    }

    pub fn read_write(id: ComponentId) -> Self {
        ComponentTypeRef {
            id,
            access: AccessMode::ReadWrite,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.access == AccessMode::ReadOnly
    }
}

/// Marker component for prefab entities.
/// Archetypes with it are skipped by queries unless asked otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Prefab;

/// Marker component for disabled entities.
/// Archetypes with it are skipped by queries unless asked otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Disabled;

/// Id of [`Prefab`] in every registry.
pub const PREFAB_ID: ComponentId = ComponentId(0);

/// Id of [`Disabled`] in every registry.
pub const DISABLED_ID: ComponentId = ComponentId(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_union_prefers_write() {
        assert_eq!(
            AccessMode::ReadOnly.union(AccessMode::ReadWrite),
            AccessMode::ReadWrite
        );
        assert_eq!(
            AccessMode::ReadOnly.union(AccessMode::ReadOnly),
            AccessMode::ReadOnly
        );
    }

    #[test]
    fn infos_order_by_id() {
        let a = ComponentInfo::of::<u8>(ComponentId(3), false);
        let b = ComponentInfo::of::<u64>(ComponentId(2), true);
        let mut infos = [a, b];
        infos.sort();
        assert_eq!(infos[0].id(), ComponentId(2));
        assert!(infos[0].is_enableable());
        assert_eq!(infos[1].size(), 1);
    }
}
