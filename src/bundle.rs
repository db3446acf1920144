use {
    crate::{
        archetype::{ArchetypeInfo, Chunk},
        component::{Component, ComponentId},
        error::QueryError,
        registry::TypeRegistry,
    },
    smallvec::SmallVec,
};

/// Component ids of a bundle in declaration order.
pub type BundleIds = SmallVec<[ComponentId; 8]>;

/// Allows spawning entities with a set of components.
/// This trait is implemented for tuples of up to eight components
/// which is enough for most use-cases.
pub trait Bundle: Send + 'static {
    /// Returns ids of bundle components in declaration order.
    /// Fails if a component is not registered.
    fn component_ids(registry: &TypeRegistry) -> Result<BundleIds, QueryError>;

    /// Pushes components into chunk columns.
    /// `ids` must be the ids returned by `component_ids` for the same registry
    /// and `archetype` must contain all of them.
    fn push_components(self, ids: &[ComponentId], archetype: &ArchetypeInfo, chunk: &mut Chunk);
}

/// Returns sorted ids.
/// Fails if same component appears twice.
pub(crate) fn sorted_ids(
    registry: &TypeRegistry,
    mut ids: BundleIds,
) -> Result<BundleIds, QueryError> {
    ids.sort_unstable();
    if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
        return Err(QueryError::invalid(format!(
            "Component `{}` is repeated in bundle",
            registry.name_of(w[0])
        )));
    }
    Ok(ids)
}

fn push_one<T: Component>(value: T, id: ComponentId, archetype: &ArchetypeInfo, chunk: &mut Chunk) {
    let column = archetype
        .position(id)
        .and_then(|position| chunk.column_mut::<T>(position));

    match column {
        Some(column) => column.push(value),
        None => panic!(
            "{:?} has no column for `{}`",
            archetype,
            T::type_name()
        ),
    }
}

macro_rules! impl_bundle_for_tuple {
    () => {
        impl Bundle for () {
            fn component_ids(_: &TypeRegistry) -> Result<BundleIds, QueryError> {
                Ok(BundleIds::new())
            }

            fn push_components(self, _: &[ComponentId], _: &ArchetypeInfo, _: &mut Chunk) {}
        }
    };
    ($($a:ident),+) => {
        impl<$($a),+> Bundle for ($($a,)+)
        where
            $($a: Component,)+
        {
            fn component_ids(registry: &TypeRegistry) -> Result<BundleIds, QueryError> {
                let mut ids = BundleIds::new();
                $(
                    ids.push(registry.id_of::<$a>()?);
                )+
                Ok(ids)
            }

            fn push_components(self, ids: &[ComponentId], archetype: &ArchetypeInfo, chunk: &mut Chunk) {
                #![allow(non_snake_case)]
                let ($($a,)+) = self;
                let mut ids = ids.iter().copied();

                $(
                    match ids.next() {
                        Some(id) => push_one($a, id, archetype, chunk),
                        None => panic!("Bundle ids do not match bundle"),
                    }
                )+
            }
        }
    };
}

impl_bundle_for_tuple!();
impl_bundle_for_tuple!(A);
impl_bundle_for_tuple!(A, B);
impl_bundle_for_tuple!(A, B, C);
impl_bundle_for_tuple!(A, B, C, D);
impl_bundle_for_tuple!(A, B, C, D, E);
impl_bundle_for_tuple!(A, B, C, D, E, F);
impl_bundle_for_tuple!(A, B, C, D, E, F, G);
impl_bundle_for_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    struct Position(f32);
    struct Velocity(f32);

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register::<Velocity>()
            .register::<Position>()
            .build()
            .unwrap()
    }

    #[test]
    fn ids_keep_declaration_order() {
        let registry = registry();
        let ids = <(Position, Velocity)>::component_ids(&registry).unwrap();
        assert_eq!(
            &ids[..],
            &[
                registry.id_of::<Position>().unwrap(),
                registry.id_of::<Velocity>().unwrap()
            ]
        );

        let sorted = sorted_ids(&registry, ids).unwrap();
        assert!(sorted[0] < sorted[1]);
    }

    #[test]
    fn repeated_component_is_rejected() {
        let registry = registry();
        let ids = <(Position, Position)>::component_ids(&registry).unwrap();
        assert!(matches!(
            sorted_ids(&registry, ids),
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn unregistered_component_is_reported() {
        let registry = registry();
        assert!(matches!(
            <(Position, u8)>::component_ids(&registry),
            Err(QueryError::UnregisteredComponent(_))
        ));
    }
}
