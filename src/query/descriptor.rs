//! Declarative archetype predicates.
//!
//! A descriptor is made of five component sets:
//!
//! * `all` - every type must be present and enabled.
//! * `any` - at least one type must be present and enabled.
//! * `none` - no type may be present and enabled.
//! * `disabled` - every type must be present and disabled.
//! * `absent` - no type may be present, regardless of enabled state.
//!
//! Structural part of the predicate is checked once per archetype with
//! [`ArchetypeQueryDescriptor::matches`].
//! Enabled state part is checked per entity with chunk masks.

use {
    super::{ChunkMask, EntityQuery},
    crate::{
        archetype::{ArchetypeInfo, Chunk},
        aspect::Aspect,
        component::{
            AccessMode, Component, ComponentId, ComponentTypeRef, DISABLED_ID, PREFAB_ID,
        },
        error::QueryError,
        registry::{self, TypeRegistry},
    },
    bitflags::bitflags,
    smallvec::SmallVec,
    std::sync::Arc,
};

/// Maximum number of distinct component types one descriptor may reference.
pub const MAX_QUERY_COMPONENT_TYPES: usize = 16;

bitflags! {
    /// Options altering archetype and entity matching.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct QueryOptions: u32 {
        /// Match archetypes with [`Prefab`](crate::component::Prefab) marker.
        const INCLUDE_PREFAB = 0x1;

        /// Match archetypes with [`Disabled`](crate::component::Disabled) marker.
        const INCLUDE_DISABLED_ENTITIES = 0x2;

        /// Treat every present component as enabled.
        const IGNORE_COMPONENT_ENABLED_STATE = 0x4;
    }
}

/// Short list of component type references.
pub type TypeRefs = SmallVec<[ComponentTypeRef; 4]>;

/// Set of component type references.
/// Adding a type that is already in the set widens its access instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequirementSet {
    refs: SmallVec<[ComponentTypeRef; 8]>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, type_ref: ComponentTypeRef) {
        match self.refs.iter_mut().find(|r| r.id == type_ref.id) {
            Some(existing) => existing.access = existing.access.union(type_ref.access),
            None => self.refs.push(type_ref),
        }
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.refs.iter().any(|r| r.id == id)
    }

    pub fn access_of(&self, id: ComponentId) -> Option<AccessMode> {
        self.refs.iter().find(|r| r.id == id).map(|r| r.access)
    }

    pub fn as_slice(&self) -> &[ComponentTypeRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

impl Extend<ComponentTypeRef> for RequirementSet {
    fn extend<I: IntoIterator<Item = ComponentTypeRef>>(&mut self, iter: I) {
        for type_ref in iter {
            self.add(type_ref);
        }
    }
}

/// Immutable archetype predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeQueryDescriptor {
    all: TypeRefs,
    any: TypeRefs,
    none: TypeRefs,
    disabled: TypeRefs,
    absent: TypeRefs,
    change_filter: SmallVec<[ComponentId; 2]>,
    options: QueryOptions,
}

impl ArchetypeQueryDescriptor {
    /// Validates and builds descriptor.
    ///
    /// Does not check that `disabled` types are enableable,
    /// as that requires the registry. [`QueryBuilder`] does.
    pub fn new(
        all: &[ComponentTypeRef],
        any: &[ComponentTypeRef],
        none: &[ComponentTypeRef],
        disabled: &[ComponentTypeRef],
        absent: &[ComponentTypeRef],
        change_filter: &[ComponentId],
        options: QueryOptions,
    ) -> Result<Self, QueryError> {
        let sets = [
            ("all", all),
            ("any", any),
            ("none", none),
            ("disabled", disabled),
            ("absent", absent),
        ];

        let mut seen: SmallVec<[(ComponentId, &str); MAX_QUERY_COMPONENT_TYPES]> =
            SmallVec::new();

        for (name, set) in sets {
            for (index, type_ref) in set.iter().enumerate() {
                if set[..index].iter().any(|r| r.id == type_ref.id) {
                    return Err(QueryError::invalid(format!(
                        "Component {} is repeated in `{}`",
                        type_ref.id, name
                    )));
                }

                if let Some((_, other)) = seen.iter().find(|(id, _)| *id == type_ref.id) {
                    return Err(QueryError::invalid(format!(
                        "Component {} is in both `{}` and `{}`",
                        type_ref.id, other, name
                    )));
                }
            }
            seen.extend(set.iter().map(|r| (r.id, name)));
        }

        for (index, &id) in change_filter.iter().enumerate() {
            if change_filter[..index].contains(&id) {
                return Err(QueryError::invalid(format!(
                    "Component {} is repeated in change filter",
                    id
                )));
            }
            if !all.iter().chain(any).any(|r| r.id == id) {
                return Err(QueryError::invalid(format!(
                    "Change filter component {} is in neither `all` nor `any`",
                    id
                )));
            }
        }

        if seen.len() > MAX_QUERY_COMPONENT_TYPES {
            return Err(QueryError::TooManyComponentTypes {
                count: seen.len(),
                max: MAX_QUERY_COMPONENT_TYPES,
            });
        }

        Ok(ArchetypeQueryDescriptor {
            all: all.into(),
            any: any.into(),
            none: none.into(),
            disabled: disabled.into(),
            absent: absent.into(),
            change_filter: change_filter.into(),
            options,
        })
    }

    pub fn all(&self) -> &[ComponentTypeRef] {
        &self.all
    }

    pub fn any(&self) -> &[ComponentTypeRef] {
        &self.any
    }

    pub fn none(&self) -> &[ComponentTypeRef] {
        &self.none
    }

    pub fn disabled(&self) -> &[ComponentTypeRef] {
        &self.disabled
    }

    pub fn absent(&self) -> &[ComponentTypeRef] {
        &self.absent
    }

    pub fn change_filter(&self) -> &[ComponentId] {
        &self.change_filter
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    /// Number of distinct component types referenced.
    pub fn component_type_count(&self) -> usize {
        self.all.len() + self.any.len() + self.none.len() + self.disabled.len() + self.absent.len()
    }

    /// Types whose columns are accessed when iterating.
    pub fn accessed(&self) -> impl Iterator<Item = &ComponentTypeRef> + '_ {
        self.all.iter().chain(&self.any).chain(&self.disabled)
    }

    fn references(&self, id: ComponentId) -> bool {
        self.all
            .iter()
            .chain(&self.any)
            .chain(&self.none)
            .chain(&self.disabled)
            .chain(&self.absent)
            .any(|r| r.id == id)
    }

    fn ignores_enabled_state(&self) -> bool {
        self.options
            .contains(QueryOptions::IGNORE_COMPONENT_ENABLED_STATE)
    }

    fn marker_allowed(&self, archetype: &ArchetypeInfo, marker: ComponentId, option: QueryOptions) -> bool {
        !archetype.has(marker) || self.options.contains(option) || self.references(marker)
    }

    /// Checks structural part of the predicate.
    pub fn matches(&self, archetype: &ArchetypeInfo) -> bool {
        let ignore_enabled = self.ignores_enabled_state();

        self.all.iter().all(|r| archetype.has(r.id))
            && (self.any.is_empty() || self.any.iter().any(|r| archetype.has(r.id)))
            && self.none.iter().all(|r| match archetype.position(r.id) {
                None => true,
                // Enableable instance may still be disabled per entity.
                Some(position) => {
                    !ignore_enabled && archetype.components()[position].is_enableable()
                }
            })
            && self.disabled.iter().all(|r| archetype.has_enableable(r.id))
            && self.absent.iter().all(|r| !archetype.has(r.id))
            && self.marker_allowed(archetype, PREFAB_ID, QueryOptions::INCLUDE_PREFAB)
            && self.marker_allowed(
                archetype,
                DISABLED_ID,
                QueryOptions::INCLUDE_DISABLED_ENTITIES,
            )
    }

    /// Returns true if entities of matching archetype
    /// must be filtered by enabled bits.
    pub fn requires_enabled_bits(&self, archetype: &ArchetypeInfo) -> bool {
        !self.mask_plan(archetype).is_unconditional()
    }

    pub(crate) fn mask_plan(&self, archetype: &ArchetypeInfo) -> MaskPlan {
        if self.ignores_enabled_state() {
            return MaskPlan::default();
        }

        let enableable_position = |r: &ComponentTypeRef| {
            archetype
                .position(r.id)
                .filter(|&p| archetype.components()[p].is_enableable())
        };

        let enabled = self.all.iter().filter_map(enableable_position).collect();
        let disabled = self
            .disabled
            .iter()
            .chain(&self.none)
            .filter_map(enableable_position)
            .collect();

        let mut any_enabled = SmallVec::new();
        let mut any_unconditional = self.any.is_empty();
        for r in &self.any {
            if let Some(position) = archetype.position(r.id) {
                if archetype.components()[position].is_enableable() {
                    any_enabled.push(position);
                } else {
                    any_unconditional = true;
                }
            }
        }

        MaskPlan {
            enabled,
            disabled,
            any_enabled: if any_unconditional {
                None
            } else {
                Some(any_enabled)
            },
        }
    }

    pub(crate) fn chunk_plan(&self, archetype: &ArchetypeInfo) -> ChunkPlan {
        ChunkPlan {
            mask: self.mask_plan(archetype),
            changed: if self.change_filter.is_empty() {
                None
            } else {
                Some(
                    self.change_filter
                        .iter()
                        .filter_map(|&id| archetype.position(id))
                        .collect(),
                )
            },
        }
    }
}

/// Column positions whose enabled masks make up the combined mask of a chunk.
#[derive(Clone, Debug, Default)]
pub(crate) struct MaskPlan {
    /// Must be enabled.
    enabled: SmallVec<[usize; 4]>,
    /// Must be disabled.
    disabled: SmallVec<[usize; 4]>,
    /// At least one must be enabled.
    any_enabled: Option<SmallVec<[usize; 4]>>,
}

impl MaskPlan {
    pub fn is_unconditional(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty() && self.any_enabled.is_none()
    }

    /// Computes combined mask clamped to chunk length.
    pub fn compute(&self, chunk: &Chunk) -> ChunkMask {
        let mut mask = ChunkMask::first(chunk.len());
        for &position in &self.enabled {
            mask = mask & chunk.enabled_mask(position);
        }
        for &position in &self.disabled {
            mask = mask & !chunk.enabled_mask(position);
        }
        if let Some(any) = &self.any_enabled {
            mask = mask
                & any
                    .iter()
                    .fold(ChunkMask::EMPTY, |acc, &p| acc | chunk.enabled_mask(p));
        }
        mask
    }
}

/// Per archetype plan of one descriptor.
#[derive(Clone, Debug)]
pub(crate) struct ChunkPlan {
    pub mask: MaskPlan,
    /// Positions of change filter columns, `None` if descriptor has no change filter.
    pub changed: Option<SmallVec<[usize; 2]>>,
}

impl ChunkPlan {
    /// Returns true if chunk passes change filter.
    pub fn accepts_changes(&self, chunk: &Chunk, since: u64) -> bool {
        match &self.changed {
            None => true,
            Some(positions) => positions.iter().any(|&p| chunk.version(p) > since),
        }
    }
}

#[derive(Default)]
struct PendingDescriptor {
    all: TypeRefs,
    any: TypeRefs,
    none: TypeRefs,
    disabled: TypeRefs,
    absent: TypeRefs,
    aspects: RequirementSet,
    change_filter: SmallVec<[ComponentId; 2]>,
    options: QueryOptions,
}

/// Builds [`EntityQuery`] from one or more descriptors.
///
/// Methods never fail immediately.
/// First error is reported by [`QueryBuilder::build`].
pub struct QueryBuilder {
    registry: Arc<TypeRegistry>,
    pending: PendingDescriptor,
    descriptors: Vec<ArchetypeQueryDescriptor>,
    error: Option<QueryError>,
}

impl QueryBuilder {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        QueryBuilder {
            registry,
            pending: PendingDescriptor::default(),
            descriptors: Vec::new(),
            error: None,
        }
    }

    /// Creates builder bound to process-wide registry.
    pub fn global() -> Result<Self, QueryError> {
        Ok(QueryBuilder::new(registry::global()?))
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push_typed<T: Component>(
        mut self,
        access: AccessMode,
        set: fn(&mut PendingDescriptor) -> &mut TypeRefs,
    ) -> Self {
        match self.registry.id_of::<T>() {
            Ok(id) => set(&mut self.pending).push(ComponentTypeRef { id, access }),
            Err(err) => self.fail(err),
        }
        self
    }

    fn push_ref(
        mut self,
        type_ref: ComponentTypeRef,
        set: fn(&mut PendingDescriptor) -> &mut TypeRefs,
    ) -> Self {
        set(&mut self.pending).push(type_ref);
        self
    }

    /// Requires `T` to be present and enabled. Grants read access.
    pub fn with_all<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadOnly, |p| &mut p.all)
    }

    /// Requires `T` to be present and enabled. Grants write access.
    pub fn with_all_rw<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadWrite, |p| &mut p.all)
    }

    pub fn with_all_ref(self, type_ref: ComponentTypeRef) -> Self {
        self.push_ref(type_ref, |p| &mut p.all)
    }

    /// Requires at least one of `any` types to be present and enabled.
    pub fn with_any<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadOnly, |p| &mut p.any)
    }

    pub fn with_any_rw<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadWrite, |p| &mut p.any)
    }

    pub fn with_any_ref(self, type_ref: ComponentTypeRef) -> Self {
        self.push_ref(type_ref, |p| &mut p.any)
    }

    /// Excludes entities with enabled `T`.
    pub fn with_none<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadOnly, |p| &mut p.none)
    }

    pub fn with_none_ref(self, type_ref: ComponentTypeRef) -> Self {
        self.push_ref(type_ref, |p| &mut p.none)
    }

    /// Requires `T` to be present and disabled.
    /// `T` must be enableable.
    pub fn with_disabled<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadOnly, |p| &mut p.disabled)
    }

    pub fn with_disabled_rw<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadWrite, |p| &mut p.disabled)
    }

    pub fn with_disabled_ref(self, type_ref: ComponentTypeRef) -> Self {
        self.push_ref(type_ref, |p| &mut p.disabled)
    }

    /// Excludes archetypes with `T`, regardless of enabled state.
    pub fn with_absent<T: Component>(self) -> Self {
        self.push_typed::<T>(AccessMode::ReadOnly, |p| &mut p.absent)
    }

    pub fn with_absent_ref(self, type_ref: ComponentTypeRef) -> Self {
        self.push_ref(type_ref, |p| &mut p.absent)
    }

    /// Skips chunks where `T` was not written since the query's last run.
    /// `T` must be in `all` or `any`.
    pub fn with_change_filter<T: Component>(mut self) -> Self {
        match self.registry.id_of::<T>() {
            Ok(id) => self.pending.change_filter.push(id),
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn with_change_filter_id(mut self, id: ComponentId) -> Self {
        self.pending.change_filter.push(id);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.pending.options |= options;
        self
    }

    /// Adds aspect's requirements to `all`.
    /// Types already required are merged, write access wins.
    pub fn with_aspect<A: Aspect>(mut self) -> Self {
        if let Err(err) = A::add_component_requirements_to(&self.registry, &mut self.pending.aspects)
        {
            self.fail(err);
        }
        self
    }

    /// Closes current descriptor and starts a new one.
    /// Query matches archetypes matching any of its descriptors.
    pub fn add_additional_query(mut self) -> Self {
        self.close();
        self
    }

    fn close(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        match self.finish(pending) {
            Ok(descriptor) => self.descriptors.push(descriptor),
            Err(err) => self.fail(err),
        }
    }

    fn finish(&self, pending: PendingDescriptor) -> Result<ArchetypeQueryDescriptor, QueryError> {
        for r in &pending.disabled {
            if !self.registry.is_enableable(r.id) {
                return Err(QueryError::invalid(format!(
                    "Component `{}` in `disabled` is not enableable",
                    self.registry.name_of(r.id)
                )));
            }
        }

        let mut all = pending.all;
        for &required in pending.aspects.as_slice() {
            match all.iter_mut().find(|r| r.id == required.id) {
                Some(existing) => existing.access = existing.access.union(required.access),
                None => all.push(required),
            }
        }

        ArchetypeQueryDescriptor::new(
            &all,
            &pending.any,
            &pending.none,
            &pending.disabled,
            &pending.absent,
            &pending.change_filter,
            pending.options,
        )
    }

    /// Validates and returns all descriptors.
    pub fn build_descriptors(mut self) -> Result<Vec<ArchetypeQueryDescriptor>, QueryError> {
        self.close();
        match self.error {
            Some(err) => {
                log::error!("Failed to build query: {}", err);
                Err(err)
            }
            None => Ok(self.descriptors),
        }
    }

    pub fn build(self) -> Result<EntityQuery, QueryError> {
        let registry = self.registry.clone();
        let descriptors = self.build_descriptors()?;
        EntityQuery::new(registry, descriptors)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{archetype::ArchetypeId, component::Prefab},
    };

    struct A;
    struct B;
    struct C;
    struct E;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::builder()
                .register::<A>()
                .register::<B>()
                .register::<C>()
                .register_enableable::<E>()
                .build()
                .unwrap(),
        )
    }

    fn archetype(registry: &TypeRegistry, mut ids: Vec<ComponentId>) -> ArchetypeInfo {
        ids.sort();
        let components = ids.iter().map(|&id| *registry.info(id).unwrap()).collect();
        ArchetypeInfo::new(ArchetypeId(0), components, 128)
    }

    fn single(builder: QueryBuilder) -> ArchetypeQueryDescriptor {
        builder.build_descriptors().unwrap().remove(0)
    }

    #[test]
    fn repeated_type_is_rejected() {
        let registry = registry();
        let a = ComponentTypeRef::read_only(registry.id_of::<A>().unwrap());
        let result = ArchetypeQueryDescriptor::new(&[a, a], &[], &[], &[], &[], &[], QueryOptions::empty());
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn type_in_two_sets_is_rejected() {
        let registry = registry();
        let result = QueryBuilder::new(registry.clone())
            .with_all::<A>()
            .with_absent::<A>()
            .build_descriptors();
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));

        let result = QueryBuilder::new(registry)
            .with_all::<E>()
            .with_disabled::<E>()
            .build_descriptors();
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn disabled_requires_enableable() {
        let result = QueryBuilder::new(registry())
            .with_disabled::<A>()
            .build_descriptors();
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn change_filter_must_be_required() {
        let registry = registry();
        let result = QueryBuilder::new(registry.clone())
            .with_all::<A>()
            .with_change_filter::<B>()
            .build_descriptors();
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));

        let result = QueryBuilder::new(registry)
            .with_any::<B>()
            .with_change_filter::<B>()
            .build_descriptors();
        assert!(result.is_ok());
    }

    #[test]
    fn too_many_types_are_rejected() {
        let refs = (0..17)
            .map(|i| ComponentTypeRef::read_only(ComponentId(i)))
            .collect::<Vec<_>>();
        let result =
            ArchetypeQueryDescriptor::new(&refs, &[], &[], &[], &[], &[], QueryOptions::empty());
        assert_eq!(
            result,
            Err(QueryError::TooManyComponentTypes { count: 17, max: 16 })
        );

        assert!(ArchetypeQueryDescriptor::new(
            &refs[..16],
            &[],
            &[],
            &[],
            &[],
            &[],
            QueryOptions::empty()
        )
        .is_ok());
    }

    #[test]
    fn unregistered_type_is_reported() {
        struct Unknown;
        let result = QueryBuilder::new(registry())
            .with_all::<Unknown>()
            .build_descriptors();
        assert!(matches!(result, Err(QueryError::UnregisteredComponent(_))));
    }

    #[test]
    fn structural_matching() {
        let registry = registry();
        let [a, b, c, e] = [
            registry.id_of::<A>().unwrap(),
            registry.id_of::<B>().unwrap(),
            registry.id_of::<C>().unwrap(),
            registry.id_of::<E>().unwrap(),
        ];

        let descriptor = single(
            QueryBuilder::new(registry.clone())
                .with_all::<A>()
                .with_any::<B>()
                .with_any::<C>()
                .with_absent::<E>(),
        );

        assert!(descriptor.matches(&archetype(&registry, vec![a, b])));
        assert!(descriptor.matches(&archetype(&registry, vec![c, a])));
        assert!(!descriptor.matches(&archetype(&registry, vec![a])));
        assert!(!descriptor.matches(&archetype(&registry, vec![b, c])));
        assert!(!descriptor.matches(&archetype(&registry, vec![a, b, e])));
    }

    #[test]
    fn none_is_structural_only_for_plain_components() {
        let registry = registry();
        let [a, b, e] = [
            registry.id_of::<A>().unwrap(),
            registry.id_of::<B>().unwrap(),
            registry.id_of::<E>().unwrap(),
        ];

        let descriptor = single(
            QueryBuilder::new(registry.clone())
                .with_all::<A>()
                .with_none::<B>()
                .with_none::<E>(),
        );

        assert!(!descriptor.matches(&archetype(&registry, vec![a, b])));
        let with_e = archetype(&registry, vec![a, e]);
        assert!(descriptor.matches(&with_e));
        assert!(descriptor.requires_enabled_bits(&with_e));
        assert!(!descriptor.requires_enabled_bits(&archetype(&registry, vec![a])));

        let ignoring = single(
            QueryBuilder::new(registry.clone())
                .with_all::<A>()
                .with_none::<E>()
                .with_options(QueryOptions::IGNORE_COMPONENT_ENABLED_STATE),
        );
        assert!(!ignoring.matches(&with_e));
    }

    #[test]
    fn markers_are_excluded_unless_requested() {
        let registry = registry();
        let a = registry.id_of::<A>().unwrap();
        let prefab = archetype(&registry, vec![a, PREFAB_ID]);
        let disabled = archetype(&registry, vec![a, DISABLED_ID]);

        let plain = single(QueryBuilder::new(registry.clone()).with_all::<A>());
        assert!(!plain.matches(&prefab));
        assert!(!plain.matches(&disabled));

        let with_option = single(
            QueryBuilder::new(registry.clone())
                .with_all::<A>()
                .with_options(QueryOptions::INCLUDE_PREFAB),
        );
        assert!(with_option.matches(&prefab));
        assert!(!with_option.matches(&disabled));

        let explicit = single(
            QueryBuilder::new(registry.clone())
                .with_all::<A>()
                .with_all::<Prefab>(),
        );
        assert!(explicit.matches(&prefab));
    }

    #[test]
    fn requirement_set_widens_access() {
        let mut set = RequirementSet::new();
        set.add(ComponentTypeRef::read_only(ComponentId(4)));
        set.add(ComponentTypeRef::read_write(ComponentId(4)));
        set.add(ComponentTypeRef::read_only(ComponentId(4)));
        set.extend(Some(ComponentTypeRef::read_only(ComponentId(5))));

        assert_eq!(set.len(), 2);
        assert_eq!(set.access_of(ComponentId(4)), Some(AccessMode::ReadWrite));
        assert!(set.contains(ComponentId(5)));
    }

    #[test]
    fn additional_query_is_validated_independently() {
        let registry = registry();
        let descriptors = QueryBuilder::new(registry.clone())
            .with_all::<A>()
            .add_additional_query()
            .with_all::<B>()
            .with_absent::<A>()
            .build_descriptors()
            .unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[1].absent().len(), 1);

        let result = QueryBuilder::new(registry)
            .with_all::<A>()
            .with_none::<A>()
            .add_additional_query()
            .with_all::<B>()
            .build_descriptors();
        assert!(result.is_err());
    }
}
