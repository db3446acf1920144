mod dependency;
mod descriptor;
mod enabled;
mod handle;
mod iter;
mod state;

pub(crate) use self::{descriptor::ChunkPlan, handle::check_tick};

pub use self::{
    dependency::{FenceTracker, JobDependencies, NoDependencies, ReadFence, WriteFence},
    descriptor::{
        ArchetypeQueryDescriptor, QueryBuilder, QueryOptions, RequirementSet, TypeRefs,
        MAX_QUERY_COMPONENT_TYPES,
    },
    enabled::{
        find_next_enabled_range, ChunkMask, EnabledIter, IterMode, CHUNK_MASK_BITS,
        RANGE_MODE_EDGE_THRESHOLD,
    },
    handle::{ComponentLookup, ResolvedChunk, TypeHandle},
    iter::{IterStats, QueryEnumerator},
    state::EntityQuery,
};
