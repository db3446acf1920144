//! Sieve - archetype query matching and chunk iteration
//!
//! This crate decides which archetypes satisfy declarative component queries
//! and iterates their entities chunk by chunk,
//! honoring per-entity enabled bits of enableable components.
//!

pub mod archetype;
pub mod aspect;
pub mod bundle;
pub mod component;
pub mod entity;
pub mod error;
pub mod generation;
pub mod query;
pub mod registry;
pub mod world;

mod util;

pub use self::{
    archetype::{Archetype, ArchetypeId, ArchetypeInfo, Chunk},
    aspect::{Aspect, AspectLookup, AspectTypeHandle, Read, Write},
    bundle::Bundle,
    component::{AccessMode, Component, ComponentId, ComponentTypeRef, Disabled, Prefab},
    entity::Entity,
    error::QueryError,
    query::{
        ArchetypeQueryDescriptor, ComponentLookup, EntityQuery, JobDependencies, QueryBuilder,
        QueryEnumerator, QueryOptions, ResolvedChunk, TypeHandle,
    },
    registry::{RegistryBuilder, TypeRegistry},
    world::{World, WorldBuilder},
};
