use {
    crate::{
        archetype::ArchetypeId,
        generation::{Generation, GenerationCounter},
    },
    std::fmt,
};

/// Location of entity's components in storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// Archetype storing the entity.
    pub archetype: ArchetypeId,

    /// Chunk index in archetype.
    pub chunk: u32,

    /// Index in chunk.
    pub index: u32,
}

/// Entity handle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    /// Index in entities array.
    pub(crate) index: u32,

    /// Generation id.
    pub(crate) generation: Generation,
}

impl Entity {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Entity({}v{:?})", self.index, self.generation)
    }
}

struct Entry {
    generation: GenerationCounter,
    location: Option<Location>,
}

/// Collection of all entities.
/// Entity contains nothing more than indices to its components.
#[derive(Default)]
pub(crate) struct EntityLocations {
    /// Array of entity entries contains current generation for the index
    /// and location of entity's components.
    entries: Vec<Entry>,

    /// List of free entity indices.
    free: Vec<u32>,
}

impl fmt::Debug for EntityLocations {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "EntityLocations {{ entries: [Entry; {}], free: {} }}",
            self.entries.len(),
            self.free.len(),
        )
    }
}

impl EntityLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns new entity with specified location.
    pub fn spawn(&mut self, location: Location) -> Entity {
        if let Some(index) = self.free.pop() {
            // free index left. Use it.
            let entry = &mut self.entries[index as usize];
            debug_assert!(entry.location.is_none());
            entry.location = Some(location);

            Entity {
                generation: entry.generation.get(),
                index,
            }
        } else {
            let index = match u32::try_from(self.entries.len()) {
                Ok(index) => index,
                Err(_) => panic!("Entity index overflows `u32`"),
            };
            let generation = GenerationCounter::new();
            let entity = Entity {
                generation: generation.get(),
                index,
            };
            self.entries.push(Entry {
                generation,
                location: Some(location),
            });
            entity
        }
    }

    /// Frees the entity. Returns its last location.
    pub fn despawn(&mut self, entity: Entity) -> Option<Location> {
        let entry = self.entries.get_mut(entity.index as usize)?;
        if entry.generation.get() != entity.generation {
            return None;
        }
        let location = entry.location.take()?;
        entry.generation.bump();
        self.free.push(entity.index);
        Some(location)
    }

    pub fn get(&self, entity: Entity) -> Option<Location> {
        let entry = self.entries.get(entity.index as usize)?;
        if entry.generation.get() == entity.generation {
            entry.location
        } else {
            None
        }
    }

    /// Updates location of alive entity.
    pub fn relocate(&mut self, entity: Entity, location: Location) {
        match self.entries.get_mut(entity.index as usize) {
            Some(entry) if entry.generation.get() == entity.generation => {
                entry.location = Some(location);
            }
            _ => debug_assert!(false, "Relocating dead entity {:?}", entity),
        }
    }

    /// Number of alive entities.
    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }
}
