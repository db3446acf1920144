use {
    crate::{
        component::{Component, ComponentId},
        entity::Entity,
        query::ChunkMask,
    },
    std::{any::Any, fmt},
};

/// Type-erased column of one component type in a chunk.
pub trait Column: Send + Sync + 'static {
    /// Id of stored component.
    fn component(&self) -> ComponentId;

    /// Number of stored components.
    fn len(&self) -> usize;

    /// Removes component at `index` replacing it with the last one.
    fn swap_remove(&mut self, index: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Column of components of type `T`.
pub struct TypedColumn<T> {
    component: ComponentId,
    data: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    pub(crate) fn boxed(component: ComponentId, capacity: usize) -> Box<dyn Column> {
        Box::new(TypedColumn::<T> {
            component,
            data: Vec::with_capacity(capacity),
        })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub(crate) fn push(&mut self, value: T) {
        self.data.push(value)
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn component(&self) -> ComponentId {
        self.component
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn swap_remove(&mut self, index: usize) {
        self.data.swap_remove(index);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Column with its per-chunk bookkeeping.
pub(crate) struct ColumnSlot {
    pub data: Box<dyn Column>,

    /// Enabled bit for each entity.
    /// Kept for every column, meaningful only for enableable components.
    pub enabled: ChunkMask,

    /// Tick of last structural change or write access.
    pub version: u64,
}

/// Fixed capacity block of entities of one archetype.
/// Columns are in the same order as archetype's components.
pub struct Chunk {
    capacity: usize,
    entities: Vec<Entity>,
    pub(crate) columns: Box<[ColumnSlot]>,
}

impl fmt::Debug for Chunk {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Chunk")
            .field("len", &self.entities.len())
            .field("capacity", &self.capacity)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl Chunk {
    pub(crate) fn new(capacity: usize, columns: impl Iterator<Item = Box<dyn Column>>) -> Self {
        Chunk {
            capacity,
            entities: Vec::with_capacity(capacity),
            columns: columns
                .map(|data| ColumnSlot {
                    data,
                    enabled: ChunkMask::EMPTY,
                    version: 0,
                })
                .collect(),
        }
    }

    /// Number of entities in the chunk.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns enabled mask of the column at `position`.
    pub fn enabled_mask(&self, position: usize) -> ChunkMask {
        self.columns[position].enabled
    }

    /// Returns change version of the column at `position`.
    pub fn version(&self, position: usize) -> u64 {
        self.columns[position].version
    }

    /// Returns typed column at `position`.
    pub fn column<T: Component>(&self, position: usize) -> Option<&[T]> {
        let column = self.columns.get(position)?;
        column
            .data
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .map(TypedColumn::as_slice)
    }

    pub(crate) fn column_mut<T: Component>(&mut self, position: usize) -> Option<&mut TypedColumn<T>> {
        let column = self.columns.get_mut(position)?;
        column.data.as_any_mut().downcast_mut::<TypedColumn<T>>()
    }

    /// Finishes insertion of a new entity.
    /// Caller must have pushed exactly one component into every column.
    /// New entity has all its components enabled.
    pub(crate) fn finish_push(&mut self, entity: Entity, tick: u64) -> usize {
        debug_assert!(!self.is_full());
        let index = self.entities.len();
        self.entities.push(entity);

        for column in self.columns.iter_mut() {
            debug_assert_eq!(
                column.data.len(),
                self.entities.len(),
                "Every column must receive one component",
            );
            column.enabled.set(index, true);
            column.version = tick;
        }
        index
    }

    /// Removes entity at `index`.
    /// Returns entity that was moved into its place, if any.
    pub(crate) fn swap_remove(&mut self, index: usize, tick: u64) -> Option<Entity> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(index);

        for column in self.columns.iter_mut() {
            column.data.swap_remove(index);
            let moved = column.enabled.get(last);
            column.enabled.set(index, moved);
            column.enabled.set(last, false);
            column.version = tick;
        }

        if index == last {
            None
        } else {
            Some(self.entities[index])
        }
    }

    pub(crate) fn set_enabled(&mut self, position: usize, index: usize, enabled: bool) {
        debug_assert!(index < self.entities.len());
        self.columns[position].enabled.set(index, enabled);
    }

    /// Marks column at `position` as written at `tick`.
    pub(crate) fn touch(&mut self, position: usize, tick: u64) {
        self.columns[position].version = tick;
    }

    /// Borrows entities and columns separately.
    pub(crate) fn split_mut(&mut self) -> (&[Entity], &mut [ColumnSlot]) {
        (&self.entities, &mut self.columns)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::generation::Generation};

    fn entity(index: u32) -> Entity {
        Entity {
            index,
            generation: Generation::new(),
        }
    }

    fn chunk() -> Chunk {
        Chunk::new(
            4,
            vec![
                TypedColumn::<u32>::boxed(ComponentId(2), 4),
                TypedColumn::<&'static str>::boxed(ComponentId(3), 4),
            ]
            .into_iter(),
        )
    }

    fn push(chunk: &mut Chunk, value: u32, tick: u64) -> usize {
        chunk.column_mut::<u32>(0).unwrap().push(value);
        chunk.column_mut::<&'static str>(1).unwrap().push("x");
        chunk.finish_push(entity(value), tick)
    }

    #[test]
    fn push_enables_and_stamps() {
        let mut chunk = chunk();
        assert_eq!(push(&mut chunk, 10, 3), 0);
        assert_eq!(push(&mut chunk, 11, 4), 1);
        assert_eq!(chunk.enabled_mask(0).as_u128(), 0b11);
        assert_eq!(chunk.version(1), 4);
        assert_eq!(chunk.column::<u32>(0), Some(&[10, 11][..]));
        assert!(chunk.column::<u64>(0).is_none());
    }

    #[test]
    fn swap_remove_moves_last_entity_and_bit() {
        let mut chunk = chunk();
        for i in 0..3 {
            push(&mut chunk, i, 1);
        }
        chunk.set_enabled(0, 2, false);

        assert_eq!(chunk.swap_remove(0, 7), Some(entity(2)));
        assert_eq!(chunk.column::<u32>(0), Some(&[2, 1][..]));
        assert_eq!(chunk.enabled_mask(0).as_u128(), 0b10);
        assert_eq!(chunk.version(0), 7);

        assert_eq!(chunk.swap_remove(1, 8), None);
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.enabled_mask(0).as_u128(), 0b0);
    }
}
