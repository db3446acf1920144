use std::num::NonZeroU64;

/// Opaque generation index.
/// Has niche for enums.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Generation(NonZeroU64);

impl Generation {
    /// Creates initial generation value.
    ///
    /// `Generation::new() == GenerationCounter::new().get()`
    pub const fn new() -> Self {
        Generation(NonZeroU64::MIN)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation::new()
    }
}

/// Opaque generation counter.
#[derive(Debug)]
#[repr(transparent)]
pub struct GenerationCounter(NonZeroU64);

impl GenerationCounter {
    /// Creates new generation counter.
    pub const fn new() -> Self {
        GenerationCounter(NonZeroU64::MIN)
    }

    /// Advances counter.
    pub fn bump(&mut self) {
        self.0 = self
            .0
            .checked_add(1)
            .expect("Overflow while incrementing 64bit. What year is it?");
    }

    /// Returns current generation.
    pub fn get(&self) -> Generation {
        Generation(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_changes_generation() {
        let mut counter = GenerationCounter::new();
        assert_eq!(counter.get(), Generation::new());
        counter.bump();
        assert!(counter.get() > Generation::new());
    }
}
