use {
    core::hash::{BuildHasher as _, Hasher},
    hashbrown::hash_map::DefaultHashBuilder,
};

/// Hasher that passes through values that are already hashes, like `TypeId`.
#[derive(Default)]
pub struct NoOpHasher {
    hash: u64,
}

impl Hasher for NoOpHasher {
    fn finish(&self) -> u64 {
        self.hash
    }

    #[cfg(target_pointer_width = "64")]
    fn write_usize(&mut self, i: usize) {
        self.hash = i as u64;
    }

    fn write_u128(&mut self, i: u128) {
        self.hash = i as u64;
    }

    fn write_u64(&mut self, i: u64) {
        self.hash = i;
    }

    fn write(&mut self, bytes: &[u8]) {
        match *bytes {
            [a, b, c, d, e, f, g, h, ..] => {
                self.hash = u64::from_ne_bytes([a, b, c, d, e, f, g, h]);
            }
            _ => {
                let mut hasher = DefaultHashBuilder::default().build_hasher();
                hasher.write(bytes);
                self.hash = hasher.finish();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, core::any::TypeId, core::hash::Hash};

    #[test]
    fn type_ids_hash_apart() {
        let hash = |id: TypeId| {
            let mut hasher = NoOpHasher::default();
            id.hash(&mut hasher);
            hasher.finish()
        };
        assert_ne!(hash(TypeId::of::<u32>()), hash(TypeId::of::<u64>()));
        assert_eq!(hash(TypeId::of::<u32>()), hash(TypeId::of::<u32>()));
    }
}
