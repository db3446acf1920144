//! Enabled bits of chunk entities and iteration over them.
//!
//! Every chunk keeps one [`ChunkMask`] per enableable component.
//! Query combines masks of components it cares about into single mask
//! and [`EnabledIter`] enumerates indices of set bits.
//!
//! Iteration picks one of two strategies by counting bit transitions in the mask.
//! Few transitions mean few long runs of enabled entities,
//! which are walked range by range.
//! Many transitions mean short scattered runs, which are walked bit by bit.

use std::{
    fmt,
    iter::FusedIterator,
    ops::{BitAnd, BitOr, Not, Range},
};

/// Maximum number of entities in a chunk.
pub const CHUNK_MASK_BITS: usize = 128;

/// Masks with at most this many bit edges are iterated range by range.
///
/// Empirical constant, tune with benchmarks rather than reasoning.
pub const RANGE_MODE_EDGE_THRESHOLD: i32 = 4;

/// 128 bits, one per entity slot in a chunk.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChunkMask {
    /// Bits 0-63.
    pub lo: u64,
    /// Bits 64-127.
    pub hi: u64,
}

impl ChunkMask {
    pub const EMPTY: Self = ChunkMask { lo: 0, hi: 0 };
    pub const FULL: Self = ChunkMask { lo: !0, hi: !0 };

    pub const fn new(lo: u64, hi: u64) -> Self {
        ChunkMask { lo, hi }
    }

    pub const fn from_u128(bits: u128) -> Self {
        ChunkMask {
            lo: bits as u64,
            hi: (bits >> 64) as u64,
        }
    }

    pub const fn as_u128(self) -> u128 {
        (self.hi as u128) << 64 | self.lo as u128
    }

    /// Mask with bits `0..n` set.
    pub fn first(n: usize) -> Self {
        debug_assert!(n <= CHUNK_MASK_BITS);
        match n {
            0 => ChunkMask::EMPTY,
            n if n >= CHUNK_MASK_BITS => ChunkMask::FULL,
            n => ChunkMask::from_u128((1u128 << n) - 1),
        }
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < CHUNK_MASK_BITS);
        if index < 64 {
            (self.lo >> index) & 1 == 1
        } else {
            (self.hi >> (index - 64)) & 1 == 1
        }
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < CHUNK_MASK_BITS);
        let (word, bit) = if index < 64 {
            (&mut self.lo, index)
        } else {
            (&mut self.hi, index - 64)
        };
        if value {
            *word |= 1 << bit;
        } else {
            *word &= !(1 << bit);
        }
    }

    /// Number of set bits below `n`.
    pub fn count_below(&self, n: usize) -> usize {
        (*self & ChunkMask::first(n)).count_ones()
    }

    pub fn count_ones(&self) -> usize {
        (self.lo.count_ones() + self.hi.count_ones()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.lo == 0 && self.hi == 0
    }

    /// Number of 0-1 and 1-0 transitions in the mask.
    /// Transitions between words are not counted exactly,
    /// the value is only a hint for choosing iteration strategy.
    pub fn edge_count(&self) -> i32 {
        (self.lo ^ (self.lo << 1)).count_ones() as i32
            + (self.hi ^ (self.hi << 1)).count_ones() as i32
            - 1
    }
}

impl fmt::Debug for ChunkMask {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ChunkMask({:#018x}_{:016x})", self.hi, self.lo)
    }
}

impl BitAnd for ChunkMask {
    type Output = ChunkMask;

    fn bitand(self, rhs: ChunkMask) -> ChunkMask {
        ChunkMask {
            lo: self.lo & rhs.lo,
            hi: self.hi & rhs.hi,
        }
    }
}

impl BitOr for ChunkMask {
    type Output = ChunkMask;

    fn bitor(self, rhs: ChunkMask) -> ChunkMask {
        ChunkMask {
            lo: self.lo | rhs.lo,
            hi: self.hi | rhs.hi,
        }
    }
}

impl Not for ChunkMask {
    type Output = ChunkMask;

    fn not(self) -> ChunkMask {
        ChunkMask {
            lo: !self.lo,
            hi: !self.hi,
        }
    }
}

/// Finds next maximal run of set bits starting at or after `search_start`.
/// Returns `(start, end)` of the run, `end` is exclusive.
pub fn find_next_enabled_range(mask: ChunkMask, search_start: usize) -> Option<(usize, usize)> {
    if search_start >= CHUNK_MASK_BITS {
        return None;
    }

    let bits = mask.as_u128() >> search_start;
    if bits == 0 {
        return None;
    }

    let start = search_start + bits.trailing_zeros() as usize;

    // Bits shifted in from the top are zeros and terminate the run.
    let run = !(mask.as_u128() >> start);
    let len = if run == 0 {
        CHUNK_MASK_BITS - start
    } else {
        run.trailing_zeros() as usize
    };

    Some((start, start + len))
}

/// Strategy chosen by [`EnabledIter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterMode {
    /// No mask, every entity is visited.
    Unconditional,
    /// Runs of set bits are found and walked.
    Ranges,
    /// Every bit is tested.
    BitScan,
}

/// Iterator over indices of entities in a chunk that pass enabled bits check.
#[derive(Clone)]
pub struct EnabledIter {
    inner: Inner,
}

#[derive(Clone)]
enum Inner {
    Unconditional(Range<usize>),
    Ranges {
        mask: ChunkMask,
        len: usize,
        current: Range<usize>,
    },
    BitScan {
        word: u64,
        /// Index of bit in `word` lowest bit.
        next: usize,
        /// End of scan in current word.
        word_end: usize,
        hi: u64,
        len: usize,
    },
}

impl EnabledIter {
    /// Visits every index in `0..len`.
    pub fn unconditional(len: usize) -> Self {
        EnabledIter {
            inner: Inner::Unconditional(0..len),
        }
    }

    /// Visits indices in `0..len` whose bit is set in `mask`.
    /// Strategy is chosen by mask edge count.
    pub fn new(mask: ChunkMask, len: usize) -> Self {
        if mask.edge_count() <= RANGE_MODE_EDGE_THRESHOLD {
            EnabledIter::ranges(mask, len)
        } else {
            EnabledIter::bit_scan(mask, len)
        }
    }

    /// Forces range mode.
    pub fn ranges(mask: ChunkMask, len: usize) -> Self {
        debug_assert!(len <= CHUNK_MASK_BITS);
        EnabledIter {
            inner: Inner::Ranges {
                mask,
                len,
                current: 0..0,
            },
        }
    }

    /// Forces bit-scan mode.
    pub fn bit_scan(mask: ChunkMask, len: usize) -> Self {
        debug_assert!(len <= CHUNK_MASK_BITS);
        EnabledIter {
            inner: Inner::BitScan {
                word: mask.lo,
                next: 0,
                word_end: len.min(64),
                hi: mask.hi,
                len,
            },
        }
    }

    /// Returns strategy used by this iterator.
    pub fn mode(&self) -> IterMode {
        match self.inner {
            Inner::Unconditional(_) => IterMode::Unconditional,
            Inner::Ranges { .. } => IterMode::Ranges,
            Inner::BitScan { .. } => IterMode::BitScan,
        }
    }
}

impl Iterator for EnabledIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match &mut self.inner {
            Inner::Unconditional(range) => range.next(),
            Inner::Ranges { mask, len, current } => {
                if let Some(index) = current.next() {
                    return Some(index);
                }

                let (start, end) = find_next_enabled_range(*mask, current.end)?;
                if start >= *len {
                    *current = *len..*len;
                    return None;
                }

                *current = start..end.min(*len);
                current.next()
            }
            Inner::BitScan {
                word,
                next,
                word_end,
                hi,
                len,
            } => loop {
                if *next >= *word_end {
                    if *word_end == 64 && *len > 64 {
                        // Switch to high word.
                        *word = *hi;
                        *hi = 0;
                        *word_end = *len;
                        continue;
                    }
                    return None;
                }

                let index = *next;
                let bit = *word & 1;
                *word >>= 1;
                *next += 1;

                if bit == 1 {
                    return Some(index);
                }
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Inner::Unconditional(range) => range.size_hint(),
            Inner::Ranges { len, current, .. } => {
                (current.len(), Some(len.saturating_sub(current.start)))
            }
            Inner::BitScan { next, len, .. } => (0, Some(len.saturating_sub(*next))),
        }
    }
}

impl FusedIterator for EnabledIter {}

impl fmt::Debug for EnabledIter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "EnabledIter({:?})", self.mode())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{rngs::StdRng, Rng as _, SeedableRng as _},
    };

    fn expected(mask: ChunkMask, len: usize) -> Vec<usize> {
        (0..len).filter(|&i| mask.get(i)).collect()
    }

    #[test]
    fn full_mask_visits_everything_in_range_mode() {
        let iter = EnabledIter::new(ChunkMask::FULL, 100);
        assert_eq!(iter.mode(), IterMode::Ranges);
        assert_eq!(iter.collect::<Vec<_>>(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn empty_mask_visits_nothing() {
        assert_eq!(ChunkMask::EMPTY.edge_count(), -1);
        assert_eq!(EnabledIter::new(ChunkMask::EMPTY, 128).count(), 0);
        assert_eq!(EnabledIter::bit_scan(ChunkMask::EMPTY, 128).count(), 0);
    }

    #[test]
    fn alternating_mask_uses_bit_scan() {
        let odd = ChunkMask::new(0xAAAA_AAAA_AAAA_AAAA, 0xAAAA_AAAA_AAAA_AAAA);
        let iter = EnabledIter::new(odd, 99);
        assert_eq!(iter.mode(), IterMode::BitScan);
        assert_eq!(
            iter.collect::<Vec<_>>(),
            (0..99).filter(|i| i % 2 == 1).collect::<Vec<_>>()
        );

        let even = !odd;
        assert_eq!(
            EnabledIter::new(even, 7).collect::<Vec<_>>(),
            vec![0, 2, 4, 6]
        );
    }

    #[test]
    fn single_run_uses_ranges() {
        let mask = ChunkMask::from_u128(((1u128 << 10) - 1) << 37);
        assert!(mask.edge_count() <= RANGE_MODE_EDGE_THRESHOLD);

        let iter = EnabledIter::new(mask, 100);
        assert_eq!(iter.mode(), IterMode::Ranges);
        assert_eq!(iter.collect::<Vec<_>>(), (37..47).collect::<Vec<_>>());
    }

    #[test]
    fn ranges_are_clamped_to_len() {
        let mask = ChunkMask::from_u128(0b1111_0000);
        assert_eq!(
            EnabledIter::ranges(mask, 6).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert_eq!(EnabledIter::ranges(mask, 4).count(), 0);
        assert_eq!(EnabledIter::ranges(ChunkMask::FULL, 0).count(), 0);
    }

    #[test]
    fn runs_cross_word_boundary() {
        let mask = ChunkMask::from_u128(((1u128 << 8) - 1) << 60);
        assert_eq!(find_next_enabled_range(mask, 0), Some((60, 68)));
        assert_eq!(find_next_enabled_range(mask, 62), Some((62, 68)));
        assert_eq!(find_next_enabled_range(mask, 68), None);
        assert_eq!(
            EnabledIter::bit_scan(mask, 128).collect::<Vec<_>>(),
            (60..68).collect::<Vec<_>>()
        );
    }

    #[test]
    fn find_range_at_edges() {
        assert_eq!(find_next_enabled_range(ChunkMask::FULL, 0), Some((0, 128)));
        assert_eq!(find_next_enabled_range(ChunkMask::FULL, 127), Some((127, 128)));
        assert_eq!(find_next_enabled_range(ChunkMask::FULL, 128), None);
        assert_eq!(
            find_next_enabled_range(ChunkMask::from_u128(1 << 127), 3),
            Some((127, 128))
        );
    }

    #[test]
    fn modes_agree_on_random_masks() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..2000 {
            let mut mask = ChunkMask::new(rng.gen(), rng.gen());
            // Bias half of the masks towards long runs.
            if rng.gen_bool(0.5) {
                let start = rng.gen_range(0..128);
                let end = rng.gen_range(start..=128);
                mask = ChunkMask::first(end) & !ChunkMask::first(start);
            }
            let len = rng.gen_range(0..=128);
            let expected = expected(mask, len);

            assert_eq!(
                EnabledIter::ranges(mask, len).collect::<Vec<_>>(),
                expected,
                "{:?} len {}",
                mask,
                len,
            );
            assert_eq!(
                EnabledIter::bit_scan(mask, len).collect::<Vec<_>>(),
                expected,
                "{:?} len {}",
                mask,
                len,
            );
            assert_eq!(EnabledIter::new(mask, len).collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn mask_bit_ops() {
        let mut mask = ChunkMask::EMPTY;
        mask.set(3, true);
        mask.set(64, true);
        mask.set(127, true);
        assert!(mask.get(3) && mask.get(64) && mask.get(127));
        assert_eq!(mask.count_ones(), 3);
        assert_eq!(mask.count_below(64), 1);
        mask.set(64, false);
        assert!(!mask.get(64));
        assert_eq!(ChunkMask::first(65), ChunkMask::new(!0, 1));
    }
}
