//! Fixed-size bit vectors over the candidate universe.
//!
//! A [`BitSet`] is immutable once frozen. Every binary operation walks the
//! two word arrays once, so its cost is `O(N / 64)` regardless of how many
//! bits end up set. Bits at positions `>= len` in the last word are always
//! zero; `not` re-masks them.

use std::fmt;

use combidx_error::{CombidxError, Result};
use combidx_types::CandidateId;

const WORD_BITS: u32 = 64;

#[inline]
const fn bit(id: u32) -> (usize, u64) {
    ((id / WORD_BITS) as usize, 1u64 << (id % WORD_BITS))
}

#[inline]
const fn word_count(len: u32) -> usize {
    len.div_ceil(WORD_BITS) as usize
}

/// Mask of valid bits in the last word (all ones when `len` is aligned).
#[inline]
const fn tail_mask(len: u32) -> u64 {
    match len % WORD_BITS {
        0 => u64::MAX,
        r => (1u64 << r) - 1,
    }
}

/// Mutable accumulator that freezes into a [`BitSet`].
#[derive(Debug, Clone)]
pub struct BitSetBuilder {
    len: u32,
    words: Vec<u64>,
}

impl BitSetBuilder {
    pub fn new(len: u32) -> Self {
        Self {
            len,
            words: vec![0; word_count(len)],
        }
    }

    /// Set bit `id`; ids outside `[0, len)` are rejected.
    #[inline]
    pub fn insert(&mut self, id: u32) -> Result<()> {
        if id >= self.len {
            return Err(CombidxError::validation(format!(
                "id {id} outside bitset of size {}",
                self.len
            )));
        }
        let (w, mask) = bit(id);
        self.words[w] |= mask;
        Ok(())
    }

    pub fn freeze(self) -> BitSet {
        BitSet {
            len: self.len,
            words: self.words.into_boxed_slice(),
        }
    }
}

/// Immutable subset of `[0, len)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    len: u32,
    words: Box<[u64]>,
}

impl BitSet {
    /// The empty subset.
    pub fn empty(len: u32) -> Self {
        BitSetBuilder::new(len).freeze()
    }

    /// Every id in `[0, len)`.
    pub fn full(len: u32) -> Self {
        let mut words = vec![u64::MAX; word_count(len)];
        if let Some(last) = words.last_mut() {
            *last &= tail_mask(len);
        }
        Self {
            len,
            words: words.into_boxed_slice(),
        }
    }

    /// Build from raw ids; any id `>= len` is a validation error.
    pub fn from_ids<I>(len: u32, ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut builder = BitSetBuilder::new(len);
        for id in ids {
            builder.insert(id)?;
        }
        Ok(builder.freeze())
    }

    /// Build from candidate ids.
    pub fn from_candidates(len: u32, ids: &[CandidateId]) -> Result<Self> {
        Self::from_ids(len, ids.iter().map(|id| id.get()))
    }

    /// Universe size this set ranges over.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        if id >= self.len {
            return false;
        }
        let (w, mask) = bit(id);
        self.words[w] & mask != 0
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Backing words, least significant bit first.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    fn zip_with(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Self {
        assert_eq!(
            self.len, other.len,
            "bitset size mismatch: {} vs {}",
            self.len, other.len
        );
        let words = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(&a, &b)| op(a, b))
            .collect();
        Self {
            len: self.len,
            words,
        }
    }

    /// Intersection.
    ///
    /// # Panics
    ///
    /// Panics if the two sets range over different universe sizes.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a & b)
    }

    /// Union.
    ///
    /// # Panics
    ///
    /// Panics if the two sets range over different universe sizes.
    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a | b)
    }

    /// Difference `self \ other`.
    ///
    /// # Panics
    ///
    /// Panics if the two sets range over different universe sizes.
    #[must_use]
    pub fn and_not(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a & !b)
    }

    /// Symmetric difference.
    ///
    /// # Panics
    ///
    /// Panics if the two sets range over different universe sizes.
    #[must_use]
    pub fn xor(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a ^ b)
    }

    /// Complement within `[0, len)`.
    #[must_use]
    pub fn not(&self) -> Self {
        let mut words: Box<[u64]> = self.words.iter().map(|&w| !w).collect();
        if let Some(last) = words.last_mut() {
            *last &= tail_mask(self.len);
        }
        Self {
            len: self.len,
            words,
        }
    }

    /// Whether every member of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .words
                .iter()
                .zip(other.words.iter())
                .all(|(&a, &b)| a & !b == 0)
    }

    /// Set bit positions in ascending order.
    pub fn iter(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    pub fn to_ids(&self) -> Vec<u32> {
        self.iter().collect()
    }

    pub fn to_candidate_ids(&self) -> Vec<CandidateId> {
        self.iter().map(CandidateId::new).collect()
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitSet")
            .field("len", &self.len)
            .field("cardinality", &self.cardinality())
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = u32;
    type IntoIter = Ones<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over set bits, lowest first.
#[derive(Debug, Clone)]
pub struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = u32;

    #[allow(clippy::cast_possible_truncation)]
    fn next(&mut self) -> Option<u32> {
        while self.current == 0 {
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
        let bit = self.current.trailing_zeros();
        self.current &= self.current - 1; // Clear lowest set bit.
        Some(self.word_idx as u32 * WORD_BITS + bit)
    }
}
