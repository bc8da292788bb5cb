//! Candidate universe enumeration.
//!
//! The universe is every strictly ascending `k`-tuple over `[1, M]`, in
//! lexicographic order: id 0 is `(1, 2, .., k)`, id `N - 1` is
//! `(M - k + 1, .., M)`.

use combidx_error::Result;
use combidx_types::{Candidate, CandidateId, UniverseShape};

/// Source of the complete, ordered candidate list.
///
/// Called once at startup; the universe is immutable afterwards.
pub trait CandidateUniverseProvider {
    /// Shape every candidate conforms to.
    fn shape(&self) -> UniverseShape;

    /// Every candidate with precomputed features, ordered by id.
    fn candidates(&self) -> Result<Vec<Candidate>>;
}

/// Lexicographic iterator over ascending `k`-tuples of `[1, M]`.
#[derive(Debug, Clone)]
pub struct Combinations {
    alphabet: u8,
    current: Option<Vec<u8>>,
}

impl Combinations {
    pub fn new(shape: &UniverseShape) -> Self {
        let first = (1..=shape.tuple_len).collect();
        Self {
            alphabet: shape.alphabet,
            current: Some(first),
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let out = self.current.take()?;
        let k = out.len();
        let mut next = out.clone();
        // Rightmost position that can still be bumped: next[i] < M - (k - 1 - i).
        let mut i = k;
        while i > 0 {
            i -= 1;
            let ceiling = usize::from(self.alphabet) - (k - 1 - i);
            if usize::from(next[i]) < ceiling {
                next[i] += 1;
                for j in i + 1..k {
                    next[j] = next[j - 1] + 1;
                }
                self.current = Some(next);
                return Some(out);
            }
        }
        Some(out)
    }
}

/// Enumerate the full universe with derived features.
pub fn enumerate_universe(shape: &UniverseShape) -> Result<Vec<Candidate>> {
    shape.validate()?;
    let n = shape.size()?;
    let mut out = Vec::with_capacity(n as usize);
    for (raw, units) in (0..n).zip(Combinations::new(shape)) {
        out.push(Candidate::from_units(shape, CandidateId::new(raw), units)?);
    }
    Ok(out)
}

/// Provider that synthesizes the universe from its shape.
#[derive(Debug, Clone, Copy)]
pub struct EnumeratedUniverse {
    shape: UniverseShape,
}

impl EnumeratedUniverse {
    pub fn new(shape: UniverseShape) -> Self {
        Self { shape }
    }
}

impl CandidateUniverseProvider for EnumeratedUniverse {
    fn shape(&self) -> UniverseShape {
        self.shape
    }

    fn candidates(&self) -> Result<Vec<Candidate>> {
        enumerate_universe(&self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinations_of_five_choose_two() {
        let shape = UniverseShape::new(5, 2).expect("valid");
        let all: Vec<Vec<u8>> = Combinations::new(&shape).collect();
        assert_eq!(
            all,
            vec![
                vec![1, 2],
                vec![1, 3],
                vec![1, 4],
                vec![1, 5],
                vec![2, 3],
                vec![2, 4],
                vec![2, 5],
                vec![3, 4],
                vec![3, 5],
                vec![4, 5],
            ]
        );
    }

    #[test]
    fn full_tuple_has_single_combination() {
        let shape = UniverseShape::new(4, 4).expect("valid");
        let all: Vec<Vec<u8>> = Combinations::new(&shape).collect();
        assert_eq!(all, vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn enumerated_count_matches_binomial() {
        let shape = UniverseShape::new(12, 4).expect("valid");
        let all = enumerate_universe(&shape).expect("enumerate");
        assert_eq!(all.len(), 495);
        assert_eq!(all[0].units, vec![1, 2, 3, 4]);
        assert_eq!(all[494].units, vec![9, 10, 11, 12]);
        assert!(all.iter().enumerate().all(|(i, c)| c.id.index() == i));
    }

    #[test]
    fn provider_reports_shape() {
        let shape = UniverseShape::new(6, 3).expect("valid");
        let provider = EnumeratedUniverse::new(shape);
        assert_eq!(provider.shape(), shape);
        assert_eq!(provider.candidates().expect("enumerate").len(), 20);
    }
}
