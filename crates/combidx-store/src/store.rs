//! `CompactRecordStore`: one fixed-width byte slot per candidate.
//!
//! All slots live in a single contiguous buffer, so `get(id)` is one offset
//! computation plus a decode. The classifier reads units through
//! [`CompactRecordStore::units`] without decoding the rest of the slot.

use std::time::Instant;

use combidx_error::{CombidxError, Result};
use combidx_types::{Candidate, CandidateId, UniverseShape};
use tracing::{debug, error, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::layout::{SlotLayout, validate_candidate};
use crate::universe::CandidateUniverseProvider;

/// Compact, immutable, id-addressed candidate storage.
#[derive(Debug, Clone)]
pub struct CompactRecordStore {
    shape: UniverseShape,
    layout: SlotLayout,
    len: u32,
    slots: Box<[u8]>,
    fingerprint: u64,
}

impl CompactRecordStore {
    /// Encode `candidates` into slots.
    ///
    /// Ids must be dense and ascending from 0, tuples must be valid for
    /// `shape`, features must equal the derived ones, and the total must be
    /// `C(M, k)`. The first violation aborts the load.
    pub fn load<I>(shape: UniverseShape, candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let started = Instant::now();
        shape.validate()?;
        let expected = shape.size()?;
        let layout = SlotLayout::for_shape(&shape);
        let width = layout.width();
        let mut slots = vec![0u8; expected as usize * width];

        let mut next: u32 = 0;
        for candidate in candidates {
            let id = candidate.id.get();
            if id < next {
                return Err(CombidxError::validation(format!(
                    "duplicate or out-of-order candidate id {id} (expected {next})"
                )));
            }
            if id > next {
                return Err(CombidxError::validation(format!(
                    "candidate ids skip from {next} to {id}"
                )));
            }
            if next >= expected {
                return Err(CombidxError::validation(format!(
                    "universe has more than C({}, {}) = {expected} candidates",
                    shape.alphabet, shape.tuple_len
                )));
            }
            validate_candidate(&shape, &candidate)?;
            let at = id as usize * width;
            layout.encode(&candidate, &mut slots[at..at + width])?;
            next += 1;
        }
        if next != expected {
            return Err(CombidxError::validation(format!(
                "universe has {next} candidates, C({}, {}) = {expected}",
                shape.alphabet, shape.tuple_len
            )));
        }

        let slots = slots.into_boxed_slice();
        let fingerprint = xxh3_64(&slots);
        info!(
            target: "combidx.store",
            candidates = expected,
            slot_width = width,
            bytes = slots.len(),
            fingerprint = format_args!("{fingerprint:016x}"),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "candidate store loaded"
        );
        Ok(Self {
            shape,
            layout,
            len: expected,
            slots,
            fingerprint,
        })
    }

    /// Load from a universe provider.
    pub fn from_provider(provider: &dyn CandidateUniverseProvider) -> Result<Self> {
        Self::load(provider.shape(), provider.candidates()?)
    }

    /// Number of candidates `N`.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn shape(&self) -> &UniverseShape {
        &self.shape
    }

    #[inline]
    pub fn slot_width(&self) -> usize {
        self.layout.width()
    }

    /// Bytes held by the slot buffer.
    pub fn footprint_bytes(&self) -> usize {
        self.slots.len()
    }

    /// `xxh3` digest of every slot; changes iff the universe changes.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[inline]
    fn slot(&self, id: CandidateId) -> Option<&[u8]> {
        if id.get() >= self.len {
            return None;
        }
        let width = self.layout.width();
        let at = id.index() * width;
        self.slots.get(at..at + width)
    }

    /// Decode candidate `id`, distinguishing absence from corruption.
    pub fn try_get(&self, id: CandidateId) -> Result<Option<Candidate>> {
        self.slot(id)
            .map(|slot| self.layout.decode(slot, id))
            .transpose()
    }

    /// Decode candidate `id`; `None` when the id is outside `[0, N)`.
    ///
    /// A slot that fails to decode is logged at `error` and also reported as
    /// `None`. Callers that must tell corruption apart from absence use
    /// [`try_get`](Self::try_get).
    pub fn get(&self, id: CandidateId) -> Option<Candidate> {
        match self.try_get(id) {
            Ok(found) => found,
            Err(err) => {
                error!(target: "combidx.store", %id, %err, "slot failed to decode");
                None
            }
        }
    }

    /// Decode every present id, in request order; absent ids are skipped.
    pub fn get_many(&self, ids: &[CandidateId]) -> Vec<Candidate> {
        ids.iter().filter_map(|&id| self.get(id)).collect()
    }

    /// Like [`Self::get_many`] but also reports which ids were absent.
    pub fn lookup_many(&self, ids: &[CandidateId]) -> (Vec<Candidate>, Vec<CandidateId>) {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match self.get(id) {
                Some(c) => found.push(c),
                None => missing.push(id),
            }
        }
        if !missing.is_empty() {
            debug!(
                target: "combidx.store",
                requested = ids.len(),
                missing = missing.len(),
                "lookup_many had absent ids"
            );
        }
        (found, missing)
    }

    /// Borrow the units of candidate `id` without decoding the slot.
    #[inline]
    pub fn units(&self, id: CandidateId) -> Option<&[u8]> {
        self.slot(id).map(|slot| &slot[self.layout.units_range()])
    }

    /// Iterate `(id, units)` over the whole universe in id order.
    pub fn iter_units(&self) -> impl Iterator<Item = (CandidateId, &[u8])> + '_ {
        let range = self.layout.units_range();
        self.slots
            .chunks_exact(self.layout.width())
            .enumerate()
            .map(move |(i, slot)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = CandidateId::new(i as u32);
                (id, &slot[range.clone()])
            })
    }

    /// Iterate decoded candidates in id order.
    pub fn iter(&self) -> impl Iterator<Item = Candidate> + '_ {
        (0..self.len).filter_map(|raw| self.get(CandidateId::new(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{EnumeratedUniverse, enumerate_universe};
    use proptest::prelude::*;

    fn small_shape() -> UniverseShape {
        UniverseShape::new(5, 2).expect("valid shape")
    }

    fn small_store() -> CompactRecordStore {
        CompactRecordStore::from_provider(&EnumeratedUniverse::new(small_shape()))
            .expect("store loads")
    }

    #[test]
    fn get_returns_candidate_or_none() {
        let store = small_store();
        assert_eq!(store.len(), 10);
        let c = store.get(CandidateId::new(4)).expect("id 4 exists");
        assert_eq!(c.units, vec![2, 3]);
        assert_eq!(c.features.sum, 5);
        assert!(store.get(CandidateId::new(10)).is_none());
        assert!(store.get(CandidateId::new(u32::MAX)).is_none());
    }

    #[test]
    fn corrupt_slot_is_none_from_get_and_an_error_from_try_get() {
        let mut store = small_store();
        let id = CandidateId::new(3);
        let at = id.index() * store.slot_width();
        // Overwrite the stored id so the cross-check on decode fails.
        store.slots[at..at + 4].copy_from_slice(&7u32.to_le_bytes());

        assert!(store.get(id).is_none());
        assert!(matches!(store.try_get(id), Err(CombidxError::Corrupt { .. })));
        assert!(matches!(store.try_get(CandidateId::new(10)), Ok(None)));
        assert!(store.get(CandidateId::new(2)).is_some());
    }

    #[test]
    fn get_many_skips_absent_and_lookup_reports_them() {
        let store = small_store();
        let ids = [CandidateId::new(9), CandidateId::new(42), CandidateId::new(0)];
        let got = store.get_many(&ids);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].units, vec![4, 5]);
        assert_eq!(got[1].units, vec![1, 2]);

        let (found, missing) = store.lookup_many(&ids);
        assert_eq!(found.len(), 2);
        assert_eq!(missing, vec![CandidateId::new(42)]);
    }

    #[test]
    fn load_rejects_duplicates_gaps_and_wrong_counts() {
        let shape = small_shape();
        let all = enumerate_universe(&shape).expect("enumerate");

        let mut dup = all.clone();
        dup[3].id = CandidateId::new(2);
        let err = CompactRecordStore::load(shape, dup).expect_err("duplicate id");
        assert!(err.to_string().contains("duplicate"));

        let mut gap = all.clone();
        gap.remove(5);
        assert!(CompactRecordStore::load(shape, gap).is_err());

        let short: Vec<_> = all.iter().take(9).cloned().collect();
        assert!(CompactRecordStore::load(shape, short).is_err());

        let mut bad_units = all;
        bad_units[0].units = vec![2, 1];
        assert!(CompactRecordStore::load(shape, bad_units).is_err());
    }

    #[test]
    fn slots_are_compact() {
        let shape = UniverseShape::new(35, 5).expect("valid");
        let layout = SlotLayout::for_shape(&shape);
        assert!(layout.width() <= 20);
        let store = small_store();
        assert_eq!(store.footprint_bytes(), 10 * store.slot_width());
    }

    #[test]
    fn units_view_matches_decode() {
        let store = small_store();
        for (id, units) in store.iter_units() {
            let c = store.get(id).expect("present");
            assert_eq!(units, c.units.as_slice());
            assert_eq!(store.units(id), Some(units));
        }
        assert_eq!(store.iter().count(), 10);
    }

    #[test]
    fn fingerprint_tracks_shape() {
        let a = small_store();
        let b = small_store();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let other = CompactRecordStore::from_provider(&EnumeratedUniverse::new(
            UniverseShape::new(6, 2).expect("valid"),
        ))
        .expect("loads");
        assert_ne!(a.fingerprint(), other.fingerprint());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_store_roundtrip_every_candidate(alphabet in 3u8..=12, k in 1u8..=3) {
            prop_assume!(k <= alphabet);
            let shape = UniverseShape::new(alphabet, k).expect("valid");
            let all = enumerate_universe(&shape).expect("enumerate");
            let store = CompactRecordStore::load(shape, all.clone()).expect("load");
            for c in &all {
                let got = store.get(c.id);
                prop_assert_eq!(got.as_ref(), Some(c));
            }
        }
    }
}
