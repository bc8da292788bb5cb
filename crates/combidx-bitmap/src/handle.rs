//! Publication point for the current [`BitmapIndex`].
//!
//! Readers take a snapshot (an `Arc` clone) and keep using it for as long as
//! they like; a writer builds a complete replacement off to the side and
//! swaps it in with [`IndexHandle::publish`]. A failed build never reaches
//! `publish`, so readers only ever observe whole indexes.
//!
//! Reads are lock-free: a snapshot is one atomic pointer load plus a
//! reference-count increment, and never waits on a publishing writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tracing::info;

use crate::index::BitmapIndex;

#[derive(Debug)]
pub struct IndexHandle {
    current: ArcSwap<BitmapIndex>,
    generation: AtomicU64,
}

impl IndexHandle {
    pub fn new(initial: BitmapIndex) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(0),
        }
    }

    /// The currently published index.
    #[inline]
    pub fn snapshot(&self) -> Arc<BitmapIndex> {
        self.current.load_full()
    }

    /// Replace the published index, returning the previous one.
    pub fn publish(&self, next: BitmapIndex) -> Arc<BitmapIndex> {
        let next = Arc::new(next);
        let dimensions = next.dimensions().count();
        let previous = self.current.swap(next);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            target: "combidx.bitmap",
            generation,
            dimensions,
            "bitmap index published"
        );
        previous
    }

    /// Number of successful publishes since creation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
