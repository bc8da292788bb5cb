//! Bitmap indexes over the candidate universe.
//!
//! [`BitSet`] is the shared currency between the static feature indexes,
//! the classifier, and ad hoc predicates. [`BitmapIndex`] is built once per
//! universe and read concurrently through an [`IndexHandle`].

pub mod bitset;
pub mod handle;
pub mod index;

pub use bitset::{BitSet, BitSetBuilder, Ones};
pub use handle::IndexHandle;
pub use index::{BitmapIndex, FeatureDimension, FeatureIndex, FeatureKey, IndexConfig};
