//! Compact candidate storage for the combidx engine.
//!
//! [`CompactRecordStore`] keeps the whole universe in fixed-width slots
//! (see [`layout`]) so any candidate is one offset away. The [`universe`]
//! module enumerates the universe for a shape and defines the provider
//! trait callers use to hand in their own.

pub mod layout;
pub mod store;
pub mod universe;

pub use layout::SlotLayout;
pub use store::CompactRecordStore;
pub use universe::{CandidateUniverseProvider, Combinations, EnumeratedUniverse, enumerate_universe};
