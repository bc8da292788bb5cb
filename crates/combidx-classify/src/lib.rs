//! Classification engine.
//!
//! [`classify`] partitions the candidate universe into categories keyed by
//! how many of each candidate's units fall into each recency bucket.
//! [`score_hits`] measures, per category, how candidates overlapped an
//! outcome once it is known.

pub mod classify;
pub mod hits;

pub use classify::{Classification, category_alphabet, classify};
pub use hits::score_hits;
