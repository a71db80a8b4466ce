//! Timing histograms for background work
//!
//! Samples are kept in memory; exporting them is left to the embedder.

mod histogram;

pub use histogram::{HistogramSnapshot, TimingHistogram};

/// Wall time of each non-empty frecency recalculation chunk, in ms
pub const FRECENCY_RECALC_CHUNK_TIME_MS: &str = "PLACES_FRECENCY_RECALC_CHUNK_TIME_MS";
