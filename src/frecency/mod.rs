//! Frecency scoring and background recalculation
//!
//! - **formula**: the score of a single page
//! - **recalculator**: the scheduler that keeps cached scores fresh
//! - **interval**: periodic "anything pending?" wake-ups
//! - **topic**: control notifications understood by the recalculator

mod formula;
mod interval;
mod recalculator;
mod topic;

pub use formula::{FrecencyInputs, FrecencyParams, VisitSample, calculate_frecency};
pub use interval::{RecalculationInterval, TokioInterval};
pub use recalculator::{FrecencyRecalculator, RecalcState};
pub use topic::ObserverTopic;
