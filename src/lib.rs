//! # places-frecency - Frecency recalculation for browser history
//!
//! Keeps the "frecency" (frequency + recency) ranking of history pages and
//! their origins up to date in the background.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - **places**: SQLite history store (pages, origins, visits, bookmarks)
//! - **frecency**: Scoring formula and the background recalculator
//! - **telemetry**: Timing histograms for recalculation chunks
//! - **config**: Recalculator settings with environment overrides
//! - **utils**: Shared utilities and error types

pub mod config;
pub mod frecency;
pub mod places;
pub mod telemetry;
pub mod utils;

// Re-export main types for convenience
pub use config::RecalculatorConfig;
pub use frecency::{FrecencyRecalculator, ObserverTopic, RecalcState};
pub use places::{PlacesStore, VisitTransition};
pub use utils::error::{PlacesError, Result, SchedulerError};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "places-frecency";
