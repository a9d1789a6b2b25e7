//! Terminal utilities
//!
//! - [`progress`] - spinners for long-running cloud calls

pub mod progress;

pub use progress::Spinner;
