//! The duplicate, delta, and period filters (spec §4.6–§4.8).

pub mod delta;
pub mod duplicate;
pub mod period;

pub use delta::DeltaFilter;
pub use duplicate::DuplicateFilter;
pub use period::{PeriodFilter, PeriodOutcome};
