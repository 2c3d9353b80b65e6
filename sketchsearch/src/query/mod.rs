//! Query compilation, in-memory evaluation and time histograms.

pub mod dsl;
pub mod histogram;
pub mod lucene;
pub mod matcher;

pub use dsl::build_query;
pub use histogram::{aggregate_date_histogram, DateInterval};
