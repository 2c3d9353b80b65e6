pub mod api;
pub mod backends;
pub mod config;
pub mod error;
pub mod history;
pub mod metadata;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod query;
pub mod registry;
pub mod search;
pub mod security;

pub use config::Config;
pub use error::{Error, Result};
pub use search::{ScrollOutcome, SearchOrchestrator, SearchOutcome};
