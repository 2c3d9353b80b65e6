//! Data shapes shared across the search pipeline.

mod event;
mod request;
mod selection;
mod sketch;

pub use event::{EventSource, SearchResultEvent};
pub use request::{
    Chip, ChipKind, ChipOperator, IndexRef, QueryFilter, SearchRequest, SortOrder,
};
pub use selection::{EventRef, Selection};
pub use sketch::{SearchTemplate, Sketch, Timeline};
