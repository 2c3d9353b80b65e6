pub mod client;
pub mod memory;
pub mod opensearch;
pub mod r#trait;

pub use client::{CursorOwner, ExecuteResult, FanoutConfig, IndexClient, IndexCounts};
pub use memory::{MemoryIndex, StoredDocument};
pub use opensearch::{OpenSearchBackend, OpenSearchConfig};
pub use r#trait::{BackendResponse, IndexQuery, RawHit, SearchBackend};
