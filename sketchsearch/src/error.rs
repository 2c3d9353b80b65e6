use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing filter: a query filter is required")]
    MissingFilter,

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Parent search node {parent_id} belongs to sketch {parent_sketch}, not sketch {sketch_id}")]
    CrossSketchParent {
        parent_id: i64,
        parent_sketch: i64,
        sketch_id: i64,
    },

    #[error("Parent search node not found: {0}")]
    ParentNotFound(i64),

    #[error("Invalid scroll cursor: {0}")]
    InvalidCursor(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Sketch not found: {0}")]
    SketchNotFound(i64),

    #[error("Search node not found: {0}")]
    NodeNotFound(i64),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Cycle detected in search history at node {0}")]
    CycleDetected(i64),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Client input errors: detected before any state is written.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::MissingFilter
                | Self::IndexNotFound(_)
                | Self::CrossSketchParent { .. }
                | Self::ParentNotFound(_)
                | Self::InvalidCursor(_)
                | Self::Permission(_)
                | Self::Unauthenticated(_)
                | Self::SketchNotFound(_)
                | Self::NodeNotFound(_)
        )
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Short machine-readable kind, used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::MissingFilter => "missing_filter",
            Self::IndexNotFound(_) => "index_not_found",
            Self::CrossSketchParent { .. } => "cross_sketch_parent",
            Self::ParentNotFound(_) => "parent_not_found",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::Permission(_) => "permission",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::SketchNotFound(_) => "sketch_not_found",
            Self::NodeNotFound(_) => "node_not_found",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::CycleDetected(_) => "cycle_detected",
            Self::Backend(_) => "backend",
            Self::Storage(_) => "storage",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
            Self::Http(_) => "http",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
