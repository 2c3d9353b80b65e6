use crate::config::CorsConfig;
use crate::search::SearchOrchestrator;
use crate::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    routing::post,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SearchOrchestrator>,
    /// Request header carrying the authenticated user.
    pub user_header: String,
}

pub struct ApiServer {
    orchestrator: Arc<SearchOrchestrator>,
    user_header: String,
    cors_config: CorsConfig,
    max_body_size: usize,
}

impl ApiServer {
    pub fn new(orchestrator: Arc<SearchOrchestrator>, user_header: impl Into<String>) -> Self {
        Self {
            orchestrator,
            user_header: user_header.into(),
            cors_config: CorsConfig::default(),
            max_body_size: 10 * 1024 * 1024,
        }
    }

    pub fn with_cors(mut self, cors_config: CorsConfig) -> Self {
        self.cors_config = cors_config;
        self
    }

    pub fn with_body_limit(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(&self) -> CorsLayer {
        if !self.cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = self
            .cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let has_wildcard = self.cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            user_header: self.user_header.clone(),
        };

        let api = Router::new()
            .route(
                "/api/v1/sketches/:sketch_id/explore/",
                post(crate::api::routes::explore),
            )
            .route(
                "/api/v1/sketches/:sketch_id/searchhistory/",
                get(crate::api::routes::list_history),
            )
            .route(
                "/api/v1/sketches/:sketch_id/searchhistory/:node_id/",
                get(crate::api::routes::get_history_node)
                    .post(crate::api::routes::annotate_history_node),
            )
            .route("/health", get(crate::api::routes::health))
            .with_state(state);

        api.layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(self.build_cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve the API merged with `extra` routes (e.g. a metrics endpoint).
    pub async fn serve_with(self, addr: &str, extra: Router) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router().merge(extra))
            .await
            .map_err(|e| crate::Error::Backend(e.to_string()))?;

        Ok(())
    }
}
