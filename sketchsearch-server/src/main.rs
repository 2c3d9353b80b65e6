use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use sketchsearch::api::ApiServer;
use sketchsearch::backends::{IndexClient, MemoryIndex, OpenSearchBackend, SearchBackend};
use sketchsearch::config::{BackendKind, Config, HistoryBackend};
use sketchsearch::history::{HistoryStore, MemoryHistoryStore, SearchHistory, SqliteHistoryStore};
use sketchsearch::registry::{SketchRegistry, StaticRegistry};
use sketchsearch::security::{AclAuthorizer, AllowAll, Authorizer};
use sketchsearch::SearchOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sketchsearch-server")]
#[command(about = "Sketch search and search history HTTP server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "sketchsearch.toml")]
    config: PathBuf,

    /// Server bind address (overrides config)
    #[arg(long)]
    bind_addr: Option<String>,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Registry YAML file (overrides config)
    #[arg(long)]
    registry: Option<PathBuf>,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let format = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| config.observability.log_format.clone());

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_backend(config: &Config) -> Result<Arc<dyn SearchBackend>> {
    match config.backend.kind {
        BackendKind::Memory => {
            let index = MemoryIndex::with_keep_alive(config.search.keep_alive()?);
            if let Some(path) = &config.backend.fixtures {
                index.load_fixtures(path)?;
            }
            Ok(Arc::new(index))
        }
        BackendKind::OpenSearch => {
            tracing::info!("Using OpenSearch at {}", config.backend.url);
            Ok(Arc::new(OpenSearchBackend::new(config.opensearch())?))
        }
    }
}

fn build_history(config: &Config) -> Result<Arc<dyn HistoryStore>> {
    match config.storage.history {
        HistoryBackend::Sqlite => {
            let path = config.history_db_path();
            tracing::info!("Search history database: {:?}", path);
            Ok(Arc::new(SqliteHistoryStore::new(path)?))
        }
        HistoryBackend::Memory => {
            tracing::warn!("Search history is kept in memory and lost on restart");
            Ok(Arc::new(MemoryHistoryStore::new()))
        }
    }
}

fn build_registry(config: &Config) -> Result<Arc<dyn SketchRegistry>> {
    match &config.registry.path {
        Some(path) => Ok(Arc::new(StaticRegistry::from_yaml(path)?)),
        None => Err(anyhow!(
            "registry.path is not set; no sketches can be searched"
        )),
    }
}

fn build_authorizer(config: &Config) -> Arc<dyn Authorizer> {
    if config.security.enabled {
        Arc::new(AclAuthorizer::new(&config.security))
    } else {
        tracing::warn!("Security disabled: every user may access every sketch");
        Arc::new(AllowAll)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_create(&args.config)?;
    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(registry) = args.registry {
        config.registry.path = Some(registry);
    }

    init_tracing(&config);
    config.ensure_dirs()?;

    tracing::info!("Starting sketchsearch server");
    tracing::info!("Config file: {:?}", args.config);
    tracing::info!("Data dir: {:?}", config.storage.data_dir);

    let backend = build_backend(&config)?;
    let client =
        IndexClient::new(backend, config.search.fanout()).with_cursor_ttl(config.search.keep_alive()?);
    tracing::info!("Search backend: {}", client.backend_name());
    let history = SearchHistory::new(build_history(&config)?);
    let orchestrator = Arc::new(SearchOrchestrator::new(
        client,
        build_registry(&config)?,
        build_authorizer(&config),
        history,
        config.search.clone(),
    ));

    let extra = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow!("Failed to install metrics recorder: {}", e))?;
        Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
    } else {
        Router::new()
    };

    let server = ApiServer::new(orchestrator, config.security.user_header.clone())
        .with_cors(config.server.cors.clone())
        .with_body_limit(config.server.max_body_size);
    server.serve_with(&config.server.bind_addr, extra).await?;

    Ok(())
}
