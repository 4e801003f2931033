use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newscast_backend::controllers::audio::AudioController;
use newscast_backend::domain::audio::AudioCoordinator;
use newscast_backend::infrastructure::cache::ArtifactCache;
use newscast_backend::infrastructure::config::{Config, LogFormat};
use newscast_backend::infrastructure::db::{check_connection, create_pool};
use newscast_backend::infrastructure::http::start_http_server;
use newscast_backend::infrastructure::repositories::{
    NewsRepository, NewsStore, PollySynthesisProvider, SynthesisProvider,
};
use newscast_backend::infrastructure::storage::FileStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting Newscast Backend on {}:{}",
        config.host,
        config.port
    );

    // Create database connection pool
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    // Verify database connection
    check_connection(&pool).await?;
    tracing::info!("Database connection verified");

    // Create AWS Polly client
    tracing::info!(
        "Initializing AWS Polly client with region: {}",
        config.aws_region
    );
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.aws_region.clone()))
        .load()
        .await;
    let polly_client = Arc::new(aws_sdk_polly::Client::new(&aws_config));
    tracing::info!("AWS Polly client initialized");

    let pool = Arc::new(pool);
    let config = Arc::new(config);

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Storage backend and fast-tier cache (created once, torn down at shutdown)
    let store = Arc::new(FileStore::new(config.storage_options()));
    let cache = Arc::new(ArtifactCache::new(config.cache_capacity));
    tracing::info!(
        base_path = %config.audio_base_path.display(),
        cache_capacity = config.cache_capacity,
        "Artifact storage initialized"
    );

    // 2. Collaborators: news metadata reader and synthesis provider
    let news_repo: Arc<dyn NewsStore> = Arc::new(NewsRepository::new(pool.clone()));
    let synthesis: Arc<dyn SynthesisProvider> =
        Arc::new(PollySynthesisProvider::new(polly_client, news_repo.clone()));

    // 3. The coordinator (injected with everything it orchestrates)
    let coordinator = Arc::new(AudioCoordinator::new(
        news_repo,
        synthesis,
        store,
        cache,
        config.merge_item_count,
    ));

    // 4. Controllers
    let audio_controller = Arc::new(AudioController::new(coordinator));

    // Start HTTP server with all routes
    start_http_server(pool, &config.host, config.port, audio_controller).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "newscast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "newscast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
