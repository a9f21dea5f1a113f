use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use lume_blind_date::config::{LoggingSettings, Settings, StorageBackend};
use lume_blind_date::core::{Collaborators, Engine};
use lume_blind_date::routes::{self, AppState};
use lume_blind_date::services::{
    spawn_matching_loop, spawn_sweep_loop, EntryStore, HttpCollaborators, LogNotifier,
    MemoryStore, Notifier, PostgresStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "pretty" {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).pretty())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).json())
            .init();
    }
}

fn startup_error(what: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", what, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("Configuration error: {}", e))
    })?;

    init_tracing(&settings.logging);

    info!("Starting Lume blind date engine...");

    let store: Arc<dyn EntryStore> = match settings.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory entry store");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Postgres => {
            let url = settings
                .storage
                .url
                .as_deref()
                .ok_or_else(|| startup_error("Missing storage url", "set storage.url or DATABASE_URL"))?;

            let postgres = PostgresStore::from_settings(
                url,
                settings.storage.max_connections,
                settings.storage.min_connections,
                settings.storage.acquire_timeout_secs,
                settings.storage.idle_timeout_secs,
            )
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;

            info!("PostgreSQL entry store initialized");
            Arc::new(postgres)
        }
    };

    let collab = &settings.collaborators;
    let http = Arc::new(
        HttpCollaborators::new(
            collab.verification_url.clone(),
            collab.payment_url.clone(),
            collab.notification_url.clone(),
            collab.api_key.clone(),
            Duration::from_secs(collab.timeout_secs.unwrap_or(10)),
            collab.verification_cache_size.unwrap_or(10_000),
            Duration::from_secs(collab.verification_cache_ttl_secs.unwrap_or(300)),
        )
        .map_err(|e| startup_error("Failed to build collaborator client", e))?,
    );

    let notifier: Arc<dyn Notifier> = if collab.notification_url.is_some() {
        http.clone() as Arc<dyn Notifier>
    } else {
        info!("No notification endpoint configured, logging lifecycle events only");
        Arc::new(LogNotifier)
    };

    let policy = settings.to_policy();
    let weights = settings.to_weights();
    info!("Engine initialized with weights: {:?}", weights);

    let engine = Engine::new(
        store,
        Collaborators {
            verification: http.clone(),
            payments: http,
            notifier,
        },
        policy,
        weights,
    );

    let _matching = spawn_matching_loop(
        engine.matcher.clone(),
        Duration::from_secs(settings.matching.pass_interval_secs),
    );
    let _sweeps = spawn_sweep_loop(
        engine.coordinator.clone(),
        Duration::from_secs(settings.matching.sweep_interval_secs),
    );

    let app_state = AppState { engine };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(routes::json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(routes::query_error_handler))
            .app_data(web::PathConfig::default().error_handler(routes::path_error_handler))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
