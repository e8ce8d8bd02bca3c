//! rimg - an image rendition server.
//!
//! This binary wires configuration into concrete backends and starts the
//! HTTP server.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rimg::{
    cache::CacheBackend,
    config::Config,
    server::{create_router, AppState, RouterConfig},
    service::ImageService,
    storage::{create_s3_client, BlobStore, FsBlobStore, S3BlobStore, StorageBackend},
    transform::RasterEngine,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("rimg v{}", env!("CARGO_PKG_VERSION"));

    let (storage_kind, cache_kind) = match (config.storage_backend(), config.cache_backend()) {
        (Ok(s), Ok(c)) => (s, c),
        (Err(e), _) | (_, Err(e)) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Storage backend (authoritative)
    let storage: Arc<dyn BlobStore> = match storage_kind {
        StorageBackend::Fs => {
            info!("storage: fs root {}", config.storage_root);
            Arc::new(FsBlobStore::new(&config.storage_root))
        }
        StorageBackend::S3 => {
            let Some(bucket) = config.s3_bucket.clone() else {
                error!("Configuration error: s3 storage requires a bucket");
                return ExitCode::FAILURE;
            };
            info!("storage: s3 bucket {}", bucket);
            let client =
                create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
            Arc::new(S3BlobStore::new(client, bucket))
        }
    };

    // Cache backend (best-effort accelerator)
    let cache = cache_kind.build(config.cache_capacity, config.cache_max_entries);
    match cache_kind {
        CacheBackend::None => info!("cache: disabled"),
        CacheBackend::Memory => info!(
            "cache: memory, {}MB budget, {}B max object size",
            config.cache_capacity / (1024 * 1024),
            config.cache_max_object_size
        ),
    }

    // Transform engine
    let engine = match &config.logo_dir {
        Some(dir) => RasterEngine::with_logo_dir(dir),
        None => RasterEngine::new(),
    };

    let mut service = ImageService::new(storage, Arc::new(engine))
        .with_cacheable_ceiling(config.cache_max_object_size);
    if let Some(cache) = cache {
        service = service.with_cache(cache);
    }
    if let Some(url) = &config.public_url {
        service = service.with_public_url(url);
    }

    let state = AppState {
        service: Arc::new(service),
        default_format: config.default_format.clone(),
        default_quality: config.default_quality,
        allowed_types: config.allowed_types.clone(),
        save_derivatives: config.save_derivatives,
        etag: config.etag,
        max_age: config.max_age,
    };

    let mut router_config = RouterConfig::default()
        .with_tracing(!config.no_tracing)
        .with_max_upload_size(config.max_upload_size);
    if let Some(origins) = &config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    let router = create_router(state, router_config);

    let addr = config.bind_address();
    info!("listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "rimg=debug,tower_http=debug"
    } else {
        "rimg=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
