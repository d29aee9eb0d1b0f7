use anyhow::{Context, Result};
use axum::Router;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod clients;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use clients::{
    ai::{GeminiClient, TextGenerator},
    assets::{AssetStore, CloudinaryClient},
    kv::{KvStore, UpstashClient},
};
use services::{
    inspiration_service::{InspirationService, SubmissionRules},
    media::{LocalMedia, MediaStore},
    tiers::{
        TierChain, UploadTier,
        asset_tier::AssetTier,
        kv_tier::KvTier,
        memory_tier::MemoryTier,
        seed_tier::{SeedData, SeedTier},
        sqlite_tier::{SqliteTier, run_migrations},
    },
    usage::UsageEstimator,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting inspirations with config: {:?}", cfg);

    // --- Initialize SQLite connection (local tier) ---
    let db = match &cfg.database_url {
        Some(url) => Some(Arc::new(connect_sqlite(url).await?)),
        None => None,
    };

    // --- Handle migration mode ---
    if migrate {
        let db = db
            .as_ref()
            .context("--migrate needs INSPIRATIONS_DATABASE_URL or --database-url")?;
        run_migrations(db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    if let Some(db) = &db {
        run_migrations(db).await?;
    }

    // --- External clients ---
    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("building HTTP client")?;

    let kv: Option<Arc<dyn KvStore>> = cfg.kv.as_ref().map(|kv| {
        Arc::new(UpstashClient::new(http.clone(), kv.url.clone(), kv.token.clone()))
            as Arc<dyn KvStore>
    });
    let assets: Option<Arc<dyn AssetStore>> = cfg.assets.as_ref().map(|a| {
        Arc::new(CloudinaryClient::new(
            http.clone(),
            a.cloud_name.clone(),
            a.api_key.clone(),
            a.api_secret.clone(),
            a.folder.clone(),
        )) as Arc<dyn AssetStore>
    });
    let ai: Option<Arc<dyn TextGenerator>> = cfg.ai.as_ref().map(|ai| {
        Arc::new(GeminiClient::new(http.clone(), ai.api_key.clone(), ai.model.clone()))
            as Arc<dyn TextGenerator>
    });

    // --- Storage tiers, in priority order ---
    let seed = Arc::new(SeedData::bundled()?);
    let local_tier: Arc<dyn UploadTier> = match &db {
        Some(db) => Arc::new(SqliteTier::new(db.clone())),
        None => {
            tracing::warn!("No database URL configured; local uploads are kept in memory");
            Arc::new(MemoryTier::new())
        }
    };
    let tiers = TierChain::new(vec![
        Arc::new(KvTier::new(kv.clone())) as Arc<dyn UploadTier>,
        Arc::new(AssetTier::new(assets.clone(), seed.clone())),
        local_tier,
        Arc::new(SeedTier::new(seed)),
    ]);
    tracing::info!("Configured storage tiers: {:?}", tiers.configured());

    // --- Media sink ---
    let local_media = match &cfg.media_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating media directory {}", dir))?;
            Some(LocalMedia::new(dir))
        }
        None => None,
    };
    let media = MediaStore::new(assets.clone(), local_media);
    if !media.is_configured() {
        tracing::warn!("No media storage configured; file uploads will be refused");
    }

    // --- Initialize core service ---
    let usage = UsageEstimator::new(assets, kv, cfg.usage_limits.clone());
    let service = InspirationService::new(
        tiers,
        media,
        usage,
        ai,
        SubmissionRules {
            daily_limit: cfg.daily_upload_limit,
            email_domain: cfg.email_domain.clone(),
        },
    );

    // --- Build router ---
    let addr = cfg.addr();
    let (host, port) = (cfg.host.clone(), cfg.port);
    let app: Router = routes::routes::app(state::AppState::new(service, cfg, db));

    // --- Start server ---
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the SQLite pool, creating the database file and its directory.
async fn connect_sqlite(url: &str) -> Result<SqlitePool> {
    tracing::debug!("Connecting using raw URL => {}", url);

    let db_path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if !db_path.starts_with(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("parsing database URL `{}`", url))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", url))?;
    Ok(pool)
}
