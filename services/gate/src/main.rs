use anyhow::{Context, Result};
use common::{
    cache::{RedisConfig, RedisPool},
    clock::{Clock, SystemClock},
    database::{self, DatabaseConfig},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gate::{
    AppState, Backends,
    config::{GateConfig, RateLimitBackend, StorageBackend},
    mailer::{LogMailer, Mailer, ResendMailer},
    rate_limiter::{CounterStore, InMemoryCounterStore, RedisCounterStore, spawn_sweeper},
    repositories::{
        self, InMemoryLedger, InMemoryUserStore, SubmissionLedger, SubmissionRepository,
        UserRepository, UserStore,
    },
    rewriter::OpenAiRewriter,
    routes,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting gate service");

    let config = GateConfig::from_env().context("invalid gate configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (users, ledger): (Arc<dyn UserStore>, Arc<dyn SubmissionLedger>) =
        match config.storage_backend {
            StorageBackend::Postgres => {
                let db_config = DatabaseConfig::from_env()?;
                let pool = database::init_pool(&db_config).await?;

                if database::health_check(&pool).await? {
                    info!("Database connection successful");
                } else {
                    anyhow::bail!("Failed to connect to database");
                }

                repositories::run_migrations(&pool).await?;
                (
                    Arc::new(UserRepository::new(pool.clone())),
                    Arc::new(SubmissionRepository::new(pool)),
                )
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage; users and submissions are lost on restart");
                (
                    Arc::new(InMemoryUserStore::new(clock.clone())),
                    Arc::new(InMemoryLedger::new()),
                )
            }
        };

    let counters: Arc<dyn CounterStore> = match config.rate_limit_backend {
        RateLimitBackend::Memory => Arc::new(InMemoryCounterStore::new()),
        RateLimitBackend::Redis => {
            let redis_config = RedisConfig::from_env()?;
            let redis_pool = RedisPool::new(&redis_config).await?;
            Arc::new(RedisCounterStore::new(redis_pool))
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.resend_api_key {
        Some(key) => Arc::new(ResendMailer::new(key.clone(), config.email_from.clone())?),
        None => {
            warn!("RESEND_API_KEY not set; magic links will be logged instead of emailed");
            Arc::new(LogMailer)
        }
    };

    let rewriter = Arc::new(OpenAiRewriter::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    )?);

    if config.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY not set; admin listings are disabled");
    }

    let bind_addr = config.bind_addr.clone();
    let sweep_interval = config.sweep_interval;
    let state = AppState::new(
        config,
        Backends {
            clock,
            users,
            ledger,
            counters,
            mailer,
            rewriter,
        },
    )?;

    let _sweeper = spawn_sweeper(state.rate_limiter.clone(), sweep_interval);

    let app = routes::create_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Gate service listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
