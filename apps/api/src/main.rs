//! Evalia campaign engine HTTP API.

#![forbid(unsafe_code)]

mod api_router;
mod auth;
mod dto;
mod error;
mod handlers;
mod state;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use evalia_application::{
    EligibilityService, EmissionConfig, EmissionService, LifecycleService,
};
use evalia_core::{AppError, AppResult};
use evalia_infrastructure::{
    HtmlReportRenderer, InMemoryAuditRepository, InMemoryCampaignRepository,
    PostgresAuditRepository, PostgresCampaignRepository, SystemClock,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Clone)]
struct ApiConfig {
    host: String,
    port: u16,
    frontend_url: String,
    storage_mode: StorageMode,
    emission_lease_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StorageMode {
    Postgres { database_url: String },
    Memory,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).is_some_and(|arg| arg == "migrate");
    let config = ApiConfig::load()?;

    if migrate_only {
        let StorageMode::Postgres { database_url } = &config.storage_mode else {
            return Err(AppError::Validation(
                "migrate mode requires DATABASE_URL".to_owned(),
            ));
        };
        let pool = connect_pool(database_url).await?;
        run_migrations(&pool).await?;
        info!("migrations applied, exiting");
        return Ok(());
    }

    let app_state = build_state(&config).await?;
    let router = api_router::build_router(app_state, config.frontend_url.as_str())?;

    let address: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|error| {
            AppError::Validation(format!(
                "invalid API_HOST/API_PORT combination '{}:{}': {error}",
                config.host, config.port
            ))
        })?;

    info!(%address, "evalia-api listening");

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind {address}: {error}")))?;

    axum::serve(listener, router)
        .await
        .map_err(|error| AppError::Internal(format!("server error: {error}")))
}

async fn build_state(config: &ApiConfig) -> AppResult<AppState> {
    let emission_config = EmissionConfig {
        lease_seconds: config.emission_lease_seconds,
        ..EmissionConfig::default()
    };

    match &config.storage_mode {
        StorageMode::Postgres { database_url } => {
            let pool = connect_pool(database_url).await?;
            run_migrations(&pool).await?;

            let repository = Arc::new(PostgresCampaignRepository::new(pool.clone()));
            let audit_repository = Arc::new(PostgresAuditRepository::new(pool));
            Ok(wire_services(repository, audit_repository, emission_config))
        }
        StorageMode::Memory => {
            warn!("STORAGE_MODE=memory: state is volatile and lost on restart");
            let repository = Arc::new(InMemoryCampaignRepository::new());
            let audit_repository = Arc::new(InMemoryAuditRepository::new());
            Ok(wire_services(repository, audit_repository, emission_config))
        }
    }
}

fn wire_services(
    repository: Arc<dyn evalia_application::CampaignRepository>,
    audit_repository: Arc<dyn evalia_application::AuditRepository>,
    emission_config: EmissionConfig,
) -> AppState {
    let clock = Arc::new(SystemClock);
    let renderer = Arc::new(HtmlReportRenderer::new());

    let lifecycle_service =
        LifecycleService::new(repository.clone(), audit_repository.clone(), clock.clone());
    let eligibility_service = EligibilityService::new(repository.clone(), clock.clone());
    let emission_service = EmissionService::new(
        repository,
        audit_repository,
        renderer,
        clock,
        emission_config,
    );

    AppState {
        lifecycle_service,
        eligibility_service,
        emission_service,
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

impl ApiConfig {
    fn load() -> AppResult<Self> {
        let host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let port = parse_env_u16("API_PORT", 3001)?;
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_owned());
        let emission_lease_seconds = parse_env_u32("EMISSION_LEASE_SECONDS", 120)?;

        if emission_lease_seconds == 0 {
            return Err(AppError::Validation(
                "EMISSION_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let storage_mode = match env::var("STORAGE_MODE").as_deref() {
            Ok("memory") => StorageMode::Memory,
            Ok("postgres") | Err(_) => StorageMode::Postgres {
                database_url: required_env("DATABASE_URL")?,
            },
            Ok(other) => {
                return Err(AppError::Validation(format!(
                    "invalid STORAGE_MODE value '{other}'; expected 'postgres' or 'memory'"
                )));
            }
        };

        Ok(Self {
            host,
            port,
            frontend_url,
            storage_mode,
            emission_lease_seconds,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u16(name: &str, default: u16) -> AppResult<u16> {
    match env::var(name) {
        Ok(value) => value.parse::<u16>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
