//! Evalia emission worker runtime.
//!
//! Polls for completed batches whose report has not been issued yet and
//! drives emission with bounded retries. Losing a claim race to the API or
//! a sibling worker is expected and merely skips the batch.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use evalia_application::{EmissionConfig, EmissionRetryPolicy, EmissionService};
use evalia_core::{AppError, AppResult, Principal};
use evalia_domain::Batch;
use evalia_infrastructure::{
    HtmlReportRenderer, PostgresAuditRepository, PostgresCampaignRepository, SystemClock,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    poll_interval_ms: u64,
    batch_limit: usize,
    retry_max_attempts: u32,
    retry_base_delay_ms: u64,
    retry_max_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let emission_service = build_emission_service(pool);
    let retry_policy = EmissionRetryPolicy::new(
        config.retry_max_attempts,
        Duration::from_millis(config.retry_base_delay_ms),
        Duration::from_millis(config.retry_max_delay_ms),
    );

    info!(
        batch_limit = config.batch_limit,
        poll_interval_ms = config.poll_interval_ms,
        retry_max_attempts = config.retry_max_attempts,
        "evalia-worker started"
    );

    loop {
        match emission_service
            .list_emittable_batches(config.batch_limit)
            .await
        {
            Ok(batches) => {
                for batch in batches {
                    emit_with_retries(&emission_service, &retry_policy, &batch).await;
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to list emittable batches");
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

async fn emit_with_retries(
    emission_service: &EmissionService,
    retry_policy: &EmissionRetryPolicy,
    batch: &Batch,
) {
    let mut attempt = 1;
    while let Some(delay) = retry_policy.delay_before(attempt) {
        tokio::time::sleep(delay).await;

        match emission_service
            .request_emission(&Principal::System, batch.scope(), batch.id())
            .await
        {
            Ok(report) => {
                info!(
                    scope = %batch.scope(),
                    batch_id = %batch.id(),
                    content_hash = report.content_hash(),
                    attempt,
                    "report emitted"
                );
                return;
            }
            Err(error) if error.is_retryable() => {
                warn!(
                    scope = %batch.scope(),
                    batch_id = %batch.id(),
                    attempt,
                    error = %error,
                    "emission attempt failed, will retry"
                );
                attempt += 1;
            }
            Err(error) => {
                // Claim races and rejected gates are not retryable here;
                // the batch stays visible for the next poll if still open.
                warn!(
                    scope = %batch.scope(),
                    batch_id = %batch.id(),
                    error = %error,
                    "emission skipped"
                );
                return;
            }
        }
    }

    warn!(
        scope = %batch.scope(),
        batch_id = %batch.id(),
        max_attempts = retry_policy.max_attempts(),
        "emission retries exhausted; batch left for manual retry"
    );
}

fn build_emission_service(pool: PgPool) -> EmissionService {
    let repository = Arc::new(PostgresCampaignRepository::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool));

    EmissionService::new(
        repository,
        audit_repository,
        Arc::new(HtmlReportRenderer::new()),
        Arc::new(SystemClock),
        EmissionConfig::default(),
    )
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
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

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
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

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 5000)?;
        let batch_limit = parse_env_usize("WORKER_BATCH_LIMIT", 10)?;
        let retry_max_attempts = parse_env_u32("WORKER_RETRY_MAX_ATTEMPTS", 5)?;
        let retry_base_delay_ms = parse_env_u64("WORKER_RETRY_BASE_DELAY_MS", 1000)?;
        let retry_max_delay_ms = parse_env_u64("WORKER_RETRY_MAX_DELAY_MS", 60_000)?;

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        if batch_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_BATCH_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if retry_max_attempts == 0 {
            return Err(AppError::Validation(
                "WORKER_RETRY_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            poll_interval_ms,
            batch_limit,
            retry_max_attempts,
            retry_base_delay_ms,
            retry_max_delay_ms,
        })
    }
}
