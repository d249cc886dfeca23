use site_assessment_service::{AppState, Config, OpenAiClient, RateLimiter, build_router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize tracing; JSON output unless LOG_FORMAT=pretty
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "site_assessment_service=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable output for local runs
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            // One JSON object per event for log shippers
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

fn spawn_rate_limit_pruner(limiter: RateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let removed = limiter.prune(Instant::now());
            if removed > 0 {
                debug!(
                    removed,
                    remaining = limiter.tracked_clients(),
                    "Pruned expired rate limit windows"
                );
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // A missing API key or a bad limit is fatal at startup
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // The AI client is built once here and injected into the handlers
    let completion = Arc::new(OpenAiClient::new(config.openai.clone())?);
    let state = AppState::new(completion, config.upload);

    let rate_limiter = if config.rate_limit.enabled {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        spawn_rate_limit_pruner(limiter.clone());
        Some(limiter)
    } else {
        info!("Rate limiting disabled");
        None
    };

    let app = build_router(state, &config.allowed_origins, rate_limiter);

    let listener = TcpListener::bind(config.bind_address()).await?;
    let addr = listener.local_addr()?;

    info!("Site Security Assessment Service starting on {}", addr);
    info!(
        model = %config.openai.model,
        max_file_size_bytes = config.upload.max_file_size_bytes,
        max_files = config.upload.max_files,
        "Upstream and upload limits configured"
    );
    info!("Health check endpoint: http://{}/health", addr);
    info!("Assessment endpoint: POST http://{}/api/assess", addr);

    // Connect info lets the rate limiter key on the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
