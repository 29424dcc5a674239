// HashPool — share submission pool with token reward issuance
//
// Core: share validation pipeline, miner registry, reward coordination
// Surface: JSON HTTP API (miner, stats, admin) with CORS + rate limiting

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hashpool::api::{self, AppState};
use hashpool::config::Config;
use hashpool::ratelimit::RateLimiter;
use hashpool::registry::{now_ms, MinerRegistry};
use hashpool::rewards::{HttpLedgerClient, RewardCoordinator};
use hashpool::security::SecurityMonitor;
use hashpool::shares::ShareValidator;
use hashpool::snapshot;
use hashpool::stats::{PoolCounters, StatsAggregator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "hashpool=info".into()),
        )
        .with_target(false)
        .init();

    println!("🚀 {} v{} — Mining Pool Server", api::POOL_NAME, api::POOL_VERSION);
    let cfg = Arc::new(Config::load());

    // ── Core components ──

    let registry = Arc::new(MinerRegistry::new());
    let counters = Arc::new(PoolCounters::new());
    let monitor = Arc::new(SecurityMonitor::new(cfg.admin_token.clone()));
    let validator = Arc::new(ShareValidator::new(
        registry.clone(),
        cfg.min_submit_interval_ms,
        cfg.max_timestamp_skew_ms,
    ));
    let ledger = Arc::new(HttpLedgerClient::new(
        cfg.ledger_url.clone(),
        cfg.token_address.clone(),
    ));
    let rewards = Arc::new(RewardCoordinator::new(
        ledger,
        registry.clone(),
        counters.clone(),
        cfg.reward_per_share,
    ));
    let stats = Arc::new(StatsAggregator::new(
        registry.clone(),
        counters.clone(),
        cfg.pool_fee_percent,
        cfg.active_window_ms,
    ));

    let state = AppState {
        registry: registry.clone(),
        validator,
        rewards,
        monitor,
        stats,
        counters: counters.clone(),
        config: cfg.clone(),
        api_limiter: RateLimiter::new(
            cfg.api_rate_limit.window_ms,
            cfg.api_rate_limit.max_requests,
            "Too many requests, please try again later.",
        ),
        miner_limiter: RateLimiter::new(
            cfg.miner_rate_limit.window_ms,
            cfg.miner_rate_limit.max_requests,
            "Mining rate limit exceeded",
        ),
        started_at: now_ms(),
    };

    // Background activity log every 30s
    {
        let registry = registry.clone();
        let counters = counters.clone();
        let window_ms = cfg.active_window_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let active = registry.snapshot_active(window_ms).await.len();
                if active > 0 {
                    tracing::info!(
                        "📈 Active miners: {}, total shares: {}, distributed: {}",
                        active,
                        counters.total_shares(),
                        counters.total_distributed()
                    );
                }
            }
        });
    }

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.listen).await.unwrap();

    // Graceful shutdown (cross-platform: ctrl_c + SIGTERM on Unix)
    let shutdown_signal = async {
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM — shutting down"),
                _ = ctrl_c => tracing::info!("SIGINT — shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("Failed to register Ctrl+C handler");
            tracing::info!("Ctrl+C — shutting down");
        }
    };

    tracing::info!("📡 {} listening on {}", api::POOL_NAME, cfg.listen);
    tracing::info!(
        "💰 Pool fee: {}% | reward/share: {} | ledger: {}",
        cfg.pool_fee_percent,
        cfg.reward_per_share,
        cfg.ledger_url
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .unwrap();

    // Best-effort state dump for later inspection
    match snapshot::write_snapshot(
        Path::new(&cfg.snapshot_dir),
        &registry,
        &counters,
        cfg.pool_fee_percent,
    )
    .await
    {
        Ok(path) => tracing::info!("💾 Miner data saved to {}", path.display()),
        Err(e) => tracing::error!("Failed to write shutdown snapshot: {:#}", e),
    }

    tracing::info!("🏁 {} shut down cleanly", api::POOL_NAME);
}
