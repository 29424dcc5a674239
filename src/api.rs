//! HTTP API - miner, stats and admin endpoints
//!
//! Handlers stay thin: validation lives in the share validator, state
//! transitions in the registry/coordinator, anomaly logging in the
//! security monitor. Responses are plain JSON bodies.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::ratelimit::{self, RateLimiter};
use crate::registry::{now_ms, MinerRegistry};
use crate::rewards::{AwardOutcome, RewardCoordinator};
use crate::security::{EventKind, SecurityMonitor};
use crate::shares::validator::is_valid_text_field;
use crate::shares::{ConnectRejection, ShareRejection, ShareSubmission, ShareValidator};
use crate::stats::{PoolCounters, StatsAggregator};

pub const POOL_NAME: &str = "HashPool";
pub const POOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Share target advertised to miners on connect. The actual acceptance
/// test is the zero-prefix check in the validator.
const ADVERTISED_TARGET: &str =
    "0x0000ffff00000000000000000000000000000000000000000000000000000000";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MinerRegistry>,
    pub validator: Arc<ShareValidator>,
    pub rewards: Arc<RewardCoordinator>,
    pub monitor: Arc<SecurityMonitor>,
    pub stats: Arc<StatsAggregator>,
    pub counters: Arc<PoolCounters>,
    pub config: Arc<Config>,
    pub api_limiter: RateLimiter,
    pub miner_limiter: RateLimiter,
    pub started_at: i64,
}

impl AppState {
    fn uptime_secs(&self) -> i64 {
        (now_ms() - self.started_at) / 1000
    }
}

/// Request origin metadata used for security-event attribution.
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        Ok(Self {
            ip: ratelimit::client_ip(&parts.headers, &parts.extensions),
            user_agent: ratelimit::user_agent(&parts.headers),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub gpu_info: Option<serde_json::Value>,
    #[serde(default)]
    pub hashrate: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SecurityModeRequest {
    #[serde(default)]
    pub mode: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let miner_routes = Router::new()
        .route("/connect", post(miner_connect))
        .route("/submit-share", post(submit_share))
        .route("/:wallet", get(miner_detail))
        .layer(middleware::from_fn_with_state(
            state.miner_limiter.clone(),
            ratelimit::enforce,
        ));

    Router::new()
        .route("/api", get(api_index))
        .nest("/api/miner", miner_routes)
        .route("/api/stats", get(pool_stats))
        .route("/api/admin/security", get(admin_security))
        .route("/api/admin/security-mode", post(admin_security_mode))
        .layer(middleware::from_fn_with_state(
            state.api_limiter.clone(),
            ratelimit::enforce,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn api_index(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("{} Mining Pool API", POOL_NAME),
        "version": POOL_VERSION,
        "token": state.config.token_address,
        "endpoints": {
            "stats": "/api/stats",
            "connect": "POST /api/miner/connect",
            "submit": "POST /api/miner/submit-share",
        },
    }))
}

async fn miner_connect(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(payload): Json<ConnectRequest>,
) -> Response {
    if let Err(rejection) = state.validator.validate_connect(
        payload.wallet_address.as_ref(),
        payload.worker_name.as_ref(),
        payload.hashrate,
    ) {
        let detail = match &rejection {
            ConnectRejection::InvalidWallet => format!(
                "Invalid wallet address format: {:?}",
                payload.wallet_address.as_deref().unwrap_or("")
            ),
            ConnectRejection::InvalidWorkerName => "Invalid worker name format".to_string(),
            ConnectRejection::InvalidHashrate => {
                format!("Suspicious hashrate: {:?}", payload.hashrate)
            }
        };
        state
            .monitor
            .record(rejection.event_kind(), &meta.ip, &meta.user_agent, detail)
            .await;
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": rejection.to_string() })),
        )
            .into_response();
    }

    let wallet = payload.wallet_address.unwrap_or_default();
    let miner = state
        .registry
        .register(&wallet, payload.worker_name, payload.gpu_info, payload.hashrate)
        .await;
    tracing::info!("🔗 Miner connected: {} ({})", wallet, miner.worker_name);

    Json(json!({
        "success": true,
        "message": "Miner connected successfully",
        "poolInfo": {
            "fee": state.config.pool_fee_percent,
            "algorithm": "sha256",
            "difficulty": ADVERTISED_TARGET,
            "token": state.config.token_address,
            "rewardPerShare": state.config.reward_per_share,
        },
    }))
    .into_response()
}

async fn submit_share(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(payload): Json<ShareSubmission>,
) -> Response {
    if let Err(rejection) = state.validator.validate(&payload).await {
        return reject_share(&state, &meta, &payload, rejection).await;
    }

    let wallet = payload.wallet_address.clone().unwrap_or_default();

    // Count the share before awaiting issuance: acceptance must not depend
    // on the ledger outcome.
    state.counters.record_share();
    let miner_shares = state.registry.credit_share(&wallet).await.unwrap_or(0);

    match state.rewards.award(&wallet).await {
        AwardOutcome::Issued {
            signature,
            amount,
            total_earnings,
        } => {
            tracing::info!("✅ Share accepted from {}, awarded {} unit(s)", wallet, amount);
            Json(json!({
                "success": true,
                "message": "Share accepted",
                "reward": amount,
                "totalShares": miner_shares,
                "totalEarnings": total_earnings,
                "hash": payload.hash,
                "signature": signature,
            }))
            .into_response()
        }
        AwardOutcome::Pending => {
            let total_earnings = state
                .registry
                .get(&wallet)
                .await
                .map(|m| m.total_earnings)
                .unwrap_or(0);
            Json(json!({
                "success": true,
                "message": "Share accepted (reward pending)",
                "reward": 0,
                "totalShares": miner_shares,
                "totalEarnings": total_earnings,
                "error": "Reward distribution failed",
            }))
            .into_response()
        }
    }
}

async fn reject_share(
    state: &AppState,
    meta: &ClientMeta,
    payload: &ShareSubmission,
    rejection: ShareRejection,
) -> Response {
    let wallet = payload.wallet_address.as_deref().unwrap_or("");
    if let Some(kind) = rejection.event_kind() {
        let detail = match kind {
            EventKind::InvalidWallet => "Invalid wallet in share submission".to_string(),
            EventKind::InvalidShareHash => {
                format!("Invalid hash format: {:?}", payload.hash.as_deref().unwrap_or(""))
            }
            EventKind::InvalidNonce => format!("Invalid nonce: {:?}", payload.nonce),
            EventKind::StaleTimestamp => format!("Invalid timestamp: {:?}", payload.timestamp),
            EventKind::UnregisteredMiner => wallet.to_string(),
            EventKind::ShareSpam => format!("Too frequent submissions from {}", wallet),
            _ => rejection.to_string(),
        };
        state
            .monitor
            .record(kind, &meta.ip, &meta.user_agent, detail)
            .await;
    }

    let status = if rejection.is_throttle() {
        StatusCode::TOO_MANY_REQUESTS
    } else {
        StatusCode::BAD_REQUEST
    };
    let mut body = json!({ "error": rejection.to_string() });
    if rejection == ShareRejection::LowDifficulty {
        body["hash"] = json!(payload.hash);
    }
    (status, Json(body)).into_response()
}

async fn pool_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.stats.compute().await;
    Json(json!({
        "totalHashrate": view.total_hashrate,
        "totalMiners": view.total_miners,
        "totalShares": view.total_shares,
        "totalDistributed": view.total_distributed,
        "poolFee": view.pool_fee,
        "activeMiners": view.active_miners,
        "allTimeMiners": view.all_time_miners,
        "tokenAddress": state.config.token_address,
        "uptime": state.uptime_secs(),
        "miners": view.miners,
    }))
}

async fn miner_detail(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if !is_valid_text_field(&wallet, crate::shares::wallet::MAX_WALLET_LEN) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid wallet address format" })),
        )
            .into_response();
    }

    let miner = match state.registry.get(&wallet).await {
        Some(m) => m,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Miner not found" })),
            )
                .into_response()
        }
    };

    let total_shares = state.counters.total_shares();
    let share_percentage = if total_shares > 0 {
        ((miner.shares as f64 / total_shares as f64) * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    };
    let active = state
        .registry
        .snapshot_active(state.config.active_window_ms)
        .await;

    let mut body = serde_json::to_value(&miner).unwrap_or_else(|_| json!({}));
    body["poolStats"] = json!({
        "totalShares": total_shares,
        "totalMiners": active.len(),
        "yourSharePercentage": share_percentage,
    });
    Json(body).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Admin gate: Ok on a matching bearer token, otherwise a ready 401
/// response with the attempt logged.
async fn require_admin(
    state: &AppState,
    meta: &ClientMeta,
    headers: &HeaderMap,
) -> Result<(), Response> {
    if state.monitor.authorize(bearer_token(headers)).await {
        return Ok(());
    }
    state
        .monitor
        .record(
            EventKind::UnauthorizedAccess,
            &meta.ip,
            &meta.user_agent,
            "Attempted admin access without valid token".to_string(),
        )
        .await;
    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response())
}

async fn admin_security(
    State(state): State<AppState>,
    meta: ClientMeta,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = require_admin(&state, &meta, &headers).await {
        return denied;
    }

    let recent = state.monitor.query_recent(50).await;
    let total_events = state.monitor.total_events().await;
    let (mode_enabled, mode_started) = state.monitor.mode().await;
    let active = state
        .registry
        .snapshot_active(state.config.active_window_ms)
        .await;
    let total_hashrate: f64 = active.iter().map(|m| m.hashrate).sum();
    let all_miners = state.registry.len().await;

    Json(json!({
        "securityLogs": {
            "recentEvents": recent,
            "totalEvents": total_events,
            "rateLimitHits": state.api_limiter.hit_count() + state.miner_limiter.hit_count(),
            "securityModeEnabled": mode_enabled,
            "securityModeStarted": mode_started,
        },
        "systemHealth": {
            "uptime": state.uptime_secs(),
            "activeConnections": all_miners,
            "totalShares": state.counters.total_shares(),
        },
        "networkStats": {
            "totalMiners": all_miners,
            "activeMiners": active.len(),
            "totalHashrate": total_hashrate,
        },
    }))
    .into_response()
}

async fn admin_security_mode(
    State(state): State<AppState>,
    meta: ClientMeta,
    headers: HeaderMap,
    Json(payload): Json<SecurityModeRequest>,
) -> Response {
    if let Err(denied) = require_admin(&state, &meta, &headers).await {
        return denied;
    }

    let enabled = match payload.mode.as_deref() {
        Some("enable") => true,
        Some("disable") => false,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid mode. Use \"enable\" or \"disable\"" })),
            )
                .into_response()
        }
    };
    state.monitor.set_mode(enabled).await;

    Json(json!({
        "success": true,
        "mode": if enabled { "enable" } else { "disable" },
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}
