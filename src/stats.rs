//! Pool statistics - stored counters and derived views
//!
//! Only total_shares and total_distributed are stored; hashrate and miner
//! counts are always derived from the registry at read time so the two can
//! never drift apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use serde::Serialize;

use crate::registry::MinerRegistry;

/// Process-wide monotonic counters.
#[derive(Debug, Default)]
pub struct PoolCounters {
    total_shares: AtomicU64,
    total_distributed: AtomicU64,
}

impl PoolCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one accepted share; returns the new total.
    pub fn record_share(&self) -> u64 {
        self.total_shares.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count issued reward units; returns the new total.
    pub fn add_distributed(&self, amount: u64) -> u64 {
        self.total_distributed.fetch_add(amount, Ordering::Relaxed) + amount
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares.load(Ordering::Relaxed)
    }

    pub fn total_distributed(&self) -> u64 {
        self.total_distributed.load(Ordering::Relaxed)
    }
}

/// One row of the public miner list: wallet truncated for privacy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerSummary {
    pub wallet: String,
    pub hashrate: f64,
    pub shares: u64,
    pub earnings: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatsView {
    pub total_hashrate: f64,
    pub total_miners: usize,
    pub total_shares: u64,
    pub total_distributed: u64,
    pub pool_fee: f64,
    pub active_miners: usize,
    pub all_time_miners: usize,
    pub miners: Vec<MinerSummary>,
}

pub struct StatsAggregator {
    registry: Arc<MinerRegistry>,
    counters: Arc<PoolCounters>,
    pool_fee_percent: f64,
    active_window_ms: i64,
}

impl StatsAggregator {
    pub fn new(
        registry: Arc<MinerRegistry>,
        counters: Arc<PoolCounters>,
        pool_fee_percent: f64,
        active_window_ms: i64,
    ) -> Self {
        Self {
            registry,
            counters,
            pool_fee_percent,
            active_window_ms,
        }
    }

    /// Read-only aggregate over the registry and counters.
    pub async fn compute(&self) -> PoolStatsView {
        let active = self.registry.snapshot_active(self.active_window_ms).await;
        let all_time = self.registry.len().await;
        let total_hashrate: f64 = active.iter().map(|m| m.hashrate).sum();

        let miners = active
            .iter()
            .map(|m| MinerSummary {
                wallet: truncate_wallet(&m.wallet_address),
                hashrate: m.hashrate,
                shares: m.shares,
                earnings: m.total_earnings,
            })
            .collect();

        PoolStatsView {
            total_hashrate,
            total_miners: active.len(),
            total_shares: self.counters.total_shares(),
            total_distributed: self.counters.total_distributed(),
            pool_fee: self.pool_fee_percent,
            active_miners: active.len(),
            all_time_miners: all_time,
            miners,
        }
    }
}

/// First 8 chars of the wallet plus an ellipsis.
fn truncate_wallet(wallet: &str) -> String {
    let prefix: String = wallet.chars().take(8).collect();
    format!("{}...", prefix)
}
