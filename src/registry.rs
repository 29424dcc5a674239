//! Miner registry - per-participant mining state
//!
//! Manages:
//! - Registration on connect (full overwrite, fresh timestamps)
//! - Submission throttle bookkeeping
//! - Share and earnings counters (monotonic)

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use chrono::Utc;

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A registered mining participant, keyed by wallet address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Miner {
    pub wallet_address: String,

    /// Worker label, free text ("unknown" when not supplied)
    pub worker_name: String,

    /// Opaque device metadata, stored but never interpreted
    pub gpu_info: serde_json::Value,

    /// Self-reported hashrate (H/s)
    pub hashrate: f64,

    /// Accepted share count
    pub shares: u64,

    /// Reward units credited so far
    pub total_earnings: u64,

    pub last_seen: i64,
    pub connected_at: i64,

    /// Last accepted-for-throttling submission time (millis)
    #[serde(default)]
    pub last_submission: Option<i64>,
}

impl Miner {
    fn new(
        wallet_address: String,
        worker_name: Option<String>,
        gpu_info: Option<serde_json::Value>,
        hashrate: Option<f64>,
    ) -> Self {
        let now = now_ms();
        Self {
            wallet_address,
            worker_name: worker_name.unwrap_or_else(|| "unknown".to_string()),
            gpu_info: gpu_info.unwrap_or_else(|| serde_json::json!({})),
            hashrate: hashrate.unwrap_or(0.0),
            shares: 0,
            total_earnings: 0,
            last_seen: now,
            connected_at: now,
            last_submission: None,
        }
    }

    /// Seen within the freshness window?
    pub fn is_active(&self, now: i64, window_ms: i64) -> bool {
        now - self.last_seen < window_ms
    }
}

/// Outcome of the throttle check-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionGate {
    /// Interval elapsed; submission timestamp recorded
    Clear,
    /// Last submission too recent
    Throttled,
    /// Wallet not present in the registry
    Unknown,
}

pub struct MinerRegistry {
    miners: Arc<RwLock<HashMap<String, Miner>>>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        Self {
            miners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or re-register) a miner. Re-connect overwrites the whole
    /// entry, including accumulated counters.
    pub async fn register(
        &self,
        wallet_address: &str,
        worker_name: Option<String>,
        gpu_info: Option<serde_json::Value>,
        hashrate: Option<f64>,
    ) -> Miner {
        let miner = Miner::new(wallet_address.to_string(), worker_name, gpu_info, hashrate);
        let mut miners = self.miners.write().await;
        miners.insert(wallet_address.to_string(), miner.clone());
        miner
    }

    pub async fn get(&self, wallet_address: &str) -> Option<Miner> {
        let miners = self.miners.read().await;
        miners.get(wallet_address).cloned()
    }

    pub async fn contains(&self, wallet_address: &str) -> bool {
        let miners = self.miners.read().await;
        miners.contains_key(wallet_address)
    }

    /// Miners seen within `window_ms` of now.
    pub async fn snapshot_active(&self, window_ms: i64) -> Vec<Miner> {
        let now = now_ms();
        let miners = self.miners.read().await;
        miners
            .values()
            .filter(|m| m.is_active(now, window_ms))
            .cloned()
            .collect()
    }

    /// Every registered miner, active or not (snapshot / admin use).
    pub async fn all(&self) -> Vec<Miner> {
        let miners = self.miners.read().await;
        miners.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        let miners = self.miners.read().await;
        miners.len()
    }

    /// Throttle gate: checks the last submission time and records the new
    /// one in the same critical section, so two concurrent submissions for
    /// the same wallet cannot both pass.
    pub async fn try_mark_submission(
        &self,
        wallet_address: &str,
        min_interval_ms: i64,
    ) -> SubmissionGate {
        let now = now_ms();
        let mut miners = self.miners.write().await;
        match miners.get_mut(wallet_address) {
            None => SubmissionGate::Unknown,
            Some(miner) => {
                if let Some(last) = miner.last_submission {
                    if now - last < min_interval_ms {
                        return SubmissionGate::Throttled;
                    }
                }
                miner.last_submission = Some(now);
                SubmissionGate::Clear
            }
        }
    }

    /// Count an accepted share and refresh last_seen. Returns the miner's
    /// new share total.
    pub async fn credit_share(&self, wallet_address: &str) -> Option<u64> {
        let mut miners = self.miners.write().await;
        let miner = miners.get_mut(wallet_address)?;
        miner.shares += 1;
        miner.last_seen = now_ms();
        Some(miner.shares)
    }

    /// Credit issued reward units. Returns the miner's new earnings total.
    pub async fn credit_earnings(&self, wallet_address: &str, amount: u64) -> Option<u64> {
        let mut miners = self.miners.write().await;
        let miner = miners.get_mut(wallet_address)?;
        miner.total_earnings += amount;
        Some(miner.total_earnings)
    }
}

impl Default for MinerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_get_returns_submitted_fields() {
        let registry = MinerRegistry::new();
        registry
            .register(
                "Addr1",
                Some("rig-a".to_string()),
                Some(serde_json::json!({"model": "RTX 4090"})),
                Some(500.0),
            )
            .await;

        let miner = registry.get("Addr1").await.expect("registered");
        assert_eq!(miner.worker_name, "rig-a");
        assert_eq!(miner.hashrate, 500.0);
        assert_eq!(miner.gpu_info["model"], "RTX 4090");
        assert_eq!(miner.shares, 0);
        assert_eq!(miner.total_earnings, 0);
    }

    #[tokio::test]
    async fn reconnect_overwrites_counters() {
        let registry = MinerRegistry::new();
        registry.register("Addr1", None, None, None).await;
        registry.credit_share("Addr1").await;
        registry.credit_earnings("Addr1", 3).await;

        registry
            .register("Addr1", Some("rig-b".to_string()), None, Some(250.0))
            .await;
        let miner = registry.get("Addr1").await.unwrap();
        assert_eq!(miner.worker_name, "rig-b");
        assert_eq!(miner.shares, 0);
        assert_eq!(miner.total_earnings, 0);
    }

    #[tokio::test]
    async fn defaults_applied_when_fields_missing() {
        let registry = MinerRegistry::new();
        let miner = registry.register("Addr1", None, None, None).await;
        assert_eq!(miner.worker_name, "unknown");
        assert_eq!(miner.hashrate, 0.0);
        assert_eq!(miner.gpu_info, serde_json::json!({}));
    }

    #[tokio::test]
    async fn throttle_gate_blocks_rapid_submissions() {
        let registry = MinerRegistry::new();
        registry.register("Addr1", None, None, None).await;

        assert_eq!(
            registry.try_mark_submission("Addr1", 1000).await,
            SubmissionGate::Clear
        );
        assert_eq!(
            registry.try_mark_submission("Addr1", 1000).await,
            SubmissionGate::Throttled
        );
        // Zero interval always passes
        assert_eq!(
            registry.try_mark_submission("Addr1", 0).await,
            SubmissionGate::Clear
        );
        assert_eq!(
            registry.try_mark_submission("Addr2", 1000).await,
            SubmissionGate::Unknown
        );
    }

    #[tokio::test]
    async fn snapshot_active_filters_stale_entries() {
        let registry = MinerRegistry::new();
        registry.register("Addr1", None, None, None).await;
        registry.register("Addr2", None, None, None).await;

        // Age Addr2 beyond the window by hand
        {
            let mut miners = registry.miners.write().await;
            miners.get_mut("Addr2").unwrap().last_seen = now_ms() - 600_000;
        }

        let active = registry.snapshot_active(300_000).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].wallet_address, "Addr1");
        assert_eq!(registry.all().await.len(), 2);
    }

    #[tokio::test]
    async fn counters_are_monotonic() {
        let registry = MinerRegistry::new();
        registry.register("Addr1", None, None, None).await;
        assert_eq!(registry.credit_share("Addr1").await, Some(1));
        assert_eq!(registry.credit_share("Addr1").await, Some(2));
        assert_eq!(registry.credit_earnings("Addr1", 1).await, Some(1));
        assert_eq!(registry.credit_earnings("Addr1", 2).await, Some(3));
        assert_eq!(registry.credit_share("Unknown").await, None);
    }
}
