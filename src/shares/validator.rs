//! Share validator - ordered structural checks
//!
//! Validates submitted shares through a short-circuiting pipeline. Every
//! failure maps to one typed rejection carrying its security-event kind,
//! so the handler layer can log and respond without re-deriving anything.
//!
//! The difficulty check is the observed placeholder behavior: a fixed
//! zero-prefix test on the hex hash, not a numeric target comparison.

use std::sync::Arc;
use serde::Deserialize;
use thiserror::Error;

use crate::registry::{MinerRegistry, SubmissionGate};
use crate::security::EventKind;
use super::wallet;

/// Hashes must start with this prefix to count as meeting difficulty.
pub const DIFFICULTY_PREFIX: &str = "0000";

/// Largest hashrate a miner may self-report (1 GH/s).
pub const MAX_REPORTED_HASHRATE: f64 = 1_000_000_000.0;

const MAX_WORKER_NAME_LEN: usize = 30;
const MAX_NONCE: i64 = i32::MAX as i64;

/// A share submission as received on the wire. Every field is optional at
/// the schema level; the validator decides what absence means.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSubmission {
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub nonce: Option<i64>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Why a share was turned away. Ordering of checks is part of the
/// contract: the first failing check wins.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareRejection {
    #[error("Valid wallet address required")]
    InvalidWallet,
    #[error("Invalid hash format")]
    InvalidHash,
    #[error("Invalid nonce value")]
    InvalidNonce,
    #[error("Invalid or stale timestamp")]
    StaleTimestamp,
    #[error("Miner not registered. Connect first.")]
    NotRegistered,
    #[error("Share submission rate limit exceeded")]
    RateLimited,
    #[error("Invalid share - hash does not meet difficulty requirement")]
    LowDifficulty,
}

impl ShareRejection {
    /// Security-event kind for this rejection. Difficulty misses are a
    /// normal mining outcome and are not logged as anomalies.
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            ShareRejection::InvalidWallet => Some(EventKind::InvalidWallet),
            ShareRejection::InvalidHash => Some(EventKind::InvalidShareHash),
            ShareRejection::InvalidNonce => Some(EventKind::InvalidNonce),
            ShareRejection::StaleTimestamp => Some(EventKind::StaleTimestamp),
            ShareRejection::NotRegistered => Some(EventKind::UnregisteredMiner),
            ShareRejection::RateLimited => Some(EventKind::ShareSpam),
            ShareRejection::LowDifficulty => None,
        }
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, ShareRejection::RateLimited)
    }
}

/// Why a connect payload was turned away.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectRejection {
    #[error("Valid wallet address required")]
    InvalidWallet,
    #[error("Invalid worker name format")]
    InvalidWorkerName,
    #[error("Invalid hashrate value")]
    InvalidHashrate,
}

impl ConnectRejection {
    pub fn event_kind(&self) -> EventKind {
        match self {
            ConnectRejection::InvalidWallet => EventKind::InvalidWallet,
            ConnectRejection::InvalidWorkerName => EventKind::InvalidWorkerName,
            ConnectRejection::InvalidHashrate => EventKind::InvalidHashrate,
        }
    }
}

/// Free-text field check: word chars, whitespace, '-', '.', '@'.
pub(crate) fn is_valid_text_field(value: &str, max_len: usize) -> bool {
    !value.is_empty()
        && value.len() <= max_len
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c.is_whitespace() || matches!(c, '-' | '.' | '@'))
}

fn is_valid_wallet_field(value: Option<&String>) -> bool {
    match value {
        Some(w) => {
            is_valid_text_field(w, wallet::MAX_WALLET_LEN) && wallet::is_valid_wallet(w)
        }
        None => false,
    }
}

pub struct ShareValidator {
    registry: Arc<MinerRegistry>,
    min_submit_interval_ms: i64,
    max_timestamp_skew_ms: i64,
}

impl ShareValidator {
    pub fn new(
        registry: Arc<MinerRegistry>,
        min_submit_interval_ms: i64,
        max_timestamp_skew_ms: i64,
    ) -> Self {
        Self {
            registry,
            min_submit_interval_ms,
            max_timestamp_skew_ms,
        }
    }

    /// Validate a connect payload (registration precondition checks).
    pub fn validate_connect(
        &self,
        wallet_address: Option<&String>,
        worker_name: Option<&String>,
        hashrate: Option<f64>,
    ) -> Result<(), ConnectRejection> {
        if !is_valid_wallet_field(wallet_address) {
            return Err(ConnectRejection::InvalidWallet);
        }
        if let Some(worker) = worker_name {
            if !is_valid_text_field(worker, MAX_WORKER_NAME_LEN) {
                return Err(ConnectRejection::InvalidWorkerName);
            }
        }
        if let Some(rate) = hashrate {
            if !rate.is_finite() || rate < 0.0 || rate > MAX_REPORTED_HASHRATE {
                return Err(ConnectRejection::InvalidHashrate);
            }
        }
        Ok(())
    }

    /// Validate a share submission. Checks run in a fixed order and stop
    /// at the first failure. On the throttle check passing, the miner's
    /// submission timestamp is recorded, even if the difficulty test
    /// afterwards fails.
    pub async fn validate(&self, share: &ShareSubmission) -> Result<(), ShareRejection> {
        // 1. Wallet format
        if !is_valid_wallet_field(share.wallet_address.as_ref()) {
            return Err(ShareRejection::InvalidWallet);
        }
        let wallet_address = share.wallet_address.as_deref().unwrap_or_default();

        // 2. Hash shape: exactly 64 hex chars
        let hash = match share.hash.as_deref() {
            Some(h) if h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()) => h,
            _ => return Err(ShareRejection::InvalidHash),
        };

        // 3. Nonce in [0, 2^31 - 1]
        match share.nonce {
            Some(n) if (0..=MAX_NONCE).contains(&n) => {}
            _ => return Err(ShareRejection::InvalidNonce),
        }

        // 4. Timestamp within the skew window, both directions
        match share.timestamp {
            Some(ts) if (crate::registry::now_ms() - ts).abs() <= self.max_timestamp_skew_ms => {}
            _ => return Err(ShareRejection::StaleTimestamp),
        }

        // 5. Must be registered before submitting
        if !self.registry.contains(wallet_address).await {
            return Err(ShareRejection::NotRegistered);
        }

        // 6. Anti-spam throttle (check-then-set in one registry step)
        match self
            .registry
            .try_mark_submission(wallet_address, self.min_submit_interval_ms)
            .await
        {
            SubmissionGate::Clear => {}
            SubmissionGate::Throttled => return Err(ShareRejection::RateLimited),
            SubmissionGate::Unknown => return Err(ShareRejection::NotRegistered),
        }

        // 7. Placeholder difficulty test
        if !hash.starts_with(DIFFICULTY_PREFIX) {
            return Err(ShareRejection::LowDifficulty);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::now_ms;

    fn submission(wallet: &str, hash: &str, nonce: i64, timestamp: i64) -> ShareSubmission {
        ShareSubmission {
            wallet_address: Some(wallet.to_string()),
            nonce: Some(nonce),
            hash: Some(hash.to_string()),
            timestamp: Some(timestamp),
        }
    }

    fn good_hash() -> String {
        format!("0000{}", "a".repeat(60))
    }

    async fn validator_with_miner(wallet: &str) -> ShareValidator {
        let registry = Arc::new(MinerRegistry::new());
        registry.register(wallet, None, None, None).await;
        ShareValidator::new(registry, 1000, 300_000)
    }

    #[tokio::test]
    async fn accepts_well_formed_share() {
        let validator = validator_with_miner("Addr1").await;
        let share = submission("Addr1", &good_hash(), 42, now_ms());
        assert_eq!(validator.validate(&share).await, Ok(()));
    }

    #[tokio::test]
    async fn rejects_missing_or_malformed_wallet() {
        let validator = validator_with_miner("Addr1").await;
        let mut share = submission("bad wallet!", &good_hash(), 42, now_ms());
        assert_eq!(
            validator.validate(&share).await,
            Err(ShareRejection::InvalidWallet)
        );
        share.wallet_address = None;
        assert_eq!(
            validator.validate(&share).await,
            Err(ShareRejection::InvalidWallet)
        );
    }

    #[tokio::test]
    async fn rejects_bad_hash_shapes() {
        let validator = validator_with_miner("Addr1").await;
        let non_hex = "g".repeat(64);
        let short = "0".repeat(63);
        for bad in ["", "0000abc", non_hex.as_str(), short.as_str()] {
            let share = submission("Addr1", bad, 42, now_ms());
            assert_eq!(
                validator.validate(&share).await,
                Err(ShareRejection::InvalidHash),
                "hash {:?} should be rejected",
                bad
            );
        }
        // Mixed case is fine as long as the prefix holds
        let share = submission("Addr1", &format!("0000{}", "AB".repeat(30)), 42, now_ms());
        assert_eq!(validator.validate(&share).await, Ok(()));
    }

    #[tokio::test]
    async fn rejects_out_of_range_nonce() {
        let validator = validator_with_miner("Addr1").await;
        for bad in [-1, (i32::MAX as i64) + 1] {
            let share = submission("Addr1", &good_hash(), bad, now_ms());
            assert_eq!(
                validator.validate(&share).await,
                Err(ShareRejection::InvalidNonce)
            );
        }
        // Nonce zero is in range
        let share = submission("Addr1", &good_hash(), 0, now_ms());
        assert_eq!(validator.validate(&share).await, Ok(()));
    }

    #[tokio::test]
    async fn rejects_stale_and_future_timestamps() {
        let validator = validator_with_miner("Addr1").await;
        let stale = submission("Addr1", &good_hash(), 42, now_ms() - 301_000);
        assert_eq!(
            validator.validate(&stale).await,
            Err(ShareRejection::StaleTimestamp)
        );
        let future = submission("Addr1", &good_hash(), 42, now_ms() + 301_000);
        assert_eq!(
            validator.validate(&future).await,
            Err(ShareRejection::StaleTimestamp)
        );
    }

    #[tokio::test]
    async fn rejects_unregistered_before_throttle() {
        let registry = Arc::new(MinerRegistry::new());
        let validator = ShareValidator::new(registry, 1000, 300_000);
        let share = submission("Addr1", &good_hash(), 42, now_ms());
        assert_eq!(
            validator.validate(&share).await,
            Err(ShareRejection::NotRegistered)
        );
    }

    #[tokio::test]
    async fn throttles_rapid_submissions() {
        let validator = validator_with_miner("Addr1").await;
        let share = submission("Addr1", &good_hash(), 42, now_ms());
        assert_eq!(validator.validate(&share).await, Ok(()));
        assert_eq!(
            validator.validate(&share).await,
            Err(ShareRejection::RateLimited)
        );
    }

    #[tokio::test]
    async fn throttle_marks_even_when_difficulty_fails() {
        let validator = validator_with_miner("Addr1").await;
        let weak = submission("Addr1", &format!("1111{}", "a".repeat(60)), 42, now_ms());
        assert_eq!(
            validator.validate(&weak).await,
            Err(ShareRejection::LowDifficulty)
        );
        // The failed difficulty attempt still consumed the throttle slot
        let strong = submission("Addr1", &good_hash(), 42, now_ms());
        assert_eq!(
            validator.validate(&strong).await,
            Err(ShareRejection::RateLimited)
        );
    }

    #[tokio::test]
    async fn format_checks_run_before_registry_lookup() {
        let registry = Arc::new(MinerRegistry::new());
        let validator = ShareValidator::new(registry, 1000, 300_000);
        // Unregistered AND bad hash: hash check wins (earlier in order)
        let share = submission("Addr1", "nothex", 42, now_ms());
        assert_eq!(
            validator.validate(&share).await,
            Err(ShareRejection::InvalidHash)
        );
    }

    #[test]
    fn connect_validation() {
        let registry = Arc::new(MinerRegistry::new());
        let validator = ShareValidator::new(registry, 1000, 300_000);

        assert_eq!(
            validator.validate_connect(Some(&"Addr1".to_string()), None, None),
            Ok(())
        );
        assert_eq!(
            validator.validate_connect(None, None, None),
            Err(ConnectRejection::InvalidWallet)
        );
        assert_eq!(
            validator.validate_connect(
                Some(&"Addr1".to_string()),
                Some(&"rig/one".to_string()),
                None
            ),
            Err(ConnectRejection::InvalidWorkerName)
        );
        assert_eq!(
            validator.validate_connect(
                Some(&"Addr1".to_string()),
                Some(&"rig-a.local".to_string()),
                Some(500.0)
            ),
            Ok(())
        );
        for bad in [-1.0, MAX_REPORTED_HASHRATE + 1.0, f64::NAN] {
            assert_eq!(
                validator.validate_connect(Some(&"Addr1".to_string()), None, Some(bad)),
                Err(ConnectRejection::InvalidHashrate)
            );
        }
    }
}
