//! Reward coordination - external token issuance
//!
//! On an accepted share the coordinator asks the ledger service to issue
//! the fixed per-share reward. Issuance failure never rolls back the share:
//! the share was counted before the call, the miner just sees a pending
//! reward. There is no retry loop; a failed issuance is terminal for that
//! share.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::MinerRegistry;
use crate::stats::PoolCounters;

/// External ledger capability: credit `amount` reward units to `wallet`,
/// returning a transaction signature.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn issue(&self, wallet: &str, amount: u64) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    wallet: &'a str,
    token: &'a str,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    signature: String,
}

/// HTTP JSON ledger client.
pub struct HttpLedgerClient {
    issue_url: String,
    token_address: String,
    client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(issue_url: String, token_address: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        tracing::info!("Ledger client initialized: {}", issue_url);
        Self {
            issue_url,
            token_address,
            client,
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn issue(&self, wallet: &str, amount: u64) -> Result<String> {
        let request = IssueRequest {
            wallet,
            token: &self.token_address,
            amount,
        };
        let response = self
            .client
            .post(&self.issue_url)
            .json(&request)
            .send()
            .await
            .context("ledger request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("ledger returned {}", status);
        }

        let body: IssueResponse = response
            .json()
            .await
            .context("malformed ledger response")?;
        Ok(body.signature)
    }
}

/// Outcome of a reward attempt for one accepted share.
#[derive(Debug, Clone)]
pub enum AwardOutcome {
    /// Tokens issued; earnings were credited.
    Issued {
        signature: String,
        amount: u64,
        total_earnings: u64,
    },
    /// Issuance failed; the share stays accepted, reward reported as zero.
    Pending,
}

pub struct RewardCoordinator {
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<MinerRegistry>,
    counters: Arc<PoolCounters>,
    reward_per_share: u64,
}

impl RewardCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        registry: Arc<MinerRegistry>,
        counters: Arc<PoolCounters>,
        reward_per_share: u64,
    ) -> Self {
        Self {
            ledger,
            registry,
            counters,
            reward_per_share,
        }
    }

    pub fn reward_per_share(&self) -> u64 {
        self.reward_per_share
    }

    /// Issue the per-share reward for an already-accepted share. Earnings
    /// and the distributed total move only on issuance success.
    pub async fn award(&self, wallet: &str) -> AwardOutcome {
        let amount = self.reward_per_share;
        match self.ledger.issue(wallet, amount).await {
            Ok(signature) => {
                let total_earnings = self
                    .registry
                    .credit_earnings(wallet, amount)
                    .await
                    .unwrap_or(0);
                self.counters.add_distributed(amount);
                tracing::info!(
                    "💰 Issued {} reward unit(s) to {} (tx: {})",
                    amount,
                    wallet,
                    signature
                );
                AwardOutcome::Issued {
                    signature,
                    amount,
                    total_earnings,
                }
            }
            Err(e) => {
                tracing::error!("Reward issuance failed for {}: {:#}", wallet, e);
                AwardOutcome::Pending
            }
        }
    }
}
