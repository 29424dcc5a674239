//! Shutdown snapshot - best-effort state dump
//!
//! On graceful shutdown the registry and pool counters are serialized to a
//! timestamped JSON file for later inspection. There is no flush guarantee
//! if the process dies hard.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::registry::{Miner, MinerRegistry};
use crate::stats::PoolCounters;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotStats {
    total_shares: u64,
    total_distributed: u64,
    pool_fee: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    timestamp: i64,
    miners: Vec<Miner>,
    stats: SnapshotStats,
}

/// Write the snapshot file; returns its path.
pub async fn write_snapshot(
    dir: &Path,
    registry: &MinerRegistry,
    counters: &PoolCounters,
    pool_fee_percent: f64,
) -> Result<PathBuf> {
    let snapshot = Snapshot {
        timestamp: Utc::now().timestamp_millis(),
        miners: registry.all().await,
        stats: SnapshotStats {
            total_shares: counters.total_shares(),
            total_distributed: counters.total_distributed(),
            pool_fee: pool_fee_percent,
        },
    };

    let filename = format!("pool-snapshot-{}.json", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let path = dir.join(filename);
    let body = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
