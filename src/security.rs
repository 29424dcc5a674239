//! Security monitor - anomalous request log + admin gate
//!
//! Records one event per anomalous request into a bounded in-memory log.
//! When the log exceeds its cap the oldest half is evicted in bulk, so
//! appends stay amortized O(1) instead of shifting a ring buffer.

use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::registry::now_ms;

/// Maximum retained events before bulk eviction kicks in.
pub const EVENT_LOG_CAP: usize = 1000;
/// Number of most-recent events kept after eviction.
pub const EVENT_LOG_RETAIN: usize = 500;

/// Event kinds, one per distinct anomaly the pipeline can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    InvalidWallet,
    InvalidWorkerName,
    InvalidHashrate,
    InvalidShareHash,
    InvalidNonce,
    StaleTimestamp,
    UnregisteredMiner,
    ShareSpam,
    UnauthorizedAccess,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub timestamp: i64,
    pub ip: String,
    pub user_agent: String,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Default)]
struct MonitorInner {
    events: Vec<SecurityEvent>,
    mode_enabled: bool,
    mode_started: Option<i64>,
}

pub struct SecurityMonitor {
    inner: Arc<RwLock<MonitorInner>>,
    admin_token: String,
}

impl SecurityMonitor {
    pub fn new(admin_token: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MonitorInner::default())),
            admin_token,
        }
    }

    /// Append an event, evicting the oldest half if the cap is exceeded.
    pub async fn record(&self, kind: EventKind, ip: &str, user_agent: &str, detail: String) {
        tracing::warn!("🚨 Security event: {:?} from {} - {}", kind, ip, detail);
        let event = SecurityEvent {
            timestamp: now_ms(),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            kind,
            detail,
        };
        let mut inner = self.inner.write().await;
        inner.events.push(event);
        if inner.events.len() > EVENT_LOG_CAP {
            let excess = inner.events.len() - EVENT_LOG_RETAIN;
            inner.events.drain(..excess);
        }
    }

    /// Exact-match bearer token check. Empty or missing tokens never pass.
    pub async fn authorize(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(token) if !token.is_empty() => token == self.admin_token,
            _ => false,
        }
    }

    /// Up to `n` most recent events, oldest first (most-recent-last).
    pub async fn query_recent(&self, n: usize) -> Vec<SecurityEvent> {
        let inner = self.inner.read().await;
        let start = inner.events.len().saturating_sub(n);
        inner.events[start..].to_vec()
    }

    pub async fn total_events(&self) -> usize {
        let inner = self.inner.read().await;
        inner.events.len()
    }

    /// Toggle the enhanced-monitoring flag.
    pub async fn set_mode(&self, enabled: bool) {
        let mut inner = self.inner.write().await;
        inner.mode_enabled = enabled;
        inner.mode_started = if enabled { Some(now_ms()) } else { None };
        if enabled {
            tracing::info!("🔒 Security mode enabled - enhanced monitoring active");
        } else {
            tracing::info!("🔓 Security mode disabled");
        }
    }

    pub async fn mode(&self) -> (bool, Option<i64>) {
        let inner = self.inner.read().await;
        (inner.mode_enabled, inner.mode_started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_query_most_recent_last() {
        let monitor = SecurityMonitor::new("secret".to_string());
        for i in 0..5 {
            monitor
                .record(EventKind::InvalidNonce, "1.2.3.4", "ua", format!("event {}", i))
                .await;
        }
        let recent = monitor.query_recent(3).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].detail, "event 2");
        assert_eq!(recent[2].detail, "event 4");
        assert_eq!(monitor.total_events().await, 5);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_half() {
        let monitor = SecurityMonitor::new("secret".to_string());
        for i in 0..(EVENT_LOG_CAP + 1) {
            monitor
                .record(EventKind::ShareSpam, "1.2.3.4", "ua", format!("e{}", i))
                .await;
        }
        assert_eq!(monitor.total_events().await, EVENT_LOG_RETAIN);
        let recent = monitor.query_recent(1).await;
        assert_eq!(recent[0].detail, format!("e{}", EVENT_LOG_CAP));
        // Oldest surviving event is the one cap+1-retain entries in
        let oldest = monitor.query_recent(EVENT_LOG_RETAIN).await;
        assert_eq!(oldest[0].detail, format!("e{}", EVENT_LOG_CAP + 1 - EVENT_LOG_RETAIN));
    }

    #[tokio::test]
    async fn authorize_is_exact_match() {
        let monitor = SecurityMonitor::new("secret".to_string());
        assert!(monitor.authorize(Some("secret")).await);
        assert!(!monitor.authorize(Some("Secret")).await);
        assert!(!monitor.authorize(Some("secret ")).await);
        assert!(!monitor.authorize(Some("")).await);
        assert!(!monitor.authorize(None).await);
    }

    #[tokio::test]
    async fn mode_toggle_tracks_start_time() {
        let monitor = SecurityMonitor::new("secret".to_string());
        assert_eq!(monitor.mode().await, (false, None));
        monitor.set_mode(true).await;
        let (enabled, since) = monitor.mode().await;
        assert!(enabled);
        assert!(since.is_some());
        monitor.set_mode(false).await;
        assert_eq!(monitor.mode().await, (false, None));
    }
}
