use rand::RngCore;
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    pub window_ms: i64,
    pub max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: 900_000,
            max_requests: 100,
        }
    }
}

fn default_miner_rate_limit() -> RateLimitSettings {
    RateLimitSettings {
        window_ms: 60_000,
        max_requests: 60,
    }
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub listen: String,
    /// Ledger issuance endpoint (POST {wallet, token, amount})
    pub ledger_url: String,
    /// Reward token identifier advertised to miners
    #[serde(default)]
    pub token_address: String,
    #[serde(default = "default_pool_fee")]
    pub pool_fee_percent: f64,
    #[serde(default = "default_reward_per_share")]
    pub reward_per_share: u64,
    /// Bearer token for the admin endpoints; generated when unset
    #[serde(default)]
    pub admin_token: String,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    /// Freshness window for "active" miners (millis)
    #[serde(default = "default_active_window")]
    pub active_window_ms: i64,
    /// Minimum interval between share submissions per miner (millis)
    #[serde(default = "default_submit_interval")]
    pub min_submit_interval_ms: i64,
    /// Accepted clock skew on share timestamps (millis)
    #[serde(default = "default_timestamp_skew")]
    pub max_timestamp_skew_ms: i64,
    #[serde(default)]
    pub api_rate_limit: RateLimitSettings,
    #[serde(default = "default_miner_rate_limit")]
    pub miner_rate_limit: RateLimitSettings,
}

fn default_pool_fee() -> f64 { 3.0 }
fn default_reward_per_share() -> u64 { 1 }
fn default_snapshot_dir() -> String { ".".to_string() }
fn default_active_window() -> i64 { 300_000 }
fn default_submit_interval() -> i64 { 1000 }
fn default_timestamp_skew() -> i64 { 300_000 }

impl Config {
    pub fn load() -> Self {
        let mut cfg = Self {
            listen: "0.0.0.0:3001".to_string(),
            ledger_url: "http://127.0.0.1:8899/issue".to_string(),
            token_address: String::new(),
            pool_fee_percent: default_pool_fee(),
            reward_per_share: default_reward_per_share(),
            admin_token: String::new(),
            snapshot_dir: default_snapshot_dir(),
            active_window_ms: default_active_window(),
            min_submit_interval_ms: default_submit_interval(),
            max_timestamp_skew_ms: default_timestamp_skew(),
            api_rate_limit: RateLimitSettings::default(),
            miner_rate_limit: default_miner_rate_limit(),
        };

        // File config first, env overrides second
        if let Ok(txt) = std::fs::read_to_string("pool_config.json") {
            match serde_json::from_str::<Config>(&txt) {
                Ok(file_cfg) => {
                    println!("✅ Loaded pool_config.json");
                    cfg = file_cfg;
                }
                Err(e) => eprintln!("⚠️ Failed to parse pool_config.json: {}", e),
            }
        }

        if let Ok(l) = std::env::var("POOL_LISTEN") {
            cfg.listen = l;
        }
        if let Ok(u) = std::env::var("POOL_LEDGER_URL") {
            cfg.ledger_url = u;
        }
        if let Ok(t) = std::env::var("POOL_TOKEN_ADDRESS") {
            cfg.token_address = t;
        }
        if let Ok(f) = std::env::var("POOL_FEE") {
            cfg.pool_fee_percent = f.parse().unwrap_or(default_pool_fee());
        }
        if let Ok(r) = std::env::var("POOL_REWARD_PER_SHARE") {
            cfg.reward_per_share = r.parse().unwrap_or(default_reward_per_share());
        }
        if let Ok(t) = std::env::var("ADMIN_TOKEN") {
            cfg.admin_token = t;
        }
        if let Ok(d) = std::env::var("POOL_SNAPSHOT_DIR") {
            cfg.snapshot_dir = d;
        }
        if let Ok(w) = std::env::var("POOL_ACTIVE_WINDOW_MS") {
            cfg.active_window_ms = w.parse().unwrap_or(default_active_window());
        }
        if let Ok(i) = std::env::var("POOL_SUBMIT_INTERVAL_MS") {
            cfg.min_submit_interval_ms = i.parse().unwrap_or(default_submit_interval());
        }

        // Sanity clamps
        if !(0.0..=100.0).contains(&cfg.pool_fee_percent) {
            cfg.pool_fee_percent = default_pool_fee();
        }
        if cfg.reward_per_share == 0 {
            cfg.reward_per_share = default_reward_per_share();
        }
        if cfg.active_window_ms <= 0 {
            cfg.active_window_ms = default_active_window();
        }
        if cfg.min_submit_interval_ms < 0 {
            cfg.min_submit_interval_ms = default_submit_interval();
        }
        if cfg.max_timestamp_skew_ms <= 0 {
            cfg.max_timestamp_skew_ms = default_timestamp_skew();
        }

        // Generate an admin token when none is configured; print it once so
        // the operator can reach the dashboard, mirroring startup logs.
        if cfg.admin_token.is_empty() {
            cfg.admin_token = generate_admin_token();
            println!("🔐 Admin token: {}", cfg.admin_token);
        }

        if cfg.token_address.is_empty() {
            eprintln!("⚠️  POOL_TOKEN_ADDRESS not set — miners will see an empty token identifier");
        }

        cfg
    }
}

fn generate_admin_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_64_hex_chars() {
        let token = generate_admin_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_admin_token());
    }
}
