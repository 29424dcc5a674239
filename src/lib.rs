pub mod api;
pub mod config;
pub mod ratelimit;
pub mod registry;
pub mod rewards;
pub mod security;
pub mod shares;
pub mod snapshot;
pub mod stats;
