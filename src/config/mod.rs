use std::collections::HashSet;

use serde::Deserialize;
use serde::de::Deserializer;

pub mod loader;
pub mod types;
pub mod wallet;

pub use loader::*;
pub use types::*;

use self::types as cfg;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_commitment() -> cfg::CommitmentSetting {
    cfg::CommitmentSetting::Confirmed
}

pub(crate) fn default_protocol_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_fee_level_base() -> u64 {
    250_000
}

pub(crate) fn default_fee_ceiling() -> u64 {
    3_000_000
}

pub(crate) fn default_fee_granularity() -> u64 {
    1_000
}

pub(crate) fn default_escalation_factor_bps() -> u64 {
    13_500
}

pub(crate) fn default_variant_count() -> usize {
    3
}

pub(crate) fn default_compute_unit_ceiling() -> u32 {
    400_000
}

pub(crate) fn default_slippage_bps() -> u16 {
    100
}

pub(crate) fn default_withdraw_bps() -> u16 {
    10_000
}

pub(crate) fn default_confirm_poll_interval_ms() -> u64 {
    1_000
}

pub(crate) fn default_confirm_timeout_ms() -> u64 {
    90_000
}

pub(crate) fn default_prometheus_listen() -> String {
    "0.0.0.0:9898".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RpcUrlField {
    Single(String),
    Multiple(Vec<String>),
}

pub(crate) fn deserialize_rpc_urls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let helper = Option::<RpcUrlField>::deserialize(deserializer)?;
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let values = match helper {
        Some(RpcUrlField::Single(url)) => vec![url],
        Some(RpcUrlField::Multiple(list)) => list,
        None => Vec::new(),
    };

    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            urls.push(trimmed.to_string());
        }
    }

    Ok(urls)
}

impl Default for cfg::ExitConfig {
    fn default() -> Self {
        Self {
            global: cfg::GlobalConfig::default(),
            protocols: cfg::ProtocolsConfig::default(),
            exit: cfg::ExitSettings::default(),
            bot: cfg::BotConfig::default(),
        }
    }
}

impl Default for cfg::GlobalConfig {
    fn default() -> Self {
        Self {
            rpc_urls: Vec::new(),
            commitment: default_commitment(),
            wallet: cfg::WalletConfig::default(),
            logging: cfg::LoggingConfig::default(),
        }
    }
}

impl Default for cfg::WalletConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
        }
    }
}

impl Default for cfg::LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_logging_level(),
            json: false,
        }
    }
}

impl Default for cfg::ProtocolsConfig {
    fn default() -> Self {
        Self {
            fee_vault: cfg::ProtocolEndpointConfig::default(),
            clmm: cfg::ProtocolEndpointConfig::default(),
        }
    }
}

impl Default for cfg::ProtocolEndpointConfig {
    fn default() -> Self {
        Self {
            enable: true,
            discover_url: String::new(),
            build_url: String::new(),
            health_url: None,
            timeout_ms: default_protocol_timeout_ms(),
        }
    }
}

impl Default for cfg::ExitSettings {
    fn default() -> Self {
        Self {
            fee_level_base: default_fee_level_base(),
            fee_ceiling: default_fee_ceiling(),
            fee_granularity: default_fee_granularity(),
            escalation_factor_bps: default_escalation_factor_bps(),
            variant_count: default_variant_count(),
            compute_unit_ceiling: default_compute_unit_ceiling(),
            slippage_bps: default_slippage_bps(),
            withdraw_bps: default_withdraw_bps(),
            include_claims: true,
            include_withdrawals: true,
            refresh_expired_drafts: true,
            simulate_before_send: false,
            dry_run: false,
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
        }
    }
}

impl Default for cfg::BotConfig {
    fn default() -> Self {
        Self {
            prometheus: cfg::PrometheusConfig::default(),
        }
    }
}

impl Default for cfg::PrometheusConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_prometheus_listen(),
        }
    }
}
