use serde::Deserialize;
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};

use crate::protocols::ProtocolKind;

#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub protocols: ProtocolsConfig,
    #[serde(default)]
    pub exit: ExitSettings,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, deserialize_with = "super::deserialize_rpc_urls")]
    pub rpc_urls: Vec<String>,
    #[serde(default = "super::default_commitment")]
    pub commitment: CommitmentSetting,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GlobalConfig {
    pub fn rpc_urls(&self) -> &[String] {
        &self.rpc_urls
    }

    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(|s| s.as_str())
    }
}

/// 确认等级，对应 RPC 的 processed / confirmed / finalized。
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentSetting {
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentSetting {
    pub fn level(self) -> CommitmentLevel {
        match self {
            CommitmentSetting::Processed => CommitmentLevel::Processed,
            CommitmentSetting::Confirmed => CommitmentLevel::Confirmed,
            CommitmentSetting::Finalized => CommitmentLevel::Finalized,
        }
    }

    pub fn config(self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// base58 私钥、JSON 字节数组，或 keypair 文件路径。
    #[serde(default)]
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolsConfig {
    #[serde(default)]
    pub fee_vault: ProtocolEndpointConfig,
    #[serde(default)]
    pub clmm: ProtocolEndpointConfig,
}

impl ProtocolsConfig {
    pub fn endpoint(&self, kind: ProtocolKind) -> &ProtocolEndpointConfig {
        match kind {
            ProtocolKind::FeeVault => &self.fee_vault,
            ProtocolKind::Clmm => &self.clmm,
        }
    }

    pub fn enabled_kinds(&self) -> Vec<ProtocolKind> {
        ProtocolKind::ALL
            .into_iter()
            .filter(|kind| self.endpoint(*kind).enable)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolEndpointConfig {
    #[serde(default = "super::default_true")]
    pub enable: bool,
    #[serde(default)]
    pub discover_url: String,
    #[serde(default)]
    pub build_url: String,
    /// 可选的构建服务探活地址，仅在首次构建前请求一次。
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default = "super::default_protocol_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitSettings {
    #[serde(default = "super::default_fee_level_base")]
    pub fee_level_base: u64,
    #[serde(default = "super::default_fee_ceiling")]
    pub fee_ceiling: u64,
    #[serde(default = "super::default_fee_granularity")]
    pub fee_granularity: u64,
    #[serde(default = "super::default_escalation_factor_bps")]
    pub escalation_factor_bps: u64,
    #[serde(default = "super::default_variant_count")]
    pub variant_count: usize,
    #[serde(default = "super::default_compute_unit_ceiling")]
    pub compute_unit_ceiling: u32,
    #[serde(default = "super::default_slippage_bps")]
    pub slippage_bps: u16,
    #[serde(default = "super::default_withdraw_bps")]
    pub withdraw_bps: u16,
    #[serde(default = "super::default_true")]
    pub include_claims: bool,
    #[serde(default = "super::default_true")]
    pub include_withdrawals: bool,
    #[serde(default = "super::default_true")]
    pub refresh_expired_drafts: bool,
    #[serde(default)]
    pub simulate_before_send: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "super::default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
    #[serde(default = "super::default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "super::default_prometheus_listen")]
    pub listen: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        global: GlobalConfig,
    }

    #[test]
    fn deserialize_single_rpc_url_string() {
        let yaml = "global:\n  rpc_urls: http://localhost:8899\n";
        let wrapper: Wrapper = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(
            wrapper.global.rpc_urls(),
            &["http://localhost:8899".to_string()]
        );
        assert_eq!(wrapper.global.commitment, CommitmentSetting::Confirmed);
    }

    #[test]
    fn deserialize_multiple_rpc_urls_dedup() {
        let yaml =
            "global:\n  rpc_urls:\n    - http://a:8899\n    - http://b:8899\n    - http://a:8899\n";
        let wrapper: Wrapper = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(
            wrapper.global.rpc_urls(),
            &["http://a:8899".to_string(), "http://b:8899".to_string()]
        );
    }

    #[test]
    fn exit_settings_fill_defaults() {
        let yaml = "exit:\n  fee_level_base: 100000\n  dry_run: true\n";
        let config: ExitConfig = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(config.exit.fee_level_base, 100_000);
        assert_eq!(config.exit.fee_ceiling, 3_000_000);
        assert_eq!(config.exit.escalation_factor_bps, 13_500);
        assert_eq!(config.exit.variant_count, 3);
        assert!(config.exit.dry_run);
        assert!(config.exit.include_claims);
        assert_eq!(
            config.protocols.enabled_kinds(),
            vec![ProtocolKind::FeeVault, ProtocolKind::Clmm]
        );
    }

    #[test]
    fn disabled_protocol_is_not_enabled() {
        let yaml = "protocols:\n  clmm:\n    enable: false\n";
        let config: ExitConfig = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(config.protocols.enabled_kinds(), vec![ProtocolKind::FeeVault]);
    }
}
