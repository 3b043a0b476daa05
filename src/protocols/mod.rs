//! 流动性协议适配层：每个协议一个适配器，统一暴露 discover / build 能力。

mod backend;
pub mod clmm;
pub mod error;
pub mod fee_vault;
mod fields;
mod runtime;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use crate::api::ProtocolApiClient;
use crate::api::serde_helpers::field_as_string;
use crate::config::ProtocolsConfig;
use crate::engine::DraftTransaction;

pub use backend::HttpBackend;
pub use clmm::ClmmAdapter;
pub use error::ProtocolError;
pub use fee_vault::FeeVaultAdapter;
pub use runtime::BuilderRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// 以 fee vault 记账手续费的池子。
    FeeVault,
    /// 以 NFT 标识仓位的集中流动性池。
    Clmm,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 2] = [ProtocolKind::FeeVault, ProtocolKind::Clmm];

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::FeeVault => "fee_vault",
            ProtocolKind::Clmm => "clmm",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fee_vault" | "feevault" | "a" => Some(ProtocolKind::FeeVault),
            "clmm" | "b" => Some(ProtocolKind::Clmm),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Claim,
    Withdraw,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Claim => "claim",
            TaskKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 发送给 build 端点的动作参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitAction {
    Claim,
    Withdraw {
        #[serde(rename = "fractionBps")]
        fraction_bps: u16,
    },
}

impl ExitAction {
    pub fn kind(&self) -> TaskKind {
        match self {
            ExitAction::Claim => TaskKind::Claim,
            ExitAction::Withdraw { .. } => TaskKind::Withdraw,
        }
    }
}

/// discovery 返回的原始持仓描述。
#[derive(Debug, Clone)]
pub struct RawPosition {
    pub protocol: ProtocolKind,
    pub value: Value,
}

/// 从原始持仓解析出的、build 所需的协议键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionKeys {
    pub protocol: ProtocolKind,
    #[serde(with = "field_as_string")]
    pub pool: Pubkey,
    /// fee vault 地址或仓位地址。
    #[serde(with = "field_as_string")]
    pub secondary: Pubkey,
    pub fees_owed: u128,
    pub liquidity: u128,
    pub build_keys: BTreeMap<String, String>,
}

impl PositionKeys {
    pub fn available(&self, kind: TaskKind) -> bool {
        match kind {
            TaskKind::Claim => self.fees_owed > 0,
            TaskKind::Withdraw => self.liquidity > 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildParams {
    pub owner: Pubkey,
    pub position: PositionKeys,
    pub action: ExitAction,
    pub fee_level: u64,
    pub slippage_bps: u16,
    pub compute_unit_ceiling: u32,
}

/// 单个协议的能力接口，构造时按协议选定具体实现。
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    async fn discover(&self, owner: &Pubkey) -> Result<Vec<RawPosition>, ProtocolError>;

    fn resolve(&self, raw: &RawPosition) -> Result<PositionKeys, ProtocolError>;

    async fn build(&self, params: &BuildParams) -> Result<DraftTransaction, ProtocolError>;
}

/// 按配置为启用的协议构造适配器，顺序与 `kinds` 一致。
pub fn build_adapters(
    config: &ProtocolsConfig,
    http: reqwest::Client,
    kinds: &[ProtocolKind],
) -> Vec<Arc<dyn ProtocolAdapter>> {
    kinds
        .iter()
        .map(|kind| {
            let endpoint = config.endpoint(*kind);
            let api = ProtocolApiClient::new(
                kind.as_str(),
                http.clone(),
                endpoint.discover_url.clone(),
                endpoint.build_url.clone(),
                Duration::from_millis(endpoint.timeout_ms.max(1)),
            );
            let runtime = BuilderRuntime::new(*kind, endpoint.health_url.clone());
            let backend = HttpBackend::new(*kind, api, runtime);
            let adapter: Arc<dyn ProtocolAdapter> = match kind {
                ProtocolKind::FeeVault => Arc::new(FeeVaultAdapter::new(backend)),
                ProtocolKind::Clmm => Arc::new(ClmmAdapter::new(backend)),
            };
            adapter
        })
        .collect()
}
