use std::collections::BTreeMap;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::engine::DraftTransaction;

use super::fields::{amount, as_object, optional_pubkey, required_pubkey};
use super::{
    BuildParams, HttpBackend, PositionKeys, ProtocolAdapter, ProtocolError, ProtocolKind,
    RawPosition,
};

/// fee vault 类池子：手续费累积在独立 vault 中，LP 份额为普通代币余额。
pub struct FeeVaultAdapter {
    backend: HttpBackend,
}

impl FeeVaultAdapter {
    pub fn new(backend: HttpBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ProtocolAdapter for FeeVaultAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::FeeVault
    }

    async fn discover(&self, owner: &Pubkey) -> Result<Vec<RawPosition>, ProtocolError> {
        self.backend.discover(owner).await
    }

    fn resolve(&self, raw: &RawPosition) -> Result<PositionKeys, ProtocolError> {
        resolve_fee_vault(raw)
    }

    async fn build(&self, params: &BuildParams) -> Result<DraftTransaction, ProtocolError> {
        self.backend.build(params).await
    }
}

pub(crate) fn resolve_fee_vault(raw: &RawPosition) -> Result<PositionKeys, ProtocolError> {
    let map = as_object(&raw.value)?;
    let pool = required_pubkey(map, "pool", &["pool", "poolAddress", "poolId"])?;
    let fee_vault = required_pubkey(map, "feeVault", &["feeVault", "fee_vault", "vault"])?;
    let lp_mint = optional_pubkey(map, "lpMint", &["lpMint", "lp_mint"])?;

    let fee_a = amount(map, "unclaimedFeeA", &["unclaimedFeeA", "feeA"])?;
    let fee_b = amount(map, "unclaimedFeeB", &["unclaimedFeeB", "feeB"])?;
    let lp_amount = amount(map, "lpAmount", &["lpAmount", "lp_amount", "balance"])?;

    let mut build_keys = BTreeMap::new();
    build_keys.insert("pool".to_string(), pool.to_string());
    build_keys.insert("feeVault".to_string(), fee_vault.to_string());
    if let Some(mint) = lp_mint {
        build_keys.insert("lpMint".to_string(), mint.to_string());
    }

    Ok(PositionKeys {
        protocol: ProtocolKind::FeeVault,
        pool,
        secondary: fee_vault,
        fees_owed: fee_a.saturating_add(fee_b),
        liquidity: lp_amount,
        build_keys,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> RawPosition {
        RawPosition {
            protocol: ProtocolKind::FeeVault,
            value,
        }
    }

    #[test]
    fn resolves_keys_and_balances() {
        let pool = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let keys = resolve_fee_vault(&raw(json!({
            "pool": pool.to_string(),
            "feeVault": vault.to_string(),
            "lpMint": mint.to_string(),
            "unclaimedFeeA": "10",
            "unclaimedFeeB": 5,
            "lpAmount": "1000"
        })))
        .expect("resolve");
        assert_eq!(keys.pool, pool);
        assert_eq!(keys.secondary, vault);
        assert_eq!(keys.fees_owed, 15);
        assert_eq!(keys.liquidity, 1_000);
        assert_eq!(keys.build_keys["lpMint"], mint.to_string());
        assert_eq!(keys.build_keys.len(), 3);
    }

    #[test]
    fn missing_fee_vault_is_rejected() {
        let err = resolve_fee_vault(&raw(json!({ "pool": Pubkey::new_unique().to_string() })))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField { field: "feeVault" }));
    }
}
