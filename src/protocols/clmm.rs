use std::collections::BTreeMap;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::engine::DraftTransaction;

use super::fields::{amount, as_object, optional_pubkey, required_pubkey};
use super::{
    BuildParams, HttpBackend, PositionKeys, ProtocolAdapter, ProtocolError, ProtocolKind,
    RawPosition,
};

/// 集中流动性池：仓位由 NFT 标识，手续费挂在仓位账户上。
pub struct ClmmAdapter {
    backend: HttpBackend,
}

impl ClmmAdapter {
    pub fn new(backend: HttpBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ProtocolAdapter for ClmmAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Clmm
    }

    async fn discover(&self, owner: &Pubkey) -> Result<Vec<RawPosition>, ProtocolError> {
        self.backend.discover(owner).await
    }

    fn resolve(&self, raw: &RawPosition) -> Result<PositionKeys, ProtocolError> {
        resolve_clmm(raw)
    }

    async fn build(&self, params: &BuildParams) -> Result<DraftTransaction, ProtocolError> {
        self.backend.build(params).await
    }
}

pub(crate) fn resolve_clmm(raw: &RawPosition) -> Result<PositionKeys, ProtocolError> {
    let map = as_object(&raw.value)?;
    let pool = required_pubkey(map, "pool", &["pool", "poolId", "poolAddress"])?;
    let position = required_pubkey(map, "position", &["position", "positionId", "personalPosition"])?;
    let nft_mint = optional_pubkey(map, "nftMint", &["nftMint", "positionNftMint"])?;

    let fee_a = amount(map, "tokenFeesOwedA", &["tokenFeesOwedA", "feeOwedA"])?;
    let fee_b = amount(map, "tokenFeesOwedB", &["tokenFeesOwedB", "feeOwedB"])?;
    let liquidity = amount(map, "liquidity", &["liquidity"])?;

    let mut build_keys = BTreeMap::new();
    build_keys.insert("pool".to_string(), pool.to_string());
    build_keys.insert("position".to_string(), position.to_string());
    if let Some(mint) = nft_mint {
        build_keys.insert("nftMint".to_string(), mint.to_string());
    }

    Ok(PositionKeys {
        protocol: ProtocolKind::Clmm,
        pool,
        secondary: position,
        fees_owed: fee_a.saturating_add(fee_b),
        liquidity,
        build_keys,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> RawPosition {
        RawPosition {
            protocol: ProtocolKind::Clmm,
            value,
        }
    }

    #[test]
    fn resolves_position_with_aliases() {
        let pool = Pubkey::new_unique();
        let position = Pubkey::new_unique();
        let nft = Pubkey::new_unique();
        let keys = resolve_clmm(&raw(json!({
            "poolId": pool.to_string(),
            "position": position.to_string(),
            "positionNftMint": nft.to_string(),
            "tokenFeesOwedA": "0",
            "tokenFeesOwedB": "0",
            "liquidity": "18446744073709551616"
        })))
        .expect("resolve");
        assert_eq!(keys.pool, pool);
        assert_eq!(keys.secondary, position);
        assert_eq!(keys.fees_owed, 0);
        assert_eq!(keys.liquidity, u128::from(u64::MAX) + 1);
        assert_eq!(keys.build_keys["nftMint"], nft.to_string());
    }

    #[test]
    fn invalid_position_key_is_rejected() {
        let err = resolve_clmm(&raw(json!({
            "pool": Pubkey::new_unique().to_string(),
            "position": "not-a-key"
        })))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "position", .. }));
    }
}
