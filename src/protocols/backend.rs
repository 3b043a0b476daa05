use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::api::{BuildRequest, DiscoverRequest, ProtocolApiClient};
use crate::engine::DraftTransaction;

use super::{BuildParams, BuilderRuntime, ProtocolError, ProtocolKind, RawPosition};

/// 基于 HTTP discovery / build 端点的协议后端，两个适配器共用。
pub struct HttpBackend {
    kind: ProtocolKind,
    api: ProtocolApiClient,
    runtime: BuilderRuntime,
}

impl HttpBackend {
    pub fn new(kind: ProtocolKind, api: ProtocolApiClient, runtime: BuilderRuntime) -> Self {
        Self { kind, api, runtime }
    }

    pub async fn discover(&self, owner: &Pubkey) -> Result<Vec<RawPosition>, ProtocolError> {
        let response = self
            .api
            .discover(&DiscoverRequest::new(*owner))
            .await
            .map_err(|source| ProtocolError::Discovery {
                protocol: self.kind,
                source,
            })?;
        debug!(
            target: "protocol::discover",
            protocol = %self.kind,
            owner = %owner,
            positions = response.positions.len(),
            "discovery 完成"
        );
        Ok(response
            .positions
            .into_iter()
            .map(|value| RawPosition {
                protocol: self.kind,
                value,
            })
            .collect())
    }

    pub async fn build(&self, params: &BuildParams) -> Result<DraftTransaction, ProtocolError> {
        let kind = params.action.kind();
        if !params.position.available(kind) {
            return Err(ProtocolError::ZeroBalance { kind });
        }

        self.runtime.ensure_available(&self.api).await?;

        let request = BuildRequest {
            owner_identifier: params.owner,
            pool_keys: params.position.build_keys.clone(),
            action: params.action,
            fee_level: params.fee_level,
            slippage_tolerance: params.slippage_bps,
            compute_unit_ceiling: params.compute_unit_ceiling,
        };
        let response =
            self.api
                .build(&request)
                .await
                .map_err(|source| ProtocolError::Build {
                    protocol: self.kind,
                    source,
                })?;

        let draft =
            DraftTransaction::from_base64(&response.serialized_transaction, response.expiry_height)
                .map_err(|err| ProtocolError::InvalidTransaction(err.to_string()))?;
        debug!(
            target: "protocol::build",
            protocol = %self.kind,
            pool = %params.position.pool,
            action = %kind,
            fee_level = params.fee_level,
            expiry_height = draft.expiry_height,
            "草稿交易构建完成"
        );
        Ok(draft)
    }
}
