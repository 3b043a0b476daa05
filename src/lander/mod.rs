//! 链上交互层：提交、模拟、确认交易以及查询区块高度与余额。

mod deadline;
pub mod error;
mod rpc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

pub use error::LanderError;
pub use rpc::RpcLander;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn block_height(&self) -> Result<u64, LanderError>;

    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<(), LanderError>;

    async fn submit(&self, transaction: &VersionedTransaction) -> Result<Signature, LanderError>;

    /// 等待交易达到配置的确认级别，区块高度超过 `expiry_height` 视为失败。
    async fn confirm(&self, signature: &Signature, expiry_height: u64) -> Result<(), LanderError>;

    async fn balance(&self, owner: &Pubkey) -> Result<u64, LanderError>;
}
