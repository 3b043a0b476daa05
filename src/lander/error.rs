use solana_client::client_error::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LanderError {
    #[error("RPC 请求失败: {0}")]
    Rpc(#[from] ClientError),
    #[error("模拟执行失败: {message}{}", last_log(.logs))]
    Simulation { message: String, logs: Vec<String> },
    #[error("交易执行失败: {0}")]
    OnChain(String),
    #[error("交易已过期: 当前区块高度 {height} 超过 {expiry_height}")]
    Expired { height: u64, expiry_height: u64 },
    #[error("等待确认超时（{waited_ms}ms）: {signature}")]
    ConfirmTimeout { signature: String, waited_ms: u128 },
}

fn last_log(logs: &[String]) -> String {
    logs.last()
        .map(|line| format!(" | {line}"))
        .unwrap_or_default()
}
