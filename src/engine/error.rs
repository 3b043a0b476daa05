use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::lander::LanderError;
use crate::protocols::{ProtocolError, ProtocolKind};

use super::signing::SignerError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("已有退出流程正在规划或执行")]
    RunInProgress,
    #[error(
        "第 {index} 笔交易（{protocol} 池 {pool}）需要非预期签名者: {}",
        join_keys(.signers)
    )]
    UnexpectedSigner {
        index: usize,
        protocol: ProtocolKind,
        pool: Pubkey,
        signers: Vec<Pubkey>,
    },
    #[error("配置缺失或非法: {0}")]
    InvalidConfig(String),
    #[error("签名失败: {0}")]
    Signer(#[from] SignerError),
    #[error("落地失败: {0}")]
    Landing(#[from] LanderError),
    #[error("协议错误: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("已取消")]
    Cancelled,
}

impl EngineError {
    pub fn describe(&self) -> String {
        match self {
            EngineError::Protocol(inner) => inner.describe(),
            other => other.to_string(),
        }
    }
}

fn join_keys(keys: &[Pubkey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type EngineResult<T> = Result<T, EngineError>;
