use thiserror::Error;

use crate::api::ApiError;

use super::{ProtocolKind, TaskKind};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{protocol} discovery 失败: {source}")]
    Discovery {
        protocol: ProtocolKind,
        #[source]
        source: ApiError,
    },
    #[error("{protocol} 构建请求失败: {source}")]
    Build {
        protocol: ProtocolKind,
        #[source]
        source: ApiError,
    },
    #[error("持仓缺少必填字段 {field}")]
    MissingField { field: &'static str },
    #[error("持仓字段 {field} 非法: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("{kind} 可用余额为 0")]
    ZeroBalance { kind: TaskKind },
    #[error("{protocol} 构建器不可用: {reason}")]
    BuilderUnavailable {
        protocol: ProtocolKind,
        reason: String,
    },
    #[error("{adapter} 适配器返回了 {found} 持仓")]
    ForeignPosition {
        adapter: ProtocolKind,
        found: ProtocolKind,
    },
    #[error("草稿交易解码失败: {0}")]
    InvalidTransaction(String),
}

impl ProtocolError {
    pub fn describe(&self) -> String {
        match self {
            ProtocolError::Discovery { source, .. } | ProtocolError::Build { source, .. } => {
                format!("{self} | {}", source.describe())
            }
            other => other.to_string(),
        }
    }
}
