use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use super::ApiError;
use super::serde_helpers::field_as_string;
use crate::protocols::ExitAction;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    #[serde(with = "field_as_string")]
    pub owner_identifier: Pubkey,
    pub pool_keys: BTreeMap<String, String>,
    pub action: ExitAction,
    pub fee_level: u64,
    /// 基点。
    pub slippage_tolerance: u16,
    pub compute_unit_ceiling: u32,
}

/// build 端点成功时返回的未签名交易（base64）与过期高度。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResponse {
    pub serialized_transaction: String,
    pub expiry_height: u64,
}

impl BuildResponse {
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(ApiError::Schema("build 响应为空".to_string()));
        }
        let value: Value = serde_json::from_str(trimmed)?;
        let map = value
            .as_object()
            .ok_or_else(|| ApiError::Schema("build 响应不是 JSON 对象".to_string()))?;

        if let Some(error) = map.get("error").filter(|error| !error.is_null()) {
            return Err(parse_rejection(error));
        }

        let serialized_transaction = map
            .get("serializedTransaction")
            .or_else(|| map.get("transaction"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|tx| !tx.is_empty())
            .ok_or_else(|| ApiError::Schema("缺少 serializedTransaction 字段".to_string()))?
            .to_string();

        let expiry_height = map
            .get("expiryHeight")
            .or_else(|| map.get("lastValidBlockHeight"))
            .and_then(value_as_u64)
            .ok_or_else(|| ApiError::Schema("缺少或非法的 expiryHeight 字段".to_string()))?;

        Ok(Self {
            serialized_transaction,
            expiry_height,
        })
    }
}

fn parse_rejection(error: &Value) -> ApiError {
    match error {
        Value::String(message) => ApiError::Rejected {
            code: "unknown".to_string(),
            message: message.clone(),
        },
        Value::Object(map) => {
            let code = map
                .get("code")
                .map(|code| match code {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "unknown".to_string());
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("未提供错误信息")
                .to_string();
            ApiError::Rejected { code, message }
        }
        other => ApiError::Rejected {
            code: "unknown".to_string(),
            message: other.to_string(),
        },
    }
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
