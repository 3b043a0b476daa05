use serde::Serialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use super::serde_helpers::field_as_string;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    #[serde(with = "field_as_string")]
    pub owner_identifier: Pubkey,
}

impl DiscoverRequest {
    pub fn new(owner: Pubkey) -> Self {
        Self {
            owner_identifier: owner,
        }
    }
}

/// discovery 端点的响应：原样保留每个持仓的 JSON，由协议适配器解析。
#[derive(Debug, Clone, Default)]
pub struct DiscoverResponse {
    pub positions: Vec<Value>,
}

impl DiscoverResponse {
    /// 空响应体、非法 JSON、缺少 `positions` 字段都视为空结果。
    pub fn parse_lenient(protocol: &str, body: &str) -> Self {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    target: "api::discover",
                    protocol,
                    error = %err,
                    "discovery 响应不是合法 JSON，按空结果处理"
                );
                return Self::default();
            }
        };

        let positions = match value {
            Value::Object(mut map) => match map.remove("positions") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    warn!(
                        target: "api::discover",
                        protocol,
                        kind = json_kind(&other),
                        "discovery 响应 positions 字段不是数组，按空结果处理"
                    );
                    Vec::new()
                }
            },
            Value::Array(items) => items,
            other => {
                warn!(
                    target: "api::discover",
                    protocol,
                    kind = json_kind(&other),
                    "discovery 响应结构不符合预期，按空结果处理"
                );
                Vec::new()
            }
        };

        Self {
            positions: positions
                .into_iter()
                .filter(|item| item.is_object())
                .collect(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_owner() {
        let owner = Pubkey::new_unique();
        let value = serde_json::to_value(DiscoverRequest::new(owner)).expect("serialize");
        assert_eq!(value["ownerIdentifier"], owner.to_string());
    }

    #[test]
    fn tolerates_empty_and_malformed_bodies() {
        assert!(DiscoverResponse::parse_lenient("clmm", "").positions.is_empty());
        assert!(DiscoverResponse::parse_lenient("clmm", "{not json").positions.is_empty());
        assert!(
            DiscoverResponse::parse_lenient("clmm", r#"{"positions":"oops"}"#)
                .positions
                .is_empty()
        );
        assert!(DiscoverResponse::parse_lenient("clmm", "42").positions.is_empty());
    }

    #[test]
    fn keeps_object_positions_only() {
        let body = r#"{"positions":[{"pool":"a"},7,{"pool":"b"}]}"#;
        let response = DiscoverResponse::parse_lenient("fee_vault", body);
        assert_eq!(response.positions.len(), 2);
        assert_eq!(response.positions[1]["pool"], "b");
    }

    #[test]
    fn accepts_bare_array() {
        let response = DiscoverResponse::parse_lenient("fee_vault", r#"[{"pool":"a"}]"#);
        assert_eq!(response.positions.len(), 1);
    }
}
