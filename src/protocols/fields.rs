use std::str::FromStr;

use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;

use super::ProtocolError;

pub(super) fn as_object(value: &Value) -> Result<&Map<String, Value>, ProtocolError> {
    value.as_object().ok_or(ProtocolError::InvalidField {
        field: "position",
        value: "不是 JSON 对象".to_string(),
    })
}

fn first<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| map.get(*alias))
        .find(|value| !value.is_null())
}

pub(super) fn required_pubkey(
    map: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Pubkey, ProtocolError> {
    optional_pubkey(map, field, aliases)?.ok_or(ProtocolError::MissingField { field })
}

pub(super) fn optional_pubkey(
    map: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Option<Pubkey>, ProtocolError> {
    match first(map, aliases) {
        None => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => Pubkey::from_str(raw.trim())
            .map(Some)
            .map_err(|_| ProtocolError::InvalidField {
                field,
                value: raw.clone(),
            }),
        Some(other) => Err(ProtocolError::InvalidField {
            field,
            value: other.to_string(),
        }),
    }
}

/// 数量字段可能是数字或十进制字符串；缺省视为 0。
pub(super) fn amount(
    map: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<u128, ProtocolError> {
    match first(map, aliases) {
        None => Ok(0),
        Some(Value::Number(number)) => {
            number
                .as_u64()
                .map(u128::from)
                .ok_or_else(|| ProtocolError::InvalidField {
                    field,
                    value: number.to_string(),
                })
        }
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(0),
        Some(Value::String(raw)) => {
            raw.trim()
                .parse::<u128>()
                .map_err(|_| ProtocolError::InvalidField {
                    field,
                    value: raw.clone(),
                })
        }
        Some(other) => Err(ProtocolError::InvalidField {
            field,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pubkey_aliases_and_errors() {
        let pool = Pubkey::new_unique();
        let value = json!({ "poolId": pool.to_string(), "bad": "xyz", "num": 5 });
        let map = as_object(&value).expect("object");
        assert_eq!(
            required_pubkey(map, "pool", &["pool", "poolId"]).expect("pool"),
            pool
        );
        assert!(matches!(
            required_pubkey(map, "position", &["position"]),
            Err(ProtocolError::MissingField { field: "position" })
        ));
        assert!(matches!(
            optional_pubkey(map, "bad", &["bad"]),
            Err(ProtocolError::InvalidField { .. })
        ));
        assert!(optional_pubkey(map, "num", &["num"]).is_err());
    }

    #[test]
    fn amounts_accept_numbers_and_strings() {
        let value = json!({
            "a": 12,
            "b": "340282366920938463463374607431768211455",
            "c": "",
            "d": -1,
            "e": "1.5"
        });
        let map = as_object(&value).expect("object");
        assert_eq!(amount(map, "a", &["a"]).expect("a"), 12);
        assert_eq!(amount(map, "b", &["b"]).expect("b"), u128::MAX);
        assert_eq!(amount(map, "c", &["c"]).expect("c"), 0);
        assert_eq!(amount(map, "missing", &["missing"]).expect("missing"), 0);
        assert!(amount(map, "d", &["d"]).is_err());
        assert!(amount(map, "e", &["e"]).is_err());
    }
}
