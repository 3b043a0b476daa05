use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: ToString,
    S: Serializer,
{
    value.to_string().serialize(serializer)
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.trim()
        .parse()
        .map_err(|err| de::Error::custom(format!("parse error: {err}")))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use solana_sdk::pubkey::Pubkey;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "super")]
        key: Pubkey,
        #[serde(with = "super")]
        amount: u64,
    }

    #[test]
    fn pubkey_and_amount_travel_as_strings() {
        let holder = Holder {
            key: Pubkey::new_unique(),
            amount: 42,
        };
        let value = serde_json::to_value(&holder).expect("serialize");
        assert_eq!(value["key"], holder.key.to_string());
        assert_eq!(value["amount"], "42");
        let back: Holder = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, holder);
    }
}
