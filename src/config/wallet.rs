use std::env;
use std::fs;
use std::path::Path;

use solana_sdk::signature::Keypair;
use tracing::info;
use zeroize::Zeroizing;

use super::{ConfigError, WalletConfig};

pub const PRIVATE_KEY_ENV: &str = "LP_EXIT_PRIVATE_KEY";

/// 读取签名私钥：环境变量优先，其次 `global.wallet.private_key`。
///
/// 私钥可以是 base58 字符串、JSON 字节数组、逗号分隔的字节，
/// 或指向 solana-keygen 生成的 keypair 文件路径。
pub fn load_keypair(wallet: &WalletConfig) -> Result<Keypair, ConfigError> {
    if let Ok(value) = env::var(PRIVATE_KEY_ENV) {
        let value = Zeroizing::new(value);
        if !value.trim().is_empty() {
            return parse_keypair_source(value.trim()).map_err(|message| ConfigError::Invalid {
                field: "LP_EXIT_PRIVATE_KEY",
                message,
            });
        }
    }

    let configured = wallet.private_key.trim();
    if !configured.is_empty() {
        return parse_keypair_source(configured).map_err(|message| ConfigError::Invalid {
            field: "global.wallet.private_key",
            message,
        });
    }

    Err(ConfigError::Invalid {
        field: "global.wallet.private_key",
        message: format!("缺少私钥配置，请提供 global.wallet.private_key 或环境变量 {PRIVATE_KEY_ENV}"),
    })
}

fn parse_keypair_source(raw: &str) -> Result<Keypair, String> {
    let path = Path::new(raw);
    let looks_like_path = raw.ends_with(".json") || raw.contains('/');
    if looks_like_path && path.exists() {
        let contents = Zeroizing::new(
            fs::read_to_string(path).map_err(|err| format!("读取 keypair 文件失败: {err}"))?,
        );
        info!(target: "config", path = %path.display(), "从文件加载钱包私钥");
        return parse_keypair_string(contents.trim());
    }
    parse_keypair_string(raw)
}

fn parse_keypair_string(raw: &str) -> Result<Keypair, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("私钥为空".to_string());
    }

    let bytes: Zeroizing<Vec<u8>> = if trimmed.starts_with('[') {
        Zeroizing::new(
            serde_json::from_str::<Vec<u8>>(trimmed)
                .map_err(|err| format!("JSON 字节数组解析失败: {err}"))?,
        )
    } else if trimmed.contains(',') {
        Zeroizing::new(
            trimmed
                .split(',')
                .map(|part| part.trim())
                .filter(|part| !part.is_empty())
                .map(|part| part.parse::<u8>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| format!("字节解析失败: {err}"))?,
        )
    } else {
        Zeroizing::new(
            bs58::decode(trimmed)
                .into_vec()
                .map_err(|err| format!("base58 解码失败: {err}"))?,
        )
    };

    Keypair::try_from(bytes.as_slice()).map_err(|err| format!("私钥格式非法: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use solana_sdk::signature::Signer;

    use super::*;

    #[test]
    fn parses_base58_and_json_forms() {
        let keypair = Keypair::new();
        let base58 = keypair.to_base58_string();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).expect("json");

        let from_base58 = parse_keypair_string(&base58).expect("base58");
        let from_json = parse_keypair_string(&json).expect("json");
        assert_eq!(from_base58.pubkey(), keypair.pubkey());
        assert_eq!(from_json.pubkey(), keypair.pubkey());
    }

    #[test]
    fn parses_keypair_file() {
        let keypair = Keypair::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("id.json");
        let mut file = fs::File::create(&path).expect("create");
        write!(
            file,
            "{}",
            serde_json::to_string(&keypair.to_bytes().to_vec()).expect("json")
        )
        .expect("write");

        let loaded = parse_keypair_source(path.to_str().expect("utf8")).expect("load");
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_keypair_string("not-a-key").is_err());
        assert!(parse_keypair_string("").is_err());
    }
}
