use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::protocols::ProtocolKind;

use super::ExitConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["lp-exit.yaml", "config/lp-exit.yaml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("解析配置 {path} 失败: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("配置 {field} 非法: {message}")]
    Invalid { field: &'static str, message: String },
}

pub fn load_config(path: Option<PathBuf>) -> Result<ExitConfig, ConfigError> {
    let candidate_paths = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<PathBuf>>(),
    };

    for candidate in candidate_paths {
        if let Some(config) = try_load_file(&candidate)? {
            validate(&config)?;
            return Ok(config);
        }
    }

    Ok(ExitConfig::default())
}

fn try_load_file(path: &Path) -> Result<Option<ExitConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: ExitConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Some(config))
}

/// 启动前的静态校验，只覆盖会导致整轮退出无意义的配置。
pub fn validate(config: &ExitConfig) -> Result<(), ConfigError> {
    let exit = &config.exit;
    if exit.variant_count == 0 {
        return Err(ConfigError::Invalid {
            field: "exit.variant_count",
            message: "至少需要 1 档优先费".to_string(),
        });
    }
    if exit.escalation_factor_bps < 10_000 {
        return Err(ConfigError::Invalid {
            field: "exit.escalation_factor_bps",
            message: format!("{} 小于 10000，优先费不会递增", exit.escalation_factor_bps),
        });
    }
    if exit.withdraw_bps == 0 || exit.withdraw_bps > 10_000 {
        return Err(ConfigError::Invalid {
            field: "exit.withdraw_bps",
            message: format!("{} 不在 1..=10000 范围内", exit.withdraw_bps),
        });
    }
    if exit.slippage_bps > 10_000 {
        return Err(ConfigError::Invalid {
            field: "exit.slippage_bps",
            message: format!("{} 超过 10000", exit.slippage_bps),
        });
    }

    for url in config.global.rpc_urls() {
        check_url("global.rpc_urls", url)?;
    }
    for kind in config.protocols.enabled_kinds() {
        let endpoint = config.protocols.endpoint(kind);
        let field = match kind {
            ProtocolKind::FeeVault => "protocols.fee_vault",
            ProtocolKind::Clmm => "protocols.clmm",
        };
        for url in [&endpoint.discover_url, &endpoint.build_url]
            .into_iter()
            .chain(endpoint.health_url.as_ref())
        {
            check_url(field, url)?;
        }
    }
    Ok(())
}

/// 空字符串视为未配置，由使用方在请求时报错。
fn check_url(field: &'static str, raw: &str) -> Result<(), ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(ConfigError::Invalid {
            field,
            message: format!("{raw} 的协议 {} 不受支持", url.scheme()),
        }),
        Err(err) => Err(ConfigError::Invalid {
            field,
            message: format!("{raw} 不是合法 URL: {err}"),
        }),
    }
}
