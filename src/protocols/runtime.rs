use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::api::ProtocolApiClient;

use super::{ProtocolError, ProtocolKind};

/// 协议构建器的可用性解析器。
///
/// 可用性只在首次构建前解析一次：未配置 `health_url` 时直接视为可用，
/// 否则请求一次探活端点。结果（成功或失败原因）缓存在本实例中，
/// 之后所有构建都复用同一结论，并发构建也只会触发一次探测。
pub struct BuilderRuntime {
    protocol: ProtocolKind,
    health_url: Option<String>,
    availability: OnceCell<Result<(), String>>,
}

impl BuilderRuntime {
    pub fn new(protocol: ProtocolKind, health_url: Option<String>) -> Self {
        let health_url = health_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Self {
            protocol,
            health_url,
            availability: OnceCell::new(),
        }
    }

    #[cfg(test)]
    fn is_resolved(&self) -> bool {
        self.availability.initialized()
    }

    pub async fn ensure_available(&self, api: &ProtocolApiClient) -> Result<(), ProtocolError> {
        let outcome = self
            .availability
            .get_or_init(|| async {
                let Some(url) = self.health_url.as_deref() else {
                    return Ok(());
                };
                match api.health_check(url).await {
                    Ok(()) => {
                        info!(
                            target: "protocol::runtime",
                            protocol = %self.protocol,
                            endpoint = url,
                            "构建器探活成功"
                        );
                        Ok(())
                    }
                    Err(err) => {
                        let reason = err.describe();
                        warn!(
                            target: "protocol::runtime",
                            protocol = %self.protocol,
                            endpoint = url,
                            error = %reason,
                            "构建器探活失败，本轮该协议的构建全部跳过"
                        );
                        Err(reason)
                    }
                }
            })
            .await;

        outcome
            .clone()
            .map_err(|reason| ProtocolError::BuilderUnavailable {
                protocol: self.protocol,
                reason,
            })
    }
}
