//! 协议 discovery / build HTTP 端点封装。

pub mod build;
pub mod discover;
pub mod serde_helpers;

use std::fmt;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::monitoring::metrics::prometheus_enabled;

pub use build::{BuildRequest, BuildResponse};
pub use discover::{DiscoverRequest, DiscoverResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("请求 {endpoint} 超时（{timeout_ms}ms）")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("响应解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("请求 {endpoint} 返回状态 {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("请求 {endpoint} 被限流，状态 {status}: {body}")]
    RateLimited {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("响应结构不符合预期: {0}")]
    Schema(String),
    #[error("构建被拒绝 ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("未配置端点: {0}")]
    MissingEndpoint(&'static str),
}

impl ApiError {
    pub fn describe(&self) -> String {
        use std::error::Error as _;
        let mut parts = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            let text = err.to_string();
            if parts.last().map(|last| last == &text).unwrap_or(false) {
                current = err.source();
                continue;
            }
            parts.push(text);
            current = err.source();
        }
        parts.join(" | caused by: ")
    }
}

/// 单个协议的 HTTP 客户端，discovery 与 build 共用同一 reqwest 连接池。
#[derive(Clone)]
pub struct ProtocolApiClient {
    label: &'static str,
    client: reqwest::Client,
    discover_url: String,
    build_url: String,
    timeout: Duration,
}

impl fmt::Debug for ProtocolApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolApiClient")
            .field("label", &self.label)
            .field("discover_url", &self.discover_url)
            .field("build_url", &self.build_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProtocolApiClient {
    pub fn new(
        label: &'static str,
        client: reqwest::Client,
        discover_url: String,
        build_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            label,
            client,
            discover_url: discover_url.trim().to_string(),
            build_url: build_url.trim().to_string(),
            timeout,
        }
    }

    /// 请求持仓列表。空响应体或非法 JSON 视为空结果，只记录告警。
    pub async fn discover(&self, request: &DiscoverRequest) -> Result<DiscoverResponse, ApiError> {
        if self.discover_url.is_empty() {
            return Err(ApiError::MissingEndpoint("discover_url"));
        }
        let url = self.discover_url.clone();
        let body = self.post_json("discover", &url, request).await?;
        Ok(DiscoverResponse::parse_lenient(self.label, &body))
    }

    pub async fn build(&self, request: &BuildRequest) -> Result<BuildResponse, ApiError> {
        if self.build_url.is_empty() {
            return Err(ApiError::MissingEndpoint("build_url"));
        }
        let url = self.build_url.clone();
        let body = self.post_json("build", &url, request).await?;
        BuildResponse::parse(&body)
    }

    /// 探测任意 GET 端点是否返回 2xx。
    pub async fn health_check(&self, url: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.map_transport_error(url, err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::ApiStatus {
            endpoint: url.to_string(),
            status,
            body: summarize_error_body(body),
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        stage: &'static str,
        url: &str,
        payload: &T,
    ) -> Result<String, ApiError> {
        let started = Instant::now();
        trace!(
            target: "api::protocol",
            protocol = self.label,
            stage,
            endpoint = %url,
            "即将请求协议端点"
        );

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                self.record_metrics(stage, "transport_error", None, None);
                self.map_transport_error(url, err)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            self.record_metrics(stage, "read_error", None, Some(status));
            self.map_transport_error(url, err)
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let summary = summarize_error_body(body);
            self.record_metrics(stage, "rate_limited", None, Some(status));
            warn!(
                target: "api::protocol",
                protocol = self.label,
                stage,
                endpoint = %url,
                body = %summary,
                "协议端点命中限流"
            );
            return Err(ApiError::RateLimited {
                endpoint: url.to_string(),
                status,
                body: summary,
            });
        }

        // build 端点的结构化错误可能随 4xx 返回，交给调用方解析
        if !status.is_success() && !(stage == "build" && status.is_client_error()) {
            let summary = summarize_error_body(body);
            self.record_metrics(stage, "http_error", None, Some(status));
            warn!(
                target: "api::protocol",
                protocol = self.label,
                stage,
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "协议端点返回非 2xx 状态"
            );
            return Err(ApiError::ApiStatus {
                endpoint: url.to_string(),
                status,
                body: summary,
            });
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        debug!(
            target: "api::protocol",
            protocol = self.label,
            stage,
            status = status.as_u16(),
            elapsed_ms = format_args!("{elapsed_ms:.3}"),
            "协议端点请求完成"
        );
        self.record_metrics(stage, "success", Some(elapsed_ms), Some(status));
        Ok(body)
    }

    fn map_transport_error(&self, url: &str, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            let timeout_ms = self.timeout.as_millis() as u64;
            warn!(
                target: "api::protocol",
                protocol = self.label,
                endpoint = %url,
                timeout_ms,
                "协议端点请求超时"
            );
            ApiError::Timeout {
                endpoint: url.to_string(),
                timeout_ms,
                source: err,
            }
        } else {
            warn!(
                target: "api::protocol",
                protocol = self.label,
                endpoint = %url,
                error = %err,
                "协议端点请求发送失败"
            );
            ApiError::Http(err)
        }
    }

    fn record_metrics(
        &self,
        stage: &'static str,
        status: &'static str,
        elapsed_ms: Option<f64>,
        http_status: Option<StatusCode>,
    ) {
        if !prometheus_enabled() {
            return;
        }
        counter!(
            "lp_exit_protocol_requests_total",
            "protocol" => self.label,
            "stage" => stage,
            "status" => status,
            "http_status" => http_status
                .map(|code| code.as_u16().to_string())
                .unwrap_or_else(|| "none".to_string())
        )
        .increment(1);
        if let Some(value) = elapsed_ms {
            histogram!(
                "lp_exit_protocol_latency_ms",
                "protocol" => self.label,
                "stage" => stage
            )
            .record(value);
        }
    }
}

pub(crate) fn summarize_error_body(body: String) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty response body)".to_string();
    }
    const MAX_CHARS: usize = 512;
    let single_line = trimmed.replace(['\n', '\r'], " ");
    if single_line.chars().count() > MAX_CHARS {
        let mut truncated: String = single_line.chars().take(MAX_CHARS).collect();
        truncated.push('…');
        truncated
    } else {
        single_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_handles_empty_and_long_bodies() {
        assert_eq!(summarize_error_body("  \n".into()), "(empty response body)");
        let long = "错".repeat(600);
        let summary = summarize_error_body(long);
        assert_eq!(summary.chars().count(), 513);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn describe_includes_message() {
        let err = ApiError::Schema("missing field".into());
        assert_eq!(err.describe(), "响应结构不符合预期: missing field");
    }

    #[tokio::test]
    async fn missing_endpoint_is_reported() {
        let client = ProtocolApiClient::new(
            "fee_vault",
            reqwest::Client::new(),
            String::new(),
            "  ".into(),
            Duration::from_millis(100),
        );
        let owner = solana_sdk::pubkey::Pubkey::new_unique();
        let err = client
            .discover(&DiscoverRequest::new(owner))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingEndpoint("discover_url")));
    }
}
