use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use once_cell::sync::OnceCell;
use tracing::info;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();
static PROMETHEUS_ENABLED: AtomicBool = AtomicBool::new(false);

/// 确认耗时以秒级为主，桶按毫秒划分。
const LATENCY_BUCKETS_MS: &[f64] = &[
    50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0, 120_000.0,
];

fn parse_listen(listen: &str) -> Result<SocketAddr> {
    listen
        .trim()
        .parse()
        .with_context(|| format!("invalid prometheus listen address: {listen}"))
}

pub fn try_init_prometheus(listen: &str) -> Result<()> {
    EXPORTER
        .get_or_try_init(|| {
            let addr = parse_listen(listen)?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .set_buckets_for_metric(Matcher::Suffix("_ms".to_string()), LATENCY_BUCKETS_MS)
                .context("invalid histogram buckets")?
                .install()
                .context("failed to install prometheus exporter")?;
            PROMETHEUS_ENABLED.store(true, Ordering::Relaxed);
            info!(target: "monitoring", listen = %addr, "prometheus exporter 已启动");
            Ok(addr)
        })
        .map(|_| ())
}

pub fn prometheus_enabled() -> bool {
    PROMETHEUS_ENABLED.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_address_is_validated() {
        assert!(parse_listen(" 0.0.0.0:9898 ").is_ok());
        assert!(parse_listen("localhost").is_err());
    }
}
