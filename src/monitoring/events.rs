use std::time::Duration;

use metrics::{counter, gauge, histogram};
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::engine::{ExitTask, RunSummary, SigningPath};
use crate::protocols::{ProtocolKind, TaskKind};

use super::metrics::prometheus_enabled;

pub fn discovery_finished(protocol: ProtocolKind, positions: usize, elapsed: Duration) {
    info!(
        target: "monitoring::discovery",
        event = "finished",
        protocol = %protocol,
        positions,
        elapsed_ms = elapsed.as_millis() as u64,
        "持仓发现完成"
    );
    if prometheus_enabled() {
        counter!(
            "lp_exit_discovery_total",
            "protocol" => protocol.as_str(),
            "result" => "ok"
        )
        .increment(1);
        histogram!("lp_exit_discovery_positions", "protocol" => protocol.as_str())
            .record(positions as f64);
    }
}

pub fn discovery_failed(protocol: ProtocolKind, error: &str) {
    warn!(
        target: "monitoring::discovery",
        event = "failed",
        protocol = %protocol,
        error,
        "持仓发现失败，按空结果处理"
    );
    if prometheus_enabled() {
        counter!(
            "lp_exit_discovery_total",
            "protocol" => protocol.as_str(),
            "result" => "error"
        )
        .increment(1);
    }
}

pub fn candidate_excluded(
    protocol: ProtocolKind,
    pool: Option<&Pubkey>,
    kind: Option<TaskKind>,
    reason: &str,
) {
    warn!(
        target: "monitoring::planner",
        event = "excluded",
        protocol = %protocol,
        pool = pool.map(ToString::to_string).unwrap_or_default(),
        kind = kind.map(TaskKind::as_str).unwrap_or("-"),
        reason,
        "候选仓位被排除"
    );
    if prometheus_enabled() {
        counter!("lp_exit_plan_excluded_total", "protocol" => protocol.as_str()).increment(1);
    }
}

pub fn fee_level_mismatch(protocol: ProtocolKind, pool: &Pubkey, requested: u64, embedded: u64) {
    warn!(
        target: "monitoring::planner",
        event = "fee_mismatch",
        protocol = %protocol,
        pool = %pool,
        requested,
        embedded,
        "草稿内嵌费率与请求不一致"
    );
}

pub fn plan_ready(items: usize, excluded: usize, elapsed: Duration) {
    info!(
        target: "monitoring::planner",
        event = "ready",
        items,
        excluded,
        elapsed_ms = elapsed.as_millis() as u64,
        "退出计划已生成"
    );
    if prometheus_enabled() {
        gauge!("lp_exit_plan_items").set(items as f64);
        histogram!("lp_exit_plan_latency_ms").record(elapsed.as_secs_f64() * 1_000.0);
    }
}

pub fn signing_finished(path: SigningPath, total: usize, failed: usize) {
    let path_label = match path {
        SigningPath::Bulk => "bulk",
        SigningPath::Sequential => "sequential",
    };
    info!(
        target: "monitoring::signing",
        event = "batch",
        path = path_label,
        total,
        failed,
        "批量签名阶段结束"
    );
    if prometheus_enabled() {
        counter!("lp_exit_signing_batches_total", "path" => path_label).increment(1);
        counter!("lp_exit_signing_failures_total").increment(failed as u64);
    }
}

pub fn variant_attempt(index: usize, task: &ExitTask, attempt: usize, fee_level: u64) {
    info!(
        target: "monitoring::submit",
        event = "attempt",
        index,
        protocol = %task.protocol,
        pool = %task.pool,
        kind = %task.kind,
        attempt,
        fee_level,
        "发送退出交易"
    );
    if prometheus_enabled() {
        counter!(
            "lp_exit_submit_attempts_total",
            "protocol" => task.protocol.as_str(),
            "kind" => task.kind.as_str()
        )
        .increment(1);
    }
}

pub fn variant_failed(index: usize, task: &ExitTask, attempt: usize, fee_level: u64, error: &str) {
    warn!(
        target: "monitoring::submit",
        event = "attempt_failed",
        index,
        protocol = %task.protocol,
        pool = %task.pool,
        kind = %task.kind,
        attempt,
        fee_level,
        error,
        "本档费率发送失败"
    );
}

pub fn item_confirmed(
    index: usize,
    task: &ExitTask,
    signature: &str,
    fee_level: u64,
    variant: usize,
    failed_variants: usize,
    elapsed: Duration,
) {
    info!(
        target: "monitoring::submit",
        event = "confirmed",
        index,
        protocol = %task.protocol,
        pool = %task.pool,
        kind = %task.kind,
        signature,
        fee_level,
        variant,
        failed_variants,
        elapsed_ms = elapsed.as_millis() as u64,
        "退出交易已确认"
    );
    if prometheus_enabled() {
        counter!(
            "lp_exit_items_total",
            "protocol" => task.protocol.as_str(),
            "kind" => task.kind.as_str(),
            "status" => "confirmed"
        )
        .increment(1);
        histogram!("lp_exit_confirm_latency_ms", "protocol" => task.protocol.as_str())
            .record(elapsed.as_secs_f64() * 1_000.0);
        histogram!("lp_exit_confirmed_fee_level", "protocol" => task.protocol.as_str())
            .record(fee_level as f64);
        histogram!("lp_exit_confirmed_variant", "protocol" => task.protocol.as_str())
            .record(variant as f64);
    }
}

pub fn item_failed(index: usize, task: &ExitTask, error: &str) {
    warn!(
        target: "monitoring::submit",
        event = "failed",
        index,
        protocol = %task.protocol,
        pool = %task.pool,
        kind = %task.kind,
        error,
        "退出条目失败"
    );
    if prometheus_enabled() {
        counter!(
            "lp_exit_items_total",
            "protocol" => task.protocol.as_str(),
            "kind" => task.kind.as_str(),
            "status" => "error"
        )
        .increment(1);
    }
}

pub fn run_aborted(error: &str) {
    warn!(
        target: "monitoring::run",
        event = "aborted",
        error,
        "退出流程被中止"
    );
    if prometheus_enabled() {
        counter!("lp_exit_runs_total", "result" => "aborted").increment(1);
    }
}

pub fn run_finished(summary: &RunSummary, cancelled: bool, elapsed: Duration) {
    info!(
        target: "monitoring::run",
        event = "finished",
        total = summary.total,
        confirmed = summary.confirmed,
        failed = summary.failed,
        skipped = summary.skipped,
        cancelled,
        elapsed_ms = elapsed.as_millis() as u64,
        "退出流程结束"
    );
    if prometheus_enabled() {
        let result = if cancelled { "cancelled" } else { "finished" };
        counter!("lp_exit_runs_total", "result" => result).increment(1);
        histogram!("lp_exit_run_duration_ms").record(elapsed.as_secs_f64() * 1_000.0);
    }
}
