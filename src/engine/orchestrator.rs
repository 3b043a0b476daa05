use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ExitSettings;
use crate::lander::{LanderError, LedgerClient};
use crate::monitoring::events;
use crate::protocols::ProtocolKind;

use super::error::{EngineError, EngineResult};
use super::fallback::first_success;
use super::planner::{PlanOutcome, PlanSettings, Planner};
use super::priority::FeeEscalation;
use super::signer_guard::SignerGuard;
use super::signing::{SigningAdapter, WalletSigner};
use super::state::{ExitItem, ExitStatus, OrchestratorState};
use super::types::{DraftTransaction, ExitTask, PriorityVariant};

const CANCELLED: &str = "cancelled";

/// 单次运行的参数，CLI 参数覆盖配置后传入。
#[derive(Debug, Clone)]
pub struct ExitOptions {
    pub fee_level_base: u64,
    pub compute_unit_ceiling: u32,
    pub protocols_enabled: Vec<ProtocolKind>,
    pub slippage_bps: u16,
    pub withdraw_bps: u16,
    pub include_claims: bool,
    pub include_withdrawals: bool,
    pub dry_run: bool,
}

impl ExitOptions {
    pub fn from_settings(settings: &ExitSettings, protocols_enabled: Vec<ProtocolKind>) -> Self {
        Self {
            fee_level_base: settings.fee_level_base,
            compute_unit_ceiling: settings.compute_unit_ceiling,
            protocols_enabled,
            slippage_bps: settings.slippage_bps,
            withdraw_bps: settings.withdraw_bps,
            include_claims: settings.include_claims,
            include_withdrawals: settings.include_withdrawals,
            dry_run: settings.dry_run,
        }
    }

    /// CLI 覆盖后的参数可能越界，运行前再校验一次。
    pub fn validate(&self) -> EngineResult<()> {
        if self.protocols_enabled.is_empty() {
            return Err(EngineError::InvalidConfig("没有启用任何协议".to_string()));
        }
        if self.slippage_bps > 10_000 {
            return Err(EngineError::InvalidConfig(format!(
                "slippage_bps {} 超过 10000",
                self.slippage_bps
            )));
        }
        if self.withdraw_bps == 0 || self.withdraw_bps > 10_000 {
            return Err(EngineError::InvalidConfig(format!(
                "withdraw_bps {} 不在 1..=10000 范围内",
                self.withdraw_bps
            )));
        }
        if !self.include_claims && !self.include_withdrawals {
            return Err(EngineError::InvalidConfig(
                "claim 与 withdraw 均被关闭".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub escalation: FeeEscalation,
    pub refresh_expired_drafts: bool,
    pub simulate_before_send: bool,
}

impl OrchestratorSettings {
    pub fn from_settings(settings: &ExitSettings) -> Self {
        Self {
            escalation: FeeEscalation::from_settings(settings),
            refresh_expired_drafts: settings.refresh_expired_drafts,
            simulate_before_send: settings.simulate_before_send,
        }
    }
}

/// 退出流程编排器：规划 → 签名者校验 → 批量签名 → 逐条发送确认。
///
/// 同一时间只允许一轮运行；运行状态通过 watch 通道发布，
/// `abort` 触发协作式取消，已经发出的交易会等到确认结束。
pub struct ExitOrchestrator {
    owner: Pubkey,
    planner: Planner,
    signing: SigningAdapter,
    ledger: Arc<dyn LedgerClient>,
    guard: SignerGuard,
    settings: OrchestratorSettings,
    state: watch::Sender<OrchestratorState>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ExitOrchestrator {
    pub fn new(
        planner: Planner,
        signer: Arc<dyn WalletSigner>,
        ledger: Arc<dyn LedgerClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        let owner = signer.pubkey();
        Self {
            owner,
            planner,
            signing: SigningAdapter::new(signer),
            ledger,
            guard: SignerGuard::owner_only(owner),
            settings,
            state: watch::Sender::new(OrchestratorState::default()),
            cancel: Mutex::new(None),
        }
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    /// 请求取消当前运行；没有运行时返回 false。
    pub fn abort(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                info!(target: "engine::orchestrator", "收到取消请求");
                true
            }
            None => false,
        }
    }

    /// 只做发现与构建，不签名也不占用运行状态。
    pub async fn plan(&self, options: &ExitOptions) -> EngineResult<PlanOutcome> {
        options.validate()?;
        self.planner
            .plan(&self.plan_settings(options), &CancellationToken::new())
            .await
    }

    pub async fn run(&self, options: ExitOptions) -> EngineResult<OrchestratorState> {
        options.validate()?;
        let started = Instant::now();
        let cancel = self.begin()?;
        let _reset = ResetOnDrop { orchestrator: self };

        match self.execute(&options, &cancel).await {
            Ok(()) | Err(EngineError::Cancelled) => {
                self.finish(None, cancel.is_cancelled());
                let snapshot = self.snapshot();
                events::run_finished(&snapshot.summary(), snapshot.cancelled, started.elapsed());
                Ok(snapshot)
            }
            Err(err) => {
                let reason = err.describe();
                events::run_aborted(&reason);
                self.finish(Some(reason), cancel.is_cancelled());
                Err(err)
            }
        }
    }

    fn plan_settings(&self, options: &ExitOptions) -> PlanSettings {
        PlanSettings {
            owner: self.owner,
            protocols: options.protocols_enabled.clone(),
            fee_level_base: options.fee_level_base,
            escalation: self.settings.escalation,
            compute_unit_ceiling: options.compute_unit_ceiling,
            slippage_bps: options.slippage_bps,
            withdraw_bps: options.withdraw_bps,
            include_claims: options.include_claims,
            include_withdrawals: options.include_withdrawals,
        }
    }

    fn begin(&self) -> EngineResult<CancellationToken> {
        let mut accepted = false;
        self.state.send_if_modified(|state| {
            if state.is_active() {
                return false;
            }
            *state = OrchestratorState {
                planning: true,
                started_at: Some(OffsetDateTime::now_utc()),
                ..OrchestratorState::default()
            };
            accepted = true;
            true
        });
        if !accepted {
            return Err(EngineError::RunInProgress);
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        Ok(token)
    }

    fn finish(&self, error: Option<String>, cancelled: bool) {
        self.state.send_modify(|state| {
            if cancelled {
                for item in state.items.iter_mut() {
                    item.skip(CANCELLED);
                }
            }
            state.planning = false;
            state.running = false;
            state.current_index = None;
            state.finished_at = Some(OffsetDateTime::now_utc());
            state.error = error;
            state.cancelled = cancelled;
        });
        *self.cancel.lock() = None;
    }

    fn update_item(&self, index: usize, update: impl FnOnce(&mut ExitItem)) {
        self.state.send_modify(|state| {
            if let Some(item) = state.items.get_mut(index) {
                update(item);
            }
        });
    }

    async fn execute(&self, options: &ExitOptions, cancel: &CancellationToken) -> EngineResult<()> {
        let plan = self.plan_settings(options);
        let tasks = self.planner.plan(&plan, cancel).await?.tasks;

        self.state.send_modify(|state| {
            state.items = tasks.iter().cloned().map(ExitItem::pending).collect();
            state.planning = false;
            state.running = true;
        });
        if tasks.is_empty() {
            info!(target: "engine::orchestrator", "没有可退出的仓位");
            return Ok(());
        }

        self.guard.check_all(&tasks)?;

        let mut signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            signed = self.sign_primaries(&tasks) => signed,
        };

        if options.dry_run {
            self.simulate_all(&tasks, &signed, cancel).await;
            return Ok(());
        }

        for (index, task) in tasks.iter().enumerate() {
            let Some(primary) = signed[index].take() else {
                continue;
            };
            if cancel.is_cancelled() {
                break;
            }
            self.state.send_modify(|state| state.current_index = Some(index));
            self.submit_item(index, task, &primary, &plan, cancel).await;
        }
        Ok(())
    }

    async fn sign_primaries(&self, tasks: &[ExitTask]) -> Vec<Option<VersionedTransaction>> {
        let primaries: Vec<VersionedTransaction> = tasks
            .iter()
            .map(|task| task.primary.transaction.clone())
            .collect();
        let outcome = self.signing.sign_batch(&primaries).await;
        events::signing_finished(outcome.path, primaries.len(), outcome.failed());

        let mut signed = Vec::with_capacity(tasks.len());
        for (index, (transaction, error)) in outcome
            .transactions
            .into_iter()
            .zip(outcome.errors)
            .enumerate()
        {
            match error {
                None => {
                    self.update_item(index, |item| {
                        item.advance(ExitStatus::Signed);
                    });
                    signed.push(Some(transaction));
                }
                Some(err) => {
                    let message = err.to_string();
                    events::item_failed(index, &tasks[index], &message);
                    self.update_item(index, |item| {
                        item.fail(message);
                    });
                    signed.push(None);
                }
            }
        }
        signed
    }

    async fn simulate_all(
        &self,
        tasks: &[ExitTask],
        signed: &[Option<VersionedTransaction>],
        cancel: &CancellationToken,
    ) {
        for (index, transaction) in signed.iter().enumerate() {
            let Some(transaction) = transaction else {
                continue;
            };
            if cancel.is_cancelled() {
                break;
            }
            self.state.send_modify(|state| state.current_index = Some(index));
            match self.ledger.simulate(transaction).await {
                Ok(()) => self.update_item(index, |item| {
                    item.skip("dry-run: 模拟通过，未发送");
                }),
                Err(err) => {
                    let message = err.to_string();
                    events::item_failed(index, &tasks[index], &message);
                    self.update_item(index, |item| {
                        item.fail(message);
                    });
                }
            }
        }
    }

    async fn submit_item(
        &self,
        index: usize,
        task: &ExitTask,
        primary: &VersionedTransaction,
        plan: &PlanSettings,
        cancel: &CancellationToken,
    ) {
        let started = Instant::now();
        let result = first_success(task.attempts(), Some(cancel), |attempt, variant| async move {
            let fee_level = variant.fee_level;
            self.update_item(index, |item| item.attempts += 1);
            match self
                .send_variant(index, task, attempt, variant, primary, plan, cancel)
                .await
            {
                Ok(signature) => Ok((signature, fee_level)),
                Err(err) => {
                    events::variant_failed(index, task, attempt, fee_level, &err.describe());
                    Err(err)
                }
            }
        })
        .await;

        match result {
            Ok(success) => {
                let (signature, fee_level) = success.value;
                let signature = signature.to_string();
                events::item_confirmed(
                    index,
                    task,
                    &signature,
                    fee_level,
                    success.index,
                    success.failures,
                    started.elapsed(),
                );
                self.update_item(index, |item| {
                    item.submission_id = Some(signature);
                    item.fee_level = Some(fee_level);
                    item.advance(ExitStatus::Confirmed);
                });
            }
            // 取消后仍保留已发生的真实失败，其余由 finish 统一标记为 skipped。
            Err(exhausted)
                if exhausted.cancelled
                    || matches!(exhausted.last(), Some(EngineError::Cancelled)) =>
            {
                let failure = exhausted
                    .errors
                    .iter()
                    .rev()
                    .find(|err| !matches!(err, EngineError::Cancelled));
                if let Some(err) = failure {
                    let message = err.describe();
                    events::item_failed(index, task, &message);
                    self.update_item(index, |item| {
                        item.fail(message);
                    });
                }
            }
            Err(exhausted) => {
                let message = exhausted
                    .last()
                    .map(EngineError::describe)
                    .unwrap_or_else(|| "没有可发送的草稿".to_string());
                events::item_failed(index, task, &message);
                self.update_item(index, |item| {
                    item.fail(message);
                });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_variant(
        &self,
        index: usize,
        task: &ExitTask,
        attempt: usize,
        variant: PriorityVariant,
        primary: &VersionedTransaction,
        plan: &PlanSettings,
        cancel: &CancellationToken,
    ) -> EngineResult<Signature> {
        let fee_level = variant.fee_level;
        let draft = self.fresh_draft(index, task, variant, plan, cancel).await?;

        let transaction = if draft.same_message(primary) {
            primary.clone()
        } else {
            self.signing.sign_single(&draft.transaction).await?
        };

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.settings.simulate_before_send {
            self.ledger.simulate(&transaction).await?;
        }

        events::variant_attempt(index, task, attempt, fee_level);
        let signature = self.ledger.submit(&transaction).await?;
        let submission_id = signature.to_string();
        self.update_item(index, |item| {
            item.advance(ExitStatus::Sent);
            item.submission_id = Some(submission_id);
            item.fee_level = Some(fee_level);
        });

        self.ledger.confirm(&signature, draft.expiry_height).await?;
        Ok(signature)
    }

    /// 变体已过期时按同一费率重建一次，并重新校验签名者。
    async fn fresh_draft(
        &self,
        index: usize,
        task: &ExitTask,
        variant: PriorityVariant,
        plan: &PlanSettings,
        cancel: &CancellationToken,
    ) -> EngineResult<DraftTransaction> {
        let height = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            height = self.ledger.block_height() => height?,
        };
        if height <= variant.expiry_height() {
            return Ok(variant.draft);
        }
        if !self.settings.refresh_expired_drafts {
            return Err(LanderError::Expired {
                height,
                expiry_height: variant.expiry_height(),
            }
            .into());
        }

        debug!(
            target: "engine::orchestrator",
            index,
            protocol = %task.protocol,
            pool = %task.pool,
            fee_level = variant.fee_level,
            height,
            expiry_height = variant.expiry_height(),
            "草稿已过期，重新构建"
        );
        let draft = self.planner.rebuild(task, variant.fee_level, plan).await?;
        self.guard.check(index, task, &draft)?;
        if height > draft.expiry_height {
            return Err(LanderError::Expired {
                height,
                expiry_height: draft.expiry_height,
            }
            .into());
        }
        Ok(draft)
    }
}

/// 运行 future 被提前丢弃时复位状态，避免后续运行一直被拒绝。
struct ResetOnDrop<'a> {
    orchestrator: &'a ExitOrchestrator,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.orchestrator.state.borrow().is_active() {
            self.orchestrator
                .finish(Some("运行被中断".to_string()), true);
        }
    }
}
