use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::monitoring::events;
use crate::protocols::{
    BuildParams, ExitAction, PositionKeys, ProtocolAdapter, ProtocolError, ProtocolKind,
    RawPosition, TaskKind,
};

use super::error::{EngineError, EngineResult};
use super::priority::FeeEscalation;
use super::types::{DraftTransaction, ExitTask, PriorityVariant};

/// 单轮规划所需的参数。
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub owner: Pubkey,
    pub protocols: Vec<ProtocolKind>,
    pub fee_level_base: u64,
    pub escalation: FeeEscalation,
    pub compute_unit_ceiling: u32,
    pub slippage_bps: u16,
    pub withdraw_bps: u16,
    pub include_claims: bool,
    pub include_withdrawals: bool,
}

impl PlanSettings {
    pub fn build_params(
        &self,
        position: PositionKeys,
        action: ExitAction,
        fee_level: u64,
    ) -> BuildParams {
        BuildParams {
            owner: self.owner,
            position,
            action,
            fee_level,
            slippage_bps: self.slippage_bps,
            compute_unit_ceiling: self.compute_unit_ceiling,
        }
    }

    fn actions_for(&self, position: &PositionKeys) -> Vec<ExitAction> {
        let mut actions = Vec::with_capacity(2);
        if self.include_claims && position.available(TaskKind::Claim) {
            actions.push(ExitAction::Claim);
        }
        if self.include_withdrawals && position.available(TaskKind::Withdraw) {
            actions.push(ExitAction::Withdraw {
                fraction_bps: self.withdraw_bps,
            });
        }
        actions
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanExclusion {
    pub protocol: ProtocolKind,
    pub pool: Option<String>,
    pub kind: Option<TaskKind>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanOutcome {
    pub fee_levels: Vec<u64>,
    pub tasks: Vec<ExitTask>,
    pub excluded: Vec<PlanExclusion>,
    /// discovery 失败（按空结果处理）的协议。
    pub failed_protocols: Vec<ProtocolKind>,
}

struct Candidate {
    adapter: Arc<dyn ProtocolAdapter>,
    position: PositionKeys,
    action: ExitAction,
}

/// 发现持仓并为每个候选构建各档费率的草稿交易。
pub struct Planner {
    adapters: Vec<Arc<dyn ProtocolAdapter>>,
}

impl Planner {
    pub fn new(adapters: Vec<Arc<dyn ProtocolAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn adapter(&self, kind: ProtocolKind) -> Option<&Arc<dyn ProtocolAdapter>> {
        self.adapters.iter().find(|adapter| adapter.kind() == kind)
    }

    pub async fn plan(
        &self,
        settings: &PlanSettings,
        cancel: &CancellationToken,
    ) -> EngineResult<PlanOutcome> {
        let started = Instant::now();
        let mut outcome = PlanOutcome {
            fee_levels: settings.escalation.levels(settings.fee_level_base),
            ..PlanOutcome::default()
        };

        let adapters: Vec<Arc<dyn ProtocolAdapter>> = self
            .adapters
            .iter()
            .filter(|adapter| settings.protocols.contains(&adapter.kind()))
            .cloned()
            .collect();

        let discoveries = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            results = join_all(adapters.iter().map(|adapter| discover(adapter.as_ref(), &settings.owner))) => results,
        };

        let mut candidates = Vec::new();
        for (adapter, discovery) in adapters.iter().zip(discoveries) {
            let raws = match discovery {
                Ok(raws) => raws,
                Err(err) => {
                    events::discovery_failed(adapter.kind(), &err.describe());
                    outcome.failed_protocols.push(adapter.kind());
                    continue;
                }
            };
            for raw in &raws {
                self.collect_candidates(adapter, raw, settings, &mut candidates, &mut outcome);
            }
        }

        let builds = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            results = join_all(candidates.iter().map(|candidate| build_task(candidate, &outcome.fee_levels, settings))) => results,
        };

        let mut tasks = Vec::with_capacity(builds.len());
        for (candidate, build) in candidates.iter().zip(builds) {
            match build {
                Ok(task) => tasks.push(task),
                Err(err) => exclude(
                    &mut outcome,
                    candidate.position.protocol,
                    Some(&candidate.position.pool),
                    Some(candidate.action.kind()),
                    err.describe(),
                ),
            }
        }

        outcome.tasks = order_claims_first(tasks);
        events::plan_ready(
            outcome.tasks.len(),
            outcome.excluded.len(),
            started.elapsed(),
        );
        Ok(outcome)
    }

    /// 在同一费率上重新构建一份草稿，用于替换已过期的变体。
    pub async fn rebuild(
        &self,
        task: &ExitTask,
        fee_level: u64,
        settings: &PlanSettings,
    ) -> Result<DraftTransaction, ProtocolError> {
        let adapter = self
            .adapter(task.protocol)
            .ok_or(ProtocolError::BuilderUnavailable {
                protocol: task.protocol,
                reason: "协议未启用".to_string(),
            })?;
        let params = settings.build_params(task.position.clone(), task.action, fee_level);
        adapter.build(&params).await
    }

    fn collect_candidates(
        &self,
        adapter: &Arc<dyn ProtocolAdapter>,
        raw: &RawPosition,
        settings: &PlanSettings,
        candidates: &mut Vec<Candidate>,
        outcome: &mut PlanOutcome,
    ) {
        if raw.protocol != adapter.kind() {
            let err = ProtocolError::ForeignPosition {
                adapter: adapter.kind(),
                found: raw.protocol,
            };
            exclude(outcome, adapter.kind(), None, None, err.describe());
            return;
        }
        let position = match adapter.resolve(raw) {
            Ok(position) => position,
            Err(err) => {
                exclude(outcome, adapter.kind(), None, None, err.describe());
                return;
            }
        };

        if !position.available(TaskKind::Claim) && !position.available(TaskKind::Withdraw) {
            let err = ProtocolError::ZeroBalance {
                kind: TaskKind::Withdraw,
            };
            exclude(
                outcome,
                position.protocol,
                Some(&position.pool),
                None,
                err.describe(),
            );
            return;
        }

        let actions = settings.actions_for(&position);
        if actions.is_empty() {
            debug!(
                target: "engine::planner",
                protocol = %position.protocol,
                pool = %position.pool,
                "按配置跳过该仓位"
            );
            return;
        }
        for action in actions {
            candidates.push(Candidate {
                adapter: adapter.clone(),
                position: position.clone(),
                action,
            });
        }
    }
}

async fn discover(
    adapter: &dyn ProtocolAdapter,
    owner: &Pubkey,
) -> Result<Vec<RawPosition>, ProtocolError> {
    let started = Instant::now();
    let raws = adapter.discover(owner).await?;
    events::discovery_finished(adapter.kind(), raws.len(), started.elapsed());
    Ok(raws)
}

/// 首档构建失败即排除候选；更高档失败时保留已构建的变体。
async fn build_task(
    candidate: &Candidate,
    levels: &[u64],
    settings: &PlanSettings,
) -> Result<ExitTask, ProtocolError> {
    let position = &candidate.position;
    let Some((&primary_level, higher)) = levels.split_first() else {
        return Err(ProtocolError::InvalidTransaction("费率梯度为空".to_string()));
    };

    let primary = candidate
        .adapter
        .build(&settings.build_params(position.clone(), candidate.action, primary_level))
        .await?;
    check_draft(position, primary_level, settings.compute_unit_ceiling, &primary);

    let mut variants = vec![PriorityVariant {
        fee_level: primary_level,
        draft: primary.clone(),
    }];
    for &level in higher {
        let params = settings.build_params(position.clone(), candidate.action, level);
        match candidate.adapter.build(&params).await {
            Ok(draft) => {
                check_draft(position, level, settings.compute_unit_ceiling, &draft);
                variants.push(PriorityVariant {
                    fee_level: level,
                    draft,
                });
            }
            Err(err) => {
                warn!(
                    target: "engine::planner",
                    protocol = %position.protocol,
                    pool = %position.pool,
                    action = %candidate.action.kind(),
                    fee_level = level,
                    kept = variants.len(),
                    error = %err.describe(),
                    "高档费率草稿构建失败，保留已有变体"
                );
                break;
            }
        }
    }

    Ok(ExitTask {
        protocol: position.protocol,
        kind: candidate.action.kind(),
        pool: position.pool,
        secondary: position.secondary,
        action: candidate.action,
        position: position.clone(),
        primary_fee_level: primary_level,
        primary,
        variants,
    })
}

fn check_draft(position: &PositionKeys, requested: u64, ceiling: u32, draft: &DraftTransaction) {
    if let Some(limit) = draft.compute_unit_limit().filter(|limit| *limit > ceiling) {
        warn!(
            target: "engine::planner",
            protocol = %position.protocol,
            pool = %position.pool,
            limit,
            ceiling,
            "草稿的 compute unit 上限超过配置"
        );
    }

    match draft.compute_unit_price() {
        Some(embedded) if embedded != requested => {
            events::fee_level_mismatch(position.protocol, &position.pool, requested, embedded);
        }
        Some(_) => {}
        None => debug!(
            target: "engine::planner",
            protocol = %position.protocol,
            pool = %position.pool,
            requested,
            "草稿未包含 compute unit price 指令"
        ),
    }
}

fn exclude(
    outcome: &mut PlanOutcome,
    protocol: ProtocolKind,
    pool: Option<&Pubkey>,
    kind: Option<TaskKind>,
    reason: String,
) {
    events::candidate_excluded(protocol, pool, kind, &reason);
    outcome.excluded.push(PlanExclusion {
        protocol,
        pool: pool.map(ToString::to_string),
        kind,
        reason,
    });
}

/// 池子按首次出现的顺序排列，同一池子内 claim 先于 withdraw，其余顺序不变。
pub fn order_claims_first(tasks: Vec<ExitTask>) -> Vec<ExitTask> {
    let mut slots: HashMap<(ProtocolKind, Pubkey), usize> = HashMap::new();
    let mut groups: Vec<(Vec<ExitTask>, Vec<ExitTask>)> = Vec::new();
    for task in tasks {
        let slot = *slots.entry(task.pool_key()).or_insert_with(|| {
            groups.push((Vec::new(), Vec::new()));
            groups.len() - 1
        });
        let (claims, withdraws) = &mut groups[slot];
        match task.kind {
            TaskKind::Claim => claims.push(task),
            TaskKind::Withdraw => withdraws.push(task),
        }
    }
    groups
        .into_iter()
        .flat_map(|(claims, withdraws)| claims.into_iter().chain(withdraws))
        .collect()
}
