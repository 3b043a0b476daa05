//! 测试用的协议适配器与链上客户端替身。

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tokio::sync::Notify;
use tracing_subscriber::fmt::MakeWriter;

use crate::api::ApiError;
use crate::lander::{LanderError, LedgerClient};
use crate::protocols::clmm::resolve_clmm;
use crate::protocols::fee_vault::resolve_fee_vault;
use crate::protocols::{
    BuildParams, ExitAction, PositionKeys, ProtocolAdapter, ProtocolError, ProtocolKind,
    RawPosition, TaskKind,
};

use super::types::fixtures::tagged_draft;
use super::types::{DraftTransaction, ExitTask, PriorityVariant};

pub const DEFAULT_EXPIRY: u64 = 10_000;

/// 收集当前线程的日志输出，用于断言告警确实被记录。
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("logs")).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("logs").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn fee_vault_position(pool: Pubkey, fees: u64, lp_amount: u64) -> Value {
    json!({
        "pool": pool.to_string(),
        "feeVault": Pubkey::new_unique().to_string(),
        "unclaimedFeeA": fees.to_string(),
        "unclaimedFeeB": 0,
        "lpAmount": lp_amount.to_string()
    })
}

pub fn clmm_position(pool: Pubkey, fees: u64, liquidity: u64) -> Value {
    json!({
        "poolId": pool.to_string(),
        "position": Pubkey::new_unique().to_string(),
        "tokenFeesOwedA": fees,
        "tokenFeesOwedB": 0,
        "liquidity": liquidity.to_string()
    })
}

/// 直接构造一个只有主草稿的任务。
pub fn task(owner: Pubkey, protocol: ProtocolKind, pool: Pubkey, kind: TaskKind) -> ExitTask {
    let action = match kind {
        TaskKind::Claim => ExitAction::Claim,
        TaskKind::Withdraw => ExitAction::Withdraw {
            fraction_bps: 10_000,
        },
    };
    let primary = tagged_draft(&[owner], 1_000, DEFAULT_EXPIRY, Some(pool));
    ExitTask {
        protocol,
        kind,
        pool,
        secondary: Pubkey::new_unique(),
        action,
        position: PositionKeys {
            protocol,
            pool,
            secondary: Pubkey::new_unique(),
            fees_owed: 1,
            liquidity: 1,
            build_keys: Default::default(),
        },
        primary_fee_level: 1_000,
        primary: primary.clone(),
        variants: vec![PriorityVariant {
            fee_level: 1_000,
            draft: primary,
        }],
    }
}

/// 可编排的协议适配器：discovery 返回固定持仓，build 生成带池子标记的草稿。
pub struct FakeAdapter {
    kind: ProtocolKind,
    /// discovery 结果上标注的协议，默认与 `kind` 相同。
    label: ProtocolKind,
    owner: Pubkey,
    positions: Vec<Value>,
    discovery_fails: bool,
    /// (池子, 费率)：费率为 `None` 时该池子所有档位都失败。
    failing_builds: Vec<(Pubkey, Option<u64>)>,
    foreign_signer_pools: Vec<(Pubkey, Pubkey)>,
    expiry_heights: Mutex<VecDeque<u64>>,
    builds: AtomicUsize,
}

impl FakeAdapter {
    pub fn fee_vault(owner: Pubkey, positions: Vec<Value>) -> Self {
        Self::new(ProtocolKind::FeeVault, owner, positions)
    }

    pub fn clmm(owner: Pubkey, positions: Vec<Value>) -> Self {
        Self::new(ProtocolKind::Clmm, owner, positions)
    }

    fn new(kind: ProtocolKind, owner: Pubkey, positions: Vec<Value>) -> Self {
        Self {
            kind,
            label: kind,
            owner,
            positions,
            discovery_fails: false,
            failing_builds: Vec::new(),
            foreign_signer_pools: Vec::new(),
            expiry_heights: Mutex::new(VecDeque::new()),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn labelled_as(mut self, label: ProtocolKind) -> Self {
        self.label = label;
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.discovery_fails = true;
        self
    }

    pub fn failing_build(mut self, pool: Pubkey, fee_level: Option<u64>) -> Self {
        self.failing_builds.push((pool, fee_level));
        self
    }

    /// 该池子的草稿额外要求 `signer` 签名。
    pub fn foreign_signer(mut self, pool: Pubkey, signer: Pubkey) -> Self {
        self.foreign_signer_pools.push((pool, signer));
        self
    }

    /// 依次作为后续构建的过期高度，用完后回到默认值。
    pub fn expiry_heights(self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.expiry_heights
            .lock()
            .expect("expiry")
            .extend(heights);
        self
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolAdapter for FakeAdapter {
    fn kind(&self) -> ProtocolKind {
        self.kind
    }

    async fn discover(&self, _owner: &Pubkey) -> Result<Vec<RawPosition>, ProtocolError> {
        if self.discovery_fails {
            return Err(ProtocolError::Discovery {
                protocol: self.kind,
                source: ApiError::Schema("连接被重置".to_string()),
            });
        }
        Ok(self
            .positions
            .iter()
            .cloned()
            .map(|value| RawPosition {
                protocol: self.label,
                value,
            })
            .collect())
    }

    fn resolve(&self, raw: &RawPosition) -> Result<PositionKeys, ProtocolError> {
        match self.kind {
            ProtocolKind::FeeVault => resolve_fee_vault(raw),
            ProtocolKind::Clmm => resolve_clmm(raw),
        }
    }

    async fn build(&self, params: &BuildParams) -> Result<DraftTransaction, ProtocolError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let pool = params.position.pool;
        let rejected = self.failing_builds.iter().any(|(failing, level)| {
            *failing == pool && level.is_none_or(|level| level == params.fee_level)
        });
        if rejected {
            return Err(ProtocolError::Build {
                protocol: self.kind,
                source: ApiError::Rejected {
                    code: "POOL_PAUSED".to_string(),
                    message: "pool is paused".to_string(),
                },
            });
        }

        let mut signers = vec![self.owner];
        signers.extend(
            self.foreign_signer_pools
                .iter()
                .filter(|(foreign, _)| *foreign == pool)
                .map(|(_, signer)| *signer),
        );
        let expiry = self
            .expiry_heights
            .lock()
            .expect("expiry")
            .pop_front()
            .unwrap_or(DEFAULT_EXPIRY);
        Ok(tagged_draft(&signers, params.fee_level, expiry, Some(pool)))
    }
}

/// 内存中的链上客户端：按池子标记或费率决定发送结果。
#[derive(Default)]
pub struct FakeLedger {
    height: AtomicU64,
    pub reject_accounts: Mutex<HashSet<Pubkey>>,
    pub reject_fee_levels: Mutex<HashSet<u64>>,
    pub simulation_rejects: Mutex<HashSet<Pubkey>>,
    submitted: Mutex<Vec<VersionedTransaction>>,
    simulated: AtomicUsize,
    /// 设置后，首次确认会等待放行。
    confirm_gate: Mutex<Option<Arc<Notify>>>,
    expire_confirmations: AtomicBool,
}

impl FakeLedger {
    pub fn new(height: u64) -> Self {
        let ledger = Self::default();
        ledger.height.store(height, Ordering::SeqCst);
        ledger
    }

    pub fn reject_account(&self, account: Pubkey) {
        self.reject_accounts.lock().expect("reject").insert(account);
    }

    pub fn reject_fee_level(&self, fee_level: u64) {
        self.reject_fee_levels.lock().expect("reject").insert(fee_level);
    }

    pub fn reject_simulation(&self, account: Pubkey) {
        self.simulation_rejects
            .lock()
            .expect("reject")
            .insert(account);
    }

    pub fn gate_first_confirmation(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.confirm_gate.lock().expect("gate") = Some(gate.clone());
        gate
    }

    /// 之后的确认都以区块高度越过有效期失败。
    pub fn expire_confirmations(&self) {
        self.expire_confirmations.store(true, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<VersionedTransaction> {
        self.submitted.lock().expect("submitted").clone()
    }

    pub fn simulated(&self) -> usize {
        self.simulated.load(Ordering::SeqCst)
    }

    fn touches(set: &Mutex<HashSet<Pubkey>>, transaction: &VersionedTransaction) -> bool {
        let set = set.lock().expect("set");
        transaction
            .message
            .static_account_keys()
            .iter()
            .any(|key| set.contains(key))
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn block_height(&self) -> Result<u64, LanderError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<(), LanderError> {
        self.simulated.fetch_add(1, Ordering::SeqCst);
        if Self::touches(&self.simulation_rejects, transaction) {
            return Err(LanderError::Simulation {
                message: "InstructionError(1, Custom(6001))".to_string(),
                logs: vec!["Program log: slippage exceeded".to_string()],
            });
        }
        Ok(())
    }

    async fn submit(&self, transaction: &VersionedTransaction) -> Result<Signature, LanderError> {
        let signature = transaction.signatures[0];
        if signature == Signature::default() {
            return Err(LanderError::OnChain("交易未签名".to_string()));
        }
        self.submitted
            .lock()
            .expect("submitted")
            .push(transaction.clone());
        if Self::touches(&self.reject_accounts, transaction) {
            return Err(LanderError::OnChain("BlockhashNotFound".to_string()));
        }
        let price = DraftTransaction::new(transaction.clone(), 0).compute_unit_price();
        if price.is_some_and(|price| self.reject_fee_levels.lock().expect("reject").contains(&price)) {
            return Err(LanderError::OnChain("fee too low".to_string()));
        }
        Ok(signature)
    }

    async fn confirm(&self, _signature: &Signature, expiry_height: u64) -> Result<(), LanderError> {
        let gate = self.confirm_gate.lock().expect("gate").take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.expire_confirmations.load(Ordering::SeqCst) {
            return Err(LanderError::Expired {
                height: expiry_height + 1,
                expiry_height,
            });
        }
        Ok(())
    }

    async fn balance(&self, _owner: &Pubkey) -> Result<u64, LanderError> {
        Ok(1_000_000_000)
    }
}
