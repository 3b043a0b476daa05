use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;
use tracing::{debug, warn};

use super::fallback::first_success;

#[derive(Debug, Clone, Error)]
pub enum SignerError {
    #[error("签名器不支持批量签名")]
    Unsupported,
    #[error("签名被拒绝: {0}")]
    Rejected(String),
    #[error("签名失败: {0}")]
    Failed(String),
    #[error("批量签名返回 {actual} 笔，期望 {expected} 笔")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("签名器返回的第 {0} 笔交易内容被改动")]
    MessageChanged(usize),
}

/// 钱包签名能力。批量签名可选，单笔签名必须实现。
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn supports_sign_all(&self) -> bool {
        false
    }

    async fn sign_all(
        &self,
        _transactions: &[VersionedTransaction],
    ) -> Result<Vec<VersionedTransaction>, SignerError> {
        Err(SignerError::Unsupported)
    }

    async fn sign_one(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<VersionedTransaction, SignerError>;
}

/// 本地密钥签名器，只填充自身的签名槽位。
pub struct KeypairSigner {
    keypair: Arc<Keypair>,
}

impl KeypairSigner {
    pub fn new(keypair: Arc<Keypair>) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn supports_sign_all(&self) -> bool {
        true
    }

    async fn sign_all(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<Vec<VersionedTransaction>, SignerError> {
        transactions
            .iter()
            .map(|tx| partial_sign(&self.keypair, tx))
            .collect()
    }

    async fn sign_one(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<VersionedTransaction, SignerError> {
        partial_sign(&self.keypair, transaction)
    }
}

fn partial_sign(
    keypair: &Keypair,
    transaction: &VersionedTransaction,
) -> Result<VersionedTransaction, SignerError> {
    let required = usize::from(transaction.message.header().num_required_signatures);
    let pubkey = keypair.pubkey();
    let position = transaction
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == pubkey)
        .ok_or_else(|| SignerError::Rejected(format!("{pubkey} 不是该交易的必需签名者")))?;

    let signature = keypair
        .try_sign_message(&transaction.message.serialize())
        .map_err(|err| SignerError::Failed(err.to_string()))?;

    let mut signed = transaction.clone();
    if signed.signatures.len() < required {
        signed.signatures.resize(required, Signature::default());
    }
    signed.signatures[position] = signature;
    Ok(signed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningPath {
    Bulk,
    Sequential,
}

#[derive(Debug)]
pub struct SigningOutcome {
    /// 与输入等长同序；失败槽位保留原始草稿。
    pub transactions: Vec<VersionedTransaction>,
    pub errors: Vec<Option<SignerError>>,
    pub path: SigningPath,
}

impl SigningOutcome {
    pub fn failed(&self) -> usize {
        self.errors.iter().filter(|err| err.is_some()).count()
    }
}

/// 优先批量签名，不可用或结果异常时退回逐笔签名。
#[derive(Clone)]
pub struct SigningAdapter {
    signer: Arc<dyn WalletSigner>,
}

impl SigningAdapter {
    pub fn new(signer: Arc<dyn WalletSigner>) -> Self {
        Self { signer }
    }

    pub async fn sign_batch(&self, transactions: &[VersionedTransaction]) -> SigningOutcome {
        if transactions.is_empty() {
            return SigningOutcome {
                transactions: Vec::new(),
                errors: Vec::new(),
                path: SigningPath::Bulk,
            };
        }

        let paths = [SigningPath::Bulk, SigningPath::Sequential];
        let result = first_success(paths, None, |_, path| async move {
            match path {
                SigningPath::Bulk => self.try_bulk(transactions).await.map(|signed| {
                    SigningOutcome {
                        errors: vec![None; signed.len()],
                        transactions: signed,
                        path: SigningPath::Bulk,
                    }
                }),
                SigningPath::Sequential => Ok(self.sign_sequential(transactions).await),
            }
        })
        .await;

        match result {
            Ok(success) => success.value,
            // 逐笔路径总会返回结果，这里只为穷尽匹配。
            Err(exhausted) => {
                let reason = exhausted
                    .into_last()
                    .unwrap_or_else(|| SignerError::Failed("签名路径耗尽".to_string()));
                SigningOutcome {
                    transactions: transactions.to_vec(),
                    errors: vec![Some(reason); transactions.len()],
                    path: SigningPath::Sequential,
                }
            }
        }
    }

    /// 单笔签名：优先走单元素批量签名，失败再直接签名。
    pub async fn sign_single(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<VersionedTransaction, SignerError> {
        let paths = [SigningPath::Bulk, SigningPath::Sequential];
        first_success(paths, None, |_, path| async move {
            match path {
                SigningPath::Bulk => self
                    .try_bulk(std::slice::from_ref(transaction))
                    .await?
                    .pop()
                    .ok_or(SignerError::LengthMismatch {
                        expected: 1,
                        actual: 0,
                    }),
                SigningPath::Sequential => self.signer.sign_one(transaction).await,
            }
        })
        .await
        .map(|success| success.value)
        .map_err(|exhausted| {
            exhausted
                .into_last()
                .unwrap_or_else(|| SignerError::Failed("签名路径耗尽".to_string()))
        })
    }

    async fn try_bulk(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<Vec<VersionedTransaction>, SignerError> {
        if !self.signer.supports_sign_all() {
            return Err(SignerError::Unsupported);
        }
        let signed = match self.signer.sign_all(transactions).await {
            Ok(signed) => signed,
            Err(err) => {
                warn!(
                    target: "engine::signing",
                    count = transactions.len(),
                    error = %err,
                    "批量签名失败，改为逐笔签名"
                );
                return Err(err);
            }
        };
        if signed.len() != transactions.len() {
            warn!(
                target: "engine::signing",
                expected = transactions.len(),
                actual = signed.len(),
                "批量签名返回数量不一致，改为逐笔签名"
            );
            return Err(SignerError::LengthMismatch {
                expected: transactions.len(),
                actual: signed.len(),
            });
        }
        if let Some(index) = transactions
            .iter()
            .zip(&signed)
            .position(|(draft, signed)| draft.message != signed.message)
        {
            warn!(
                target: "engine::signing",
                index,
                "批量签名返回的交易内容被改动，改为逐笔签名"
            );
            return Err(SignerError::MessageChanged(index));
        }
        debug!(
            target: "engine::signing",
            count = signed.len(),
            "批量签名完成"
        );
        Ok(signed)
    }

    async fn sign_sequential(&self, transactions: &[VersionedTransaction]) -> SigningOutcome {
        let mut signed = Vec::with_capacity(transactions.len());
        let mut errors = Vec::with_capacity(transactions.len());
        for (index, transaction) in transactions.iter().enumerate() {
            match self.signer.sign_one(transaction).await {
                Ok(tx) if tx.message == transaction.message => {
                    signed.push(tx);
                    errors.push(None);
                }
                Ok(_) => {
                    signed.push(transaction.clone());
                    errors.push(Some(SignerError::MessageChanged(index)));
                }
                Err(err) => {
                    warn!(
                        target: "engine::signing",
                        index,
                        error = %err,
                        "单笔签名失败"
                    );
                    signed.push(transaction.clone());
                    errors.push(Some(err));
                }
            }
        }
        SigningOutcome {
            transactions: signed,
            errors,
            path: SigningPath::Sequential,
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;

    /// 可编排行为的测试签名器，记录每次调用。
    pub struct ScriptedSigner {
        inner: KeypairSigner,
        pubkey: Pubkey,
        pub bulk: bool,
        pub bulk_fails: bool,
        pub bulk_drops_last: bool,
        /// 逐笔签名时失败的调用序号（从 0 开始）。
        pub fail_single_calls: Vec<usize>,
        /// 设置后，批量签名会等待放行（模拟钱包弹窗未确认）。
        pub bulk_gate: Option<Arc<tokio::sync::Notify>>,
        pub calls: Mutex<Vec<&'static str>>,
        single_calls: Mutex<usize>,
    }

    impl ScriptedSigner {
        pub fn new(keypair: Keypair) -> Self {
            let pubkey = keypair.pubkey();
            Self {
                inner: KeypairSigner::new(Arc::new(keypair)),
                pubkey,
                bulk: true,
                bulk_fails: false,
                bulk_drops_last: false,
                fail_single_calls: Vec::new(),
                bulk_gate: None,
                calls: Mutex::new(Vec::new()),
                single_calls: Mutex::new(0),
            }
        }

        pub fn call_log(&self) -> Vec<&'static str> {
            self.calls.lock().expect("calls").clone()
        }
    }

    #[async_trait]
    impl WalletSigner for ScriptedSigner {
        fn pubkey(&self) -> Pubkey {
            self.pubkey
        }

        fn supports_sign_all(&self) -> bool {
            self.bulk
        }

        async fn sign_all(
            &self,
            transactions: &[VersionedTransaction],
        ) -> Result<Vec<VersionedTransaction>, SignerError> {
            self.calls.lock().expect("calls").push("sign_all");
            if let Some(gate) = &self.bulk_gate {
                gate.notified().await;
            }
            if self.bulk_fails {
                return Err(SignerError::Rejected("用户拒绝".to_string()));
            }
            let mut signed = self.inner.sign_all(transactions).await?;
            if self.bulk_drops_last {
                signed.pop();
            }
            Ok(signed)
        }

        async fn sign_one(
            &self,
            transaction: &VersionedTransaction,
        ) -> Result<VersionedTransaction, SignerError> {
            self.calls.lock().expect("calls").push("sign_one");
            let call = {
                let mut counter = self.single_calls.lock().expect("counter");
                let call = *counter;
                *counter += 1;
                call
            };
            if self.fail_single_calls.contains(&call) {
                return Err(SignerError::Rejected(format!("第 {call} 次签名被拒绝")));
            }
            self.inner.sign_one(transaction).await
        }
    }
}
