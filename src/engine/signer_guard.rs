use std::collections::BTreeSet;

use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use super::error::EngineError;
use super::types::{DraftTransaction, ExitTask};

/// 签名者白名单：草稿中尚未签名的必需签名者必须全部在名单内。
#[derive(Debug, Clone)]
pub struct SignerGuard {
    allowed: BTreeSet<Pubkey>,
}

impl SignerGuard {
    pub fn owner_only(owner: Pubkey) -> Self {
        Self::with_allowed([owner])
    }

    pub fn with_allowed(allowed: impl IntoIterator<Item = Pubkey>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// 返回名单外的未签名签名者，为空表示通过。
    pub fn offenders(&self, draft: &DraftTransaction) -> Vec<Pubkey> {
        draft
            .unsigned_signers()
            .into_iter()
            .filter(|signer| !self.allowed.contains(signer))
            .collect()
    }

    pub fn check(
        &self,
        index: usize,
        task: &ExitTask,
        draft: &DraftTransaction,
    ) -> Result<(), EngineError> {
        let signers = self.offenders(draft);
        if signers.is_empty() {
            return Ok(());
        }
        warn!(
            target: "engine::signer_guard",
            index,
            protocol = %task.protocol,
            pool = %task.pool,
            signers = ?signers,
            "草稿交易需要非预期签名者"
        );
        Err(EngineError::UnexpectedSigner {
            index,
            protocol: task.protocol,
            pool: task.pool,
            signers,
        })
    }

    /// 校验全部主草稿及其变体，遇到第一处违规即返回。
    pub fn check_all(&self, tasks: &[ExitTask]) -> Result<(), EngineError> {
        for (index, task) in tasks.iter().enumerate() {
            self.check(index, task, &task.primary)?;
            for variant in &task.variants {
                self.check(index, task, &variant.draft)?;
            }
        }
        Ok(())
    }
}
