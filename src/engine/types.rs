use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

use crate::api::serde_helpers::field_as_string;
use crate::instructions::compute_budget::{embedded_compute_unit_limit, embedded_compute_unit_price};
use crate::protocols::{ExitAction, PositionKeys, ProtocolKind, TaskKind};

#[derive(Debug, Error)]
pub enum DraftCodecError {
    #[error("base64 解码失败: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("交易反序列化失败: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("交易序列化失败: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("交易尾部存在 {0} 个多余字节")]
    TrailingBytes(usize),
    #[error("签名数量 {actual} 超过所需签名数 {required}")]
    TooManySignatures { required: usize, actual: usize },
}

/// 构建器返回的未签名（或部分签名）交易及其过期区块高度。
#[derive(Debug, Clone)]
pub struct DraftTransaction {
    pub transaction: VersionedTransaction,
    pub expiry_height: u64,
}

impl DraftTransaction {
    pub fn new(mut transaction: VersionedTransaction, expiry_height: u64) -> Self {
        let required = required_signature_count(&transaction);
        if transaction.signatures.len() < required {
            transaction.signatures.resize(required, Signature::default());
        }
        Self {
            transaction,
            expiry_height,
        }
    }

    pub fn from_base64(encoded: &str, expiry_height: u64) -> Result<Self, DraftCodecError> {
        let bytes = BASE64.decode(encoded.trim())?;
        let (transaction, read): (VersionedTransaction, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
        if read != bytes.len() {
            return Err(DraftCodecError::TrailingBytes(bytes.len() - read));
        }
        let required = required_signature_count(&transaction);
        if transaction.signatures.len() > required {
            return Err(DraftCodecError::TooManySignatures {
                required,
                actual: transaction.signatures.len(),
            });
        }
        Ok(Self::new(transaction, expiry_height))
    }

    pub fn to_base64(&self) -> Result<String, DraftCodecError> {
        let bytes = bincode::serde::encode_to_vec(&self.transaction, bincode::config::legacy())?;
        Ok(BASE64.encode(bytes))
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        let keys = self.transaction.message.static_account_keys();
        &keys[..required_signature_count(&self.transaction).min(keys.len())]
    }

    /// 仍未签名的必需签名者（签名槽位为默认值）。
    pub fn unsigned_signers(&self) -> Vec<Pubkey> {
        self.required_signers()
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                self.transaction
                    .signatures
                    .get(*index)
                    .is_none_or(|signature| *signature == Signature::default())
            })
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn compute_unit_price(&self) -> Option<u64> {
        embedded_compute_unit_price(&self.transaction.message)
    }

    pub fn compute_unit_limit(&self) -> Option<u32> {
        embedded_compute_unit_limit(&self.transaction.message)
    }

    pub fn same_message(&self, other: &VersionedTransaction) -> bool {
        self.transaction.message == other.message
    }
}

fn required_signature_count(transaction: &VersionedTransaction) -> usize {
    usize::from(transaction.message.header().num_required_signatures)
}

impl Serialize for DraftTransaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let unsigned: Vec<String> = self
            .unsigned_signers()
            .iter()
            .map(ToString::to_string)
            .collect();
        let encoded = self
            .to_base64()
            .map_err(<S::Error as serde::ser::Error>::custom)?;
        let mut state = serializer.serialize_struct("DraftTransaction", 4)?;
        state.serialize_field("transaction", &encoded)?;
        state.serialize_field("expiry_height", &self.expiry_height)?;
        state.serialize_field("compute_unit_price", &self.compute_unit_price())?;
        state.serialize_field("unsigned_signers", &unsigned)?;
        state.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityVariant {
    pub fee_level: u64,
    pub draft: DraftTransaction,
}

impl PriorityVariant {
    pub fn expiry_height(&self) -> u64 {
        self.draft.expiry_height
    }
}

/// 规划阶段产出的单笔退出任务。
#[derive(Debug, Clone, Serialize)]
pub struct ExitTask {
    pub protocol: ProtocolKind,
    pub kind: TaskKind,
    #[serde(with = "field_as_string")]
    pub pool: Pubkey,
    #[serde(with = "field_as_string")]
    pub secondary: Pubkey,
    pub action: ExitAction,
    #[serde(skip)]
    pub position: PositionKeys,
    pub primary_fee_level: u64,
    pub primary: DraftTransaction,
    /// 非空时 `variants[0]` 即主草稿。
    pub variants: Vec<PriorityVariant>,
}

impl ExitTask {
    /// 按费率升序排列的待尝试草稿；没有变体时只有主草稿。
    pub fn attempts(&self) -> Vec<PriorityVariant> {
        if self.variants.is_empty() {
            vec![PriorityVariant {
                fee_level: self.primary_fee_level,
                draft: self.primary.clone(),
            }]
        } else {
            self.variants.clone()
        }
    }

    pub fn pool_key(&self) -> (ProtocolKind, Pubkey) {
        (self.protocol, self.pool)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::{AccountMeta, Instruction};
    use solana_sdk::message::{Message, VersionedMessage};

    use super::*;
    use crate::instructions::compute_budget::{
        compute_unit_limit_instruction, compute_unit_price_instruction,
    };

    /// 构造一笔需要 `signers` 全部签名、嵌入给定费率的草稿。
    pub fn draft(signers: &[Pubkey], fee_level: u64, expiry_height: u64) -> DraftTransaction {
        tagged_draft(signers, fee_level, expiry_height, None)
    }

    /// 同 [`draft`]，额外把 `tag` 作为只读账户写入，便于测试按账户识别交易。
    pub fn tagged_draft(
        signers: &[Pubkey],
        fee_level: u64,
        expiry_height: u64,
        tag: Option<Pubkey>,
    ) -> DraftTransaction {
        let payer = signers[0];
        let mut instructions = vec![
            compute_unit_limit_instruction(200_000),
            compute_unit_price_instruction(fee_level),
        ];
        let mut accounts: Vec<AccountMeta> = signers
            .iter()
            .map(|key| AccountMeta::new_readonly(*key, true))
            .collect();
        if let Some(tag) = tag {
            accounts.push(AccountMeta::new_readonly(tag, false));
        }
        let memo = Instruction {
            program_id: Pubkey::new_unique(),
            accounts,
            data: fee_level.to_le_bytes().to_vec(),
        };
        instructions.push(memo);
        let message = Message::new_with_blockhash(&instructions, Some(&payer), &Hash::new_unique());
        let transaction = VersionedTransaction {
            signatures: Vec::new(),
            message: VersionedMessage::Legacy(message),
        };
        DraftTransaction::new(transaction, expiry_height)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::draft;
    use super::*;

    #[test]
    fn base64_roundtrip_keeps_signature_slots() {
        let owner = Pubkey::new_unique();
        let original = draft(&[owner], 250_000, 1_000);
        assert_eq!(original.transaction.signatures.len(), 1);

        let encoded = original.to_base64().expect("encode");
        let decoded = DraftTransaction::from_base64(&encoded, 1_000).expect("decode");
        assert!(decoded.same_message(&original.transaction));
        assert_eq!(decoded.unsigned_signers(), vec![owner]);
        assert_eq!(decoded.transaction.signatures, vec![Signature::default()]);
        assert_eq!(decoded.compute_unit_price(), Some(250_000));
        assert_eq!(decoded.compute_unit_limit(), Some(200_000));
    }

    #[test]
    fn rejects_garbage_and_trailing_bytes() {
        assert!(matches!(
            DraftTransaction::from_base64("%%%", 1),
            Err(DraftCodecError::Base64(_))
        ));

        let owner = Pubkey::new_unique();
        let mut bytes = BASE64
            .decode(draft(&[owner], 1, 1).to_base64().expect("encode"))
            .expect("base64");
        bytes.extend_from_slice(&[0, 0]);
        let err = DraftTransaction::from_base64(&BASE64.encode(bytes), 1).unwrap_err();
        assert!(matches!(err, DraftCodecError::TrailingBytes(2)));
    }

    #[test]
    fn signed_slots_are_not_reported_as_unsigned() {
        let owner = Pubkey::new_unique();
        let cosigner = Pubkey::new_unique();
        let mut partial = draft(&[owner, cosigner], 1, 1);
        assert_eq!(partial.required_signers(), &[owner, cosigner]);
        partial.transaction.signatures[1] = Signature::from([7u8; 64]);
        assert_eq!(partial.unsigned_signers(), vec![owner]);
    }

    #[test]
    fn draft_serializes_as_summary() {
        let owner = Pubkey::new_unique();
        let value = serde_json::to_value(draft(&[owner], 42, 77)).expect("json");
        assert_eq!(value["expiry_height"], 77);
        assert_eq!(value["compute_unit_price"], 42);
        assert_eq!(value["unsigned_signers"][0], owner.to_string());

        let encoded = value["transaction"].as_str().expect("base64");
        let decoded = DraftTransaction::from_base64(encoded, 77).expect("decode");
        assert_eq!(decoded.compute_unit_price(), Some(42));
    }
}
