use std::mem;

#[cfg(test)]
use solana_sdk::instruction::Instruction;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;

pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111");

const SET_COMPUTE_UNIT_LIMIT: u8 = 2;
const SET_COMPUTE_UNIT_PRICE: u8 = 3;

/// 测试夹具用它拼装草稿，生产路径只解析构建器返回的指令。
#[cfg(test)]
pub fn compute_unit_limit_instruction(limit: u32) -> Instruction {
    let mut data = Vec::with_capacity(1 + mem::size_of::<u32>());
    data.push(SET_COMPUTE_UNIT_LIMIT);
    data.extend_from_slice(&limit.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: Vec::new(),
        data,
    }
}

#[cfg(test)]
pub fn compute_unit_price_instruction(price_micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(1 + mem::size_of::<u64>());
    data.push(SET_COMPUTE_UNIT_PRICE);
    data.extend_from_slice(&price_micro_lamports.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: Vec::new(),
        data,
    }
}

/// 解析单条 compute budget 指令数据中的 compute unit price。
pub fn decode_compute_unit_price(data: &[u8]) -> Option<u64> {
    match data {
        [SET_COMPUTE_UNIT_PRICE, rest @ ..] if rest.len() >= mem::size_of::<u64>() => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&rest[..8]);
            Some(u64::from_le_bytes(bytes))
        }
        _ => None,
    }
}

pub fn decode_compute_unit_limit(data: &[u8]) -> Option<u32> {
    match data {
        [SET_COMPUTE_UNIT_LIMIT, rest @ ..] if rest.len() >= mem::size_of::<u32>() => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&rest[..4]);
            Some(u32::from_le_bytes(bytes))
        }
        _ => None,
    }
}

fn compute_budget_data(message: &VersionedMessage) -> impl Iterator<Item = &[u8]> {
    let keys = message.static_account_keys();
    message
        .instructions()
        .iter()
        .filter(move |ix| {
            keys.get(usize::from(ix.program_id_index))
                .is_some_and(is_compute_budget_program)
        })
        .map(|ix| ix.data.as_slice())
}

/// 从已编译消息中找出 compute budget 指令并返回嵌入的价格。
///
/// program id 只能来自静态账户表，因此 v0 消息无需解析地址查找表。
pub fn embedded_compute_unit_price(message: &VersionedMessage) -> Option<u64> {
    compute_budget_data(message).find_map(decode_compute_unit_price)
}

pub fn embedded_compute_unit_limit(message: &VersionedMessage) -> Option<u32> {
    compute_budget_data(message).find_map(decode_compute_unit_limit)
}

pub fn is_compute_budget_program(program_id: &Pubkey) -> bool {
    *program_id == COMPUTE_BUDGET_PROGRAM_ID
}
