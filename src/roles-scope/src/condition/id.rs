//! Content addressing of normalized conditions.
//!
//! The roles contract stores packed conditions as the runtime code of a contract
//! deployed through a singleton CREATE2 factory. The address that deployment would
//! land on is the condition's identifier: no deployment happens here, the address
//! is derived the same way the contract and the indexer derive it.
//!
//! Layout (frozen, shared with the contract and the indexer):
//! - one big-endian `u16` header per flattened node:
//!   `parent << 8 | paramType << 5 | operator`
//! - followed by one 32-byte word per node whose operator carries a compValue,
//!   in list order: `keccak256(compValue)` for `EqualTo`, otherwise the compValue
//!   right-padded or truncated to 32 bytes
//! - framed as creation bytecode:
//!   `PUSH4 len | DUP1 | PUSH1 0x0e | PUSH1 0 | CODECOPY | PUSH1 0 | RETURN | 0x00 | packed`

use alloy_primitives::{address, keccak256, Address, B256};
use roles_scope_types::{ConditionFlat, ConditionNode, Operator};
use sha3::{Digest, Keccak256};

use crate::{
    condition::flatten::{check_breadth_first, flatten_condition},
    errors::IntegrityError,
};

/// Singleton CREATE2 factory the roles contract deploys condition storage through.
pub const SINGLETON_FACTORY: Address = address!("ce0042b868300000d44a59004da54a005ffdcf9f");

/// CREATE2 salt used for condition storage.
pub const SALT: B256 = B256::ZERO;

/// Parent indices are packed into 8 bits.
pub const MAX_CONDITIONS: usize = 256;

const HEADER_SIZE: usize = 2;
const COMP_VALUE_SIZE: usize = 32;

const PUSH4: u8 = 0x63;
/// `DUP1 PUSH1 0x0e PUSH1 0x00 CODECOPY PUSH1 0x00 RETURN`
const CREATION_CODE_TAIL: [u8; 9] = [0x80, 0x60, 0x0e, 0x60, 0x00, 0x39, 0x60, 0x00, 0xf3];
/// Runtime code starts with STOP so the storage contract is never callable.
const RUNTIME_PREFIX: u8 = 0x00;

/// Pack a breadth-first condition list into the stored byte layout.
pub fn pack_conditions(flat: &[ConditionFlat]) -> Result<Vec<u8>, IntegrityError> {
    check_breadth_first(flat)?;
    if flat.len() > MAX_CONDITIONS {
        return Err(IntegrityError::TooManyConditions { count: flat.len() });
    }

    let payloads = flat.iter().filter(|c| c.operator.has_comp_value()).count();
    let mut buf = Vec::with_capacity(flat.len() * HEADER_SIZE + payloads * COMP_VALUE_SIZE);

    for condition in flat {
        let header = ((condition.parent as u16) << 8)
            | ((condition.param_type as u16) << 5)
            | condition.operator as u16;
        buf.extend_from_slice(&header.to_be_bytes());
    }

    for condition in flat.iter().filter(|c| c.operator.has_comp_value()) {
        let value = condition
            .comp_value
            .as_ref()
            .ok_or(IntegrityError::MissingCompValue {
                operator: condition.operator,
            })?;
        buf.extend_from_slice(comp_value_word(condition.operator, value).as_slice());
    }
    Ok(buf)
}

fn comp_value_word(operator: Operator, value: &[u8]) -> B256 {
    if operator == Operator::EqualTo {
        return keccak256(value);
    }
    let mut word = [0u8; COMP_VALUE_SIZE];
    let len = value.len().min(COMP_VALUE_SIZE);
    word[..len].copy_from_slice(&value[..len]);
    B256::from(word)
}

/// Creation bytecode returning `0x00 ‖ packed` as runtime code.
pub fn creation_bytecode(packed: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 4 + CREATION_CODE_TAIL.len() + 1 + packed.len());
    buf.push(PUSH4);
    buf.extend_from_slice(&runtime_len(packed).to_be_bytes());
    buf.extend_from_slice(&CREATION_CODE_TAIL);
    buf.push(RUNTIME_PREFIX);
    buf.extend_from_slice(packed);
    buf
}

fn runtime_len(packed: &[u8]) -> u32 {
    // bounded by MAX_CONDITIONS * (HEADER_SIZE + COMP_VALUE_SIZE)
    (packed.len() + 1) as u32
}

/// Identifier of a breadth-first condition list.
pub fn condition_address(flat: &[ConditionFlat]) -> Result<Address, IntegrityError> {
    let packed = pack_conditions(flat)?;

    let mut hasher = Keccak256::new();
    hasher.update([PUSH4]);
    hasher.update(runtime_len(&packed).to_be_bytes());
    hasher.update(CREATION_CODE_TAIL);
    hasher.update([RUNTIME_PREFIX]);
    hasher.update(&packed);
    let init_code_hash = B256::from_slice(hasher.finalize().as_slice());

    Ok(SINGLETON_FACTORY.create2(SALT.0, init_code_hash.0))
}

/// Identifier of a condition tree, taken over its breadth-first flattening as is.
///
/// Callers wanting a canonical identifier pass a normalized tree.
pub fn condition_id<N: ConditionNode>(condition: &N) -> Result<Address, IntegrityError> {
    condition_address(&flatten_condition(condition))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{hex, U256};
    use roles_scope_types::{Condition, ParamType};

    use super::*;

    fn word(n: u64) -> Vec<u8> {
        U256::from(n).to_be_bytes::<32>().to_vec()
    }

    fn sample() -> Condition {
        Condition::matches(
            ParamType::Calldata,
            vec![
                Condition::equal_to(ParamType::Static, word(1)),
                Condition::compare(ParamType::Static, Operator::GreaterThan, word(5)),
            ],
        )
    }

    #[test]
    fn packs_headers_then_payloads() {
        let packed = pack_conditions(&flatten_condition(&sample())).unwrap();
        assert_eq!(
            hex::encode(&packed),
            "00a500300031\
             b10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6\
             0000000000000000000000000000000000000000000000000000000000000005"
        );
    }

    #[test]
    fn known_identifiers() {
        assert_eq!(
            condition_id(&sample()).unwrap(),
            address!("624fb11d17fff9f047b7cae524432d0dab5ea42e")
        );
        assert_eq!(
            condition_id(&Condition::equal_to(ParamType::Static, word(1))).unwrap(),
            address!("c64985c1239e29226b9cb465fb244eecc3eef7ad")
        );
    }

    #[test]
    fn streamed_hash_matches_creation_bytecode() {
        let flat = flatten_condition(&sample());
        let packed = pack_conditions(&flat).unwrap();
        let code = creation_bytecode(&packed);
        assert_eq!(
            hex::encode(&code[..15]),
            "630000004780600e6000396000f300"
        );
        assert_eq!(&code[15..], packed.as_slice());
        assert_eq!(
            condition_address(&flat).unwrap(),
            SINGLETON_FACTORY.create2(SALT.0, keccak256(&code).0)
        );
    }

    #[test]
    fn short_values_are_padded_and_long_values_truncated() {
        let short = comp_value_word(Operator::Bitmask, &[0xab, 0xcd]);
        assert_eq!(&short[..2], &[0xab, 0xcd]);
        assert!(short[2..].iter().all(|b| *b == 0));

        let long: Vec<u8> = (0u8..40).collect();
        let truncated = comp_value_word(Operator::Custom, &long);
        assert_eq!(truncated.as_slice(), &long[..32]);

        let hashed = comp_value_word(Operator::EqualTo, &long);
        assert_eq!(hashed, keccak256(&long));
    }

    #[test]
    fn distinct_trees_with_same_flattening_share_an_id() {
        let a = sample();
        let b = Condition {
            children: vec![
                Condition::equal_to(ParamType::Static, word(1)),
                Condition::compare(ParamType::Static, Operator::GreaterThan, word(5)),
            ],
            ..Condition::matches(ParamType::Calldata, vec![])
        };
        assert_eq!(condition_id(&a).unwrap(), condition_id(&b).unwrap());
    }

    #[test]
    fn any_change_moves_the_id() {
        let base = condition_id(&sample()).unwrap();

        let mut value = sample();
        value.children[1].comp_value = Some(word(6).into());
        assert_ne!(condition_id(&value).unwrap(), base);

        let mut order = sample();
        order.children.reverse();
        assert_ne!(condition_id(&order).unwrap(), base);

        let mut operator = sample();
        operator.children[1].operator = Operator::LessThan;
        assert_ne!(condition_id(&operator).unwrap(), base);

        let mut param_type = sample();
        param_type.param_type = ParamType::AbiEncoded;
        assert_ne!(condition_id(&param_type).unwrap(), base);
    }

    #[test]
    fn oversized_lists_are_rejected() {
        let wide = Condition::and(
            (0..MAX_CONDITIONS as u64)
                .map(|n| Condition::equal_to(ParamType::Static, word(n)))
                .collect(),
        );
        assert_eq!(
            condition_id(&wide),
            Err(IntegrityError::TooManyConditions {
                count: MAX_CONDITIONS + 1
            })
        );
    }
}
