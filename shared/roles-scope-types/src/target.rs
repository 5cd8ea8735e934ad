use alloy_primitives::{Address, Selector};
use serde::{Deserialize, Serialize};

use crate::{condition::NormalizedCondition, errors::ValueError};

/// Per-address access tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Clearance {
    #[default]
    None = 0,
    Target = 1,
    Function = 2,
}

/// Permitted call styles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExecutionOptions {
    #[default]
    None = 0,
    Send = 1,
    DelegateCall = 2,
    Both = 3,
}

impl ExecutionOptions {
    pub fn from_flags(send: bool, delegatecall: bool) -> Self {
        match (send, delegatecall) {
            (false, false) => ExecutionOptions::None,
            (true, false) => ExecutionOptions::Send,
            (false, true) => ExecutionOptions::DelegateCall,
            (true, true) => ExecutionOptions::Both,
        }
    }

    pub fn send(self) -> bool {
        matches!(self, ExecutionOptions::Send | ExecutionOptions::Both)
    }

    pub fn delegatecall(self) -> bool {
        matches!(self, ExecutionOptions::DelegateCall | ExecutionOptions::Both)
    }
}

impl TryFrom<u8> for Clearance {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Clearance::None),
            1 => Ok(Clearance::Target),
            2 => Ok(Clearance::Function),
            _ => Err(ValueError::Clearance(value)),
        }
    }
}

impl TryFrom<u8> for ExecutionOptions {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExecutionOptions::None),
            1 => Ok(ExecutionOptions::Send),
            2 => Ok(ExecutionOptions::DelegateCall),
            3 => Ok(ExecutionOptions::Both),
            _ => Err(ValueError::ExecutionOptions(value)),
        }
    }
}

/// Scoped function entry of a [`Target`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub selector: Selector,
    pub execution_options: ExecutionOptions,
    pub wildcarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<NormalizedCondition>,
}

/// On-chain-facing aggregate of everything granted on one address.
///
/// An address is never both target-cleared and function-scoped, and `functions`
/// never repeats a selector.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub address: Address,
    pub clearance: Clearance,
    pub execution_options: ExecutionOptions,
    #[serde(default)]
    pub functions: Vec<Function>,
}
