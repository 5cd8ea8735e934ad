use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::errors::ValueError;

/// ABI shape of the value a condition node applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParamType {
    None = 0,
    Static = 1,
    Dynamic = 2,
    Tuple = 3,
    Array = 4,
    Calldata = 5,
    AbiEncoded = 6,
}

/// Condition operators. Discriminants are shared with the roles contract and indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operator {
    Pass = 0,

    And = 1,
    Or = 2,
    Nor = 3,
    Xor = 4,

    Matches = 5,
    ArraySome = 6,
    ArrayEvery = 7,
    ArraySubset = 8,

    EqualToAvatar = 15,
    EqualTo = 16,
    GreaterThan = 17,
    LessThan = 18,
    SignedIntGreaterThan = 19,
    SignedIntLessThan = 20,
    Bitmask = 21,
    Custom = 22,

    WithinAllowance = 28,
    EtherWithinAllowance = 29,
    CallWithinAllowance = 30,
}

impl ParamType {
    /// Composite types whose children describe positional members.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            ParamType::Tuple | ParamType::Array | ParamType::Calldata | ParamType::AbiEncoded
        )
    }
}

impl Operator {
    pub fn is_logical(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Nor | Operator::Xor)
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            Operator::ArraySome | Operator::ArrayEvery | Operator::ArraySubset
        )
    }

    /// Operators whose node carries a `compValue` payload.
    pub fn has_comp_value(self) -> bool {
        self as u8 >= Operator::EqualTo as u8
    }

    /// Leaf operators comparing the decoded value against something.
    pub fn is_comparison(self) -> bool {
        self == Operator::EqualToAvatar || self.has_comp_value()
    }

    /// Child order does not affect the outcome.
    pub fn is_commutative(self) -> bool {
        self.is_logical()
    }
}

impl TryFrom<u8> for ParamType {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ParamType::*;
        let param_type = match value {
            0 => None,
            1 => Static,
            2 => Dynamic,
            3 => Tuple,
            4 => Array,
            5 => Calldata,
            6 => AbiEncoded,
            _ => return Err(ValueError::ParamType(value)),
        };
        Ok(param_type)
    }
}

impl TryFrom<u8> for Operator {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Operator::*;
        let op = match value {
            0 => Pass,
            1 => And,
            2 => Or,
            3 => Nor,
            4 => Xor,
            5 => Matches,
            6 => ArraySome,
            7 => ArrayEvery,
            8 => ArraySubset,
            15 => EqualToAvatar,
            16 => EqualTo,
            17 => GreaterThan,
            18 => LessThan,
            19 => SignedIntGreaterThan,
            20 => SignedIntLessThan,
            21 => Bitmask,
            22 => Custom,
            28 => WithinAllowance,
            29 => EtherWithinAllowance,
            30 => CallWithinAllowance,
            _ => return Err(ValueError::Operator(value)),
        };
        Ok(op)
    }
}

/// Read access shared by authored and normalized condition trees.
pub trait ConditionNode: Sized {
    fn param_type(&self) -> ParamType;
    fn operator(&self) -> Operator;
    fn comp_value(&self) -> Option<&Bytes>;
    fn children(&self) -> &[Self];
}

/// Predicate over ABI-decoded call arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub param_type: ParamType,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_value: Option<Bytes>,
}

impl Condition {
    pub fn pass(param_type: ParamType) -> Self {
        Self {
            param_type,
            operator: Operator::Pass,
            children: Vec::new(),
            comp_value: None,
        }
    }

    /// Logical group; logical nodes always have `ParamType::None`.
    pub fn logical(operator: Operator, children: Vec<Condition>) -> Self {
        Self {
            param_type: ParamType::None,
            operator,
            children,
            comp_value: None,
        }
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Self::logical(Operator::And, children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Self::logical(Operator::Or, children)
    }

    pub fn nor(children: Vec<Condition>) -> Self {
        Self::logical(Operator::Nor, children)
    }

    pub fn matches(param_type: ParamType, children: Vec<Condition>) -> Self {
        Self {
            param_type,
            operator: Operator::Matches,
            children,
            comp_value: None,
        }
    }

    pub fn compare(param_type: ParamType, operator: Operator, value: impl Into<Bytes>) -> Self {
        Self {
            param_type,
            operator,
            children: Vec::new(),
            comp_value: Some(value.into()),
        }
    }

    pub fn equal_to(param_type: ParamType, value: impl Into<Bytes>) -> Self {
        Self::compare(param_type, Operator::EqualTo, value)
    }

    /// Top-level OR branches: the children of an `Or`, otherwise the condition itself.
    pub fn branches(&self) -> &[Condition] {
        if self.operator == Operator::Or {
            &self.children
        } else {
            core::slice::from_ref(self)
        }
    }
}

impl ConditionNode for Condition {
    fn param_type(&self) -> ParamType {
        self.param_type
    }

    fn operator(&self) -> Operator {
        self.operator
    }

    fn comp_value(&self) -> Option<&Bytes> {
        self.comp_value.as_ref()
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Canonical form of a [`Condition`]; every node carries the identifier of its own subtree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCondition {
    #[serde(rename = "$$id")]
    pub id: Address,
    pub param_type: ParamType,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NormalizedCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_value: Option<Bytes>,
}

impl NormalizedCondition {
    /// Strip identifiers.
    pub fn to_condition(&self) -> Condition {
        Condition {
            param_type: self.param_type,
            operator: self.operator,
            children: self.children.iter().map(Self::to_condition).collect(),
            comp_value: self.comp_value.clone(),
        }
    }

    pub fn branches(&self) -> &[NormalizedCondition] {
        if self.operator == Operator::Or {
            &self.children
        } else {
            core::slice::from_ref(self)
        }
    }
}

impl From<&NormalizedCondition> for Condition {
    fn from(value: &NormalizedCondition) -> Self {
        value.to_condition()
    }
}

impl ConditionNode for NormalizedCondition {
    fn param_type(&self) -> ParamType {
        self.param_type
    }

    fn operator(&self) -> Operator {
        self.operator
    }

    fn comp_value(&self) -> Option<&Bytes> {
        self.comp_value.as_ref()
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Breadth-first list entry; `parent` is the list index of the parent (root refers to itself).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionFlat {
    pub parent: usize,
    pub param_type: ParamType,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_value: Option<Bytes>,
}
