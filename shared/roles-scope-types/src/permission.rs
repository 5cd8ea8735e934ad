use core::fmt;

use alloy_primitives::{Address, Selector};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::condition::Condition;

/// Grants calls to any function of `target_address`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPermission {
    pub target_address: Address,
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub delegatecall: bool,
}

/// Grants calls to one function, optionally scoped by a condition over its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionPermission {
    pub target_address: Address,
    pub selector: Selector,
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub delegatecall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

/// Author intent. Deserializes as a function permission iff `selector` is present;
/// unknown fields are rejected rather than read as a wider grant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Permission {
    Function(FunctionPermission),
    Target(TargetPermission),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PermissionFields {
    target_address: Address,
    #[serde(default)]
    selector: Option<Selector>,
    #[serde(default)]
    send: bool,
    #[serde(default)]
    delegatecall: bool,
    #[serde(default)]
    condition: Option<Condition>,
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = PermissionFields::deserialize(deserializer)?;
        match (fields.selector, fields.condition) {
            (Some(selector), condition) => Ok(FunctionPermission {
                target_address: fields.target_address,
                selector,
                send: fields.send,
                delegatecall: fields.delegatecall,
                condition,
            }
            .into()),
            (None, Some(_)) => Err(de::Error::custom(format!(
                "permission for {} has a condition but no selector",
                fields.target_address
            ))),
            (None, None) => Ok(TargetPermission {
                target_address: fields.target_address,
                send: fields.send,
                delegatecall: fields.delegatecall,
            }
            .into()),
        }
    }
}

/// Merge key: the address for target-level grants, address + selector for function-level ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionKey {
    Target(Address),
    Function(Address, Selector),
}

impl PermissionKey {
    pub fn address(&self) -> Address {
        match self {
            PermissionKey::Target(address) | PermissionKey::Function(address, _) => *address,
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionKey::Target(address) => write!(f, "{address}"),
            PermissionKey::Function(address, selector) => write!(f, "{address}.{selector}"),
        }
    }
}

impl Permission {
    pub fn target_address(&self) -> Address {
        match self {
            Permission::Function(p) => p.target_address,
            Permission::Target(p) => p.target_address,
        }
    }

    pub fn send(&self) -> bool {
        match self {
            Permission::Function(p) => p.send,
            Permission::Target(p) => p.send,
        }
    }

    pub fn delegatecall(&self) -> bool {
        match self {
            Permission::Function(p) => p.delegatecall,
            Permission::Target(p) => p.delegatecall,
        }
    }

    pub fn selector(&self) -> Option<Selector> {
        match self {
            Permission::Function(p) => Some(p.selector),
            Permission::Target(_) => None,
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Permission::Function(p) => p.condition.as_ref(),
            Permission::Target(_) => None,
        }
    }

    pub fn key(&self) -> PermissionKey {
        match self {
            Permission::Function(p) => PermissionKey::Function(p.target_address, p.selector),
            Permission::Target(p) => PermissionKey::Target(p.target_address),
        }
    }

    /// Same key and same execution flags.
    pub fn same_grant(&self, other: &Permission) -> bool {
        self.key() == other.key()
            && self.send() == other.send()
            && self.delegatecall() == other.delegatecall()
    }
}

impl From<TargetPermission> for Permission {
    fn from(value: TargetPermission) -> Self {
        Permission::Target(value)
    }
}

impl From<FunctionPermission> for Permission {
    fn from(value: FunctionPermission) -> Self {
        Permission::Function(value)
    }
}

/// Pointer to external documentation for a group of permissions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub uri: String,
    pub schema: String,
}

/// Permissions grouped under an optional annotation (also the shape of a preset bundle).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

/// Input entry for aggregation: a bare permission or an annotated set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionItem {
    Set(PermissionSet),
    Single(Permission),
}

impl From<Permission> for PermissionItem {
    fn from(value: Permission) -> Self {
        PermissionItem::Single(value)
    }
}

impl From<PermissionSet> for PermissionItem {
    fn from(value: PermissionSet) -> Self {
        PermissionItem::Set(value)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, fixed_bytes};

    use super::*;

    const TOKEN: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");

    #[test]
    fn untagged_permission_picks_variant_by_selector() {
        let target: Permission = serde_json::from_str(
            r#"{"targetAddress":"0x6b175474e89094c44da98b954eedeac495271d0f","send":true}"#,
        )
        .unwrap();
        assert_eq!(target.key(), PermissionKey::Target(TOKEN));
        assert!(target.send());
        assert!(!target.delegatecall());

        let function: Permission = serde_json::from_str(
            r#"{
                "targetAddress": "0x6B175474E89094C44Da98b954EedeAC495271d0F",
                "selector": "0xa9059cbb"
            }"#,
        )
        .unwrap();
        assert_eq!(
            function.key(),
            PermissionKey::Function(TOKEN, fixed_bytes!("a9059cbb"))
        );
        assert!(function.condition().is_none());
    }

    #[test]
    fn malformed_function_permission_is_rejected() {
        let unknown_operator = r#"{
            "targetAddress": "0x6b175474e89094c44da98b954eedeac495271d0f",
            "selector": "0xa9059cbb",
            "condition": {"paramType": "Calldata", "operator": "Matchez"}
        }"#;
        assert!(serde_json::from_str::<Permission>(unknown_operator).is_err());

        let short_selector = r#"{
            "targetAddress": "0x6b175474e89094c44da98b954eedeac495271d0f",
            "selector": "0xa9059c"
        }"#;
        assert!(serde_json::from_str::<Permission>(short_selector).is_err());

        let misspelled_flag = r#"{
            "targetAddress": "0x6b175474e89094c44da98b954eedeac495271d0f",
            "delegateCall": true
        }"#;
        assert!(serde_json::from_str::<Permission>(misspelled_flag).is_err());

        let condition_without_selector = r#"{
            "targetAddress": "0x6b175474e89094c44da98b954eedeac495271d0f",
            "condition": {"paramType": "Calldata", "operator": "Pass"}
        }"#;
        let err = serde_json::from_str::<Permission>(condition_without_selector).unwrap_err();
        assert!(err.to_string().contains("no selector"));

        let items = format!("[{unknown_operator}]");
        assert!(serde_json::from_str::<Vec<PermissionItem>>(&items).is_err());
    }

    #[test]
    fn serialized_permissions_read_back() {
        let permissions = vec![
            Permission::from(TargetPermission {
                target_address: TOKEN,
                send: true,
                delegatecall: false,
            }),
            Permission::from(FunctionPermission {
                target_address: TOKEN,
                selector: fixed_bytes!("a9059cbb"),
                send: false,
                delegatecall: true,
                condition: Some(Condition::pass(crate::ParamType::Calldata)),
            }),
        ];
        let json = serde_json::to_string(&permissions).unwrap();
        let decoded: Vec<Permission> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, permissions);
    }

    #[test]
    fn key_display() {
        let key = PermissionKey::Function(TOKEN, fixed_bytes!("a9059cbb"));
        let rendered = key.to_string().to_lowercase();
        assert!(rendered.starts_with("0x6b175474"));
        assert!(rendered.ends_with(".0xa9059cbb"));
    }

    #[test]
    fn item_accepts_sets_and_singles() {
        let items: Vec<PermissionItem> = serde_json::from_str(
            r#"[
                {"targetAddress":"0x6b175474e89094c44da98b954eedeac495271d0f"},
                {"permissions":[],"annotation":{"uri":"https://example.org/a","schema":"s"}}
            ]"#,
        )
        .unwrap();
        assert!(matches!(items[0], PermissionItem::Single(Permission::Target(_))));
        assert!(matches!(items[1], PermissionItem::Set(_)));
    }
}
