//! Identity-store domain model.
//!
//! Users are not modeled as an entity; any opaque string identifies a user.
//! A `tenant_id` of `None` on a role or group means "global": the subject
//! and its grants apply in every tenant and bypass the per-tenant
//! enablement gate.

use serde::{Deserialize, Serialize};

/// One half of a permission name, identified by a stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
}

/// The other half of a permission name. An action belongs to exactly one
/// resource; `(resource_id, code)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub resource_id: String,
    pub code: String,
    pub name: String,
    pub description: String,
}

/// A permission: the pair of a resource and one of its actions, by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource_id: String,
    pub action_id: String,
}

/// A permission named by codes rather than ids, as it arrives over the
/// wire. Resolved against the identity store before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCode {
    pub resource_code: String,
    pub action_code: String,
}

impl PermissionCode {
    pub fn new(resource_code: impl Into<String>, action_code: impl Into<String>) -> Self {
        Self {
            resource_code: resource_code.into(),
            action_code: action_code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// How a multi-permission check combines per-permission matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Condition {
    #[default]
    And,
    Or,
}

impl Condition {
    /// The decision rule: OR passes on any match, AND requires all of them.
    /// An empty request is vacuously true under AND and false under OR.
    pub fn decide(self, matches: usize, requested: usize) -> bool {
        match self {
            Condition::Or => matches > 0,
            Condition::And => matches == requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_requires_every_match() {
        assert!(Condition::And.decide(2, 2));
        assert!(!Condition::And.decide(1, 2));
    }

    #[test]
    fn or_requires_any_match() {
        assert!(Condition::Or.decide(1, 2));
        assert!(!Condition::Or.decide(0, 2));
    }

    #[test]
    fn empty_request_is_true_under_and_false_under_or() {
        assert!(Condition::And.decide(0, 0));
        assert!(!Condition::Or.decide(0, 0));
    }

    #[test]
    fn condition_deserializes_from_uppercase() {
        let and: Condition = serde_json::from_str("\"AND\"").unwrap();
        let or: Condition = serde_json::from_str("\"OR\"").unwrap();
        assert_eq!(and, Condition::And);
        assert_eq!(or, Condition::Or);
    }

    #[test]
    fn global_role_omits_tenant_in_json() {
        let role = Role {
            id: "r1".into(),
            name: "admin".into(),
            tenant_id: None,
        };
        let json = serde_json::to_value(&role).unwrap();
        assert!(json.get("tenant_id").is_none());
    }
}
