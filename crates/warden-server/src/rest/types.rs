use serde::{Deserialize, Serialize};
use warden_core::model::{Condition, Permission, PermissionCode};

#[derive(Debug, Deserialize)]
pub struct CheckPermissionRequest {
    pub user_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub permissions: Vec<PermissionCode>,
    #[serde(default)]
    pub condition: Condition,
}

#[derive(Debug, Serialize)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkTenantPermissionRequest {
    pub tenant_id: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkPermissionRequest {
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUserRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// The empty string stands for "no tenant" only at the HTTP boundary;
/// everything past it works with a plain `Option`.
pub fn normalize_tenant(tenant_id: Option<String>) -> Option<String> {
    tenant_id.filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_defaults_to_and() {
        let req: CheckPermissionRequest = serde_json::from_str(
            r#"{"user_id": "u1", "tenant_id": "t1",
                "permissions": [{"resource_code": "doc", "action_code": "read"}]}"#,
        )
        .unwrap();
        assert_eq!(req.condition, Condition::And);
        assert_eq!(req.permissions.len(), 1);
    }

    #[test]
    fn tenant_id_may_be_absent() {
        let req: CheckPermissionRequest = serde_json::from_str(
            r#"{"user_id": "u1", "permissions": [], "condition": "OR"}"#,
        )
        .unwrap();
        assert_eq!(req.tenant_id, None);
        assert_eq!(req.condition, Condition::Or);
    }

    #[test]
    fn empty_tenant_string_normalizes_to_none() {
        assert_eq!(normalize_tenant(Some(String::new())), None);
        assert_eq!(normalize_tenant(None), None);
        assert_eq!(normalize_tenant(Some("t1".into())), Some("t1".into()));
    }
}
