//! The permission gate in front of management endpoints.
//!
//! The calling user arrives in `X-User-ID` (required); the target tenant
//! in `X-Tenant-ID` or, failing that, the `tenant_id` query parameter.
//! Each guarded route carries its own `(primary, associated)` permission
//! pair, checked in one query by the evaluator.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::error;
use warden_core::model::PermissionCode;

use crate::rest::types::ErrorResponse;
use crate::service::AccessService;

#[derive(Clone)]
pub struct PermissionGate {
    pub access: Arc<AccessService>,
    pub primary: PermissionCode,
    pub associated: PermissionCode,
}

impl PermissionGate {
    pub fn new(
        access: Arc<AccessService>,
        primary: PermissionCode,
        associated: PermissionCode,
    ) -> Self {
        Self {
            access,
            primary,
            associated,
        }
    }
}

pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = header_value(&request, "X-User-ID") else {
        return error_json(StatusCode::UNAUTHORIZED, "X-User-ID header is required");
    };

    let tenant_id = header_value(&request, "X-Tenant-ID")
        .or_else(|| request.uri().query().and_then(tenant_from_query));

    let allowed = match gate
        .access
        .check_gate(&user_id, tenant_id.as_deref(), &gate.primary, &gate.associated)
        .await
    {
        Ok(allowed) => allowed,
        Err(e) => {
            error!(user_id = %user_id, error = %e, "failed to check permissions");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to check permissions");
        }
    };

    if allowed {
        next.run(request).await
    } else {
        error_json(StatusCode::FORBIDDEN, "permission denied")
    }
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn tenant_from_query(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("tenant_id="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_from_query_finds_the_parameter() {
        assert_eq!(tenant_from_query("tenant_id=t1"), Some("t1".to_string()));
        assert_eq!(
            tenant_from_query("a=b&tenant_id=t2&c=d"),
            Some("t2".to_string())
        );
        assert_eq!(tenant_from_query("a=b"), None);
        assert_eq!(tenant_from_query("tenant_id="), None);
    }
}
