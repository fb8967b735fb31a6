use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use super::request::non_blank;
use super::response::ApiError;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant resolved from the `x-tenant-id` header, falling back to the
/// `tenant_id` query parameter. Values are trimmed; blank counts as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Deserialize)]
struct TenantQuery {
    tenant_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Some(tenant) = non_blank(header) {
            return Ok(TenantId(tenant.to_string()));
        }

        let query = Query::<TenantQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.tenant_id);
        non_blank(query.as_deref())
            .map(|t| TenantId(t.to_string()))
            .ok_or(ApiError::MissingTenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<TenantId, ApiError> {
        let (mut parts, _) = request.into_parts();
        TenantId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_header_is_trimmed() {
        let request = Request::builder()
            .uri("/v1/agent/run")
            .header(TENANT_HEADER, "  tenant-a ")
            .body(())
            .unwrap();

        assert_eq!(extract(request).await.unwrap().as_str(), "tenant-a");
    }

    #[tokio::test]
    async fn test_query_fallback() {
        let request = Request::builder()
            .uri("/v1/events?tenant_id=clinic-2")
            .body(())
            .unwrap();

        assert_eq!(extract(request).await.unwrap().as_str(), "clinic-2");
    }

    #[tokio::test]
    async fn test_missing_tenant() {
        let request = Request::builder()
            .uri("/v1/events")
            .header(TENANT_HEADER, "   ")
            .body(())
            .unwrap();

        assert!(matches!(extract(request).await, Err(ApiError::MissingTenant)));
    }
}
