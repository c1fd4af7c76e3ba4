use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use mockcord_storage::NewAuditLog;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::AppState;

/// Request-scoped slot the handlers fill in after tenant resolution and the
/// audit middleware reads on the way out. Injected into request extensions;
/// never process-wide.
#[derive(Clone, Default)]
pub struct TenantContext(Arc<Mutex<Option<Uuid>>>);

impl TenantContext {
    pub fn set(&self, tenant_id: Uuid) {
        *self.0.lock() = Some(tenant_id);
    }

    pub fn get(&self) -> Option<Uuid> {
        *self.0.lock()
    }
}

/// Wrap every handler with request/response capture. Requests whose path
/// ends in `/audit-logs` are exempt, otherwise the log browser would append
/// a fresh entry on every poll. A failure to write the entry is logged and
/// swallowed; the client's response is already final at that point.
pub async fn record(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let ctx = TenantContext::default();
    req.extensions_mut().insert(ctx.clone());

    if req.uri().path().ends_with("/audit-logs") {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let url = req.uri().to_string();

    let (req, request_body) = if method == Method::GET || method == Method::HEAD {
        (req, None)
    } else {
        buffer_request(req).await
    };

    let response = next.run(req).await;
    let response_status = i32::from(response.status().as_u16());
    let (response, response_body) = buffer_response(response).await;

    let entry = NewAuditLog {
        tenant_id: ctx.get(),
        method: method.to_string(),
        url,
        request_body,
        response_status,
        response_body,
        created_at: Utc::now(),
    };
    if let Err(err) = state.store().insert_audit_log(&entry).await {
        tracing::warn!(error = %err, "failed to record audit log entry");
    }

    response
}

async fn buffer_request(req: Request) -> (Request, Option<String>) {
    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let text = if bytes.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            };
            (Request::from_parts(parts, Body::from(bytes)), text)
        }
        Err(_) => (Request::from_parts(parts, Body::empty()), None),
    }
}

async fn buffer_response(response: Response) -> (Response, Option<String>) {
    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let text = if bytes.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            };
            (Response::from_parts(parts, Body::from(bytes)), text)
        }
        Err(_) => (Response::from_parts(parts, Body::empty()), None),
    }
}
