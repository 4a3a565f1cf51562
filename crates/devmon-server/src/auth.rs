use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

/// Admin rights check for mutating endpoints.
///
/// The bearer token must equal `auth.admin_token`. With no token configured
/// every admin request is refused.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let presented = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let allowed = match (state.config.auth.admin_token.as_deref(), presented) {
        (Some(expected), Some(token)) => !expected.is_empty() && token == expected,
        _ => false,
    };

    if !allowed {
        tracing::warn!(
            trace_id = %trace_id,
            path = %req.uri().path(),
            has_token = presented.is_some(),
            "Admin request refused"
        );
        return error_response(
            StatusCode::FORBIDDEN,
            &trace_id,
            "forbidden",
            "admin rights required",
        );
    }

    next.run(req).await
}
