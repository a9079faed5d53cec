//! Axum middleware enforcing Dome governance on incoming requests.
//!
//! Each request is mapped to an action/resource pair and evaluated against
//! the local policy bundle. Denied requests receive `403 Forbidden` with the
//! denial reason; checker errors fail open.
//!
//! The client is taken from request extensions when present, falling back to
//! the global client. With neither, requests pass through untouched:
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/users", get(list_users))
//!     .layer(axum::middleware::from_fn(governance_middleware))
//!     .layer(Extension(client));
//! ```

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::{Client, CheckRequest};

/// Middleware that evaluates every request against the policy bundle.
pub async fn governance_middleware(request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<Client>()
        .cloned()
        .or_else(crate::global_client);
    let Some(client) = client else {
        return next.run(request).await;
    };

    let action = method_action(request.method());
    let resource = request.uri().path().trim_start_matches('/').to_string();

    let decision = client
        .check(CheckRequest {
            action: action.clone(),
            resource,
            ..CheckRequest::default()
        })
        .await;

    match decision {
        Ok(decision) if !decision.allowed => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                reason = %decision.reason,
                "request denied"
            );
            (
                StatusCode::FORBIDDEN,
                format!("Forbidden: {}", decision.reason),
            )
                .into_response()
        }
        Ok(_) => next.run(request).await,
        Err(err) => {
            // Fail open on checker errors.
            error!(error = %err, "policy check error");
            next.run(request).await
        }
    }
}

fn method_action(method: &Method) -> String {
    match *method {
        Method::GET | Method::HEAD => "read".to_string(),
        Method::POST => "create".to_string(),
        Method::PUT | Method::PATCH => "update".to_string(),
        Method::DELETE => "delete".to_string(),
        _ => method.as_str().to_lowercase(),
    }
}
