//! Authentication Middleware for Axum
//!
//! Attaches [`RouteRequirements`] to a router and runs the guard composer on
//! every request:
//!
//! ```ignore
//! let guard = auth.route_guard(RouteRequirements::bearer().with_permissions(["coffees:create"]));
//! Router::new()
//!     .route("/coffees", post(create_coffee))
//!     .route_layer(middleware::from_fn_with_state(guard, enforce));
//! ```
//!
//! Handlers read the established identity with [`ActiveUser`] or
//! [`MaybeUser`].

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::{AuthError, ErrorResponse};
use crate::guard::{GuardComposer, RouteRequirements};
use crate::types::Identity;

/// Middleware state: the composer plus one route's requirements
#[derive(Clone)]
pub struct RouteGuard {
    composer: GuardComposer,
    route: Arc<RouteRequirements>,
}

impl RouteGuard {
    pub fn new(composer: GuardComposer, route: RouteRequirements) -> Self {
        Self {
            composer,
            route: Arc::new(route),
        }
    }

    pub fn requirements(&self) -> &RouteRequirements {
        &self.route
    }
}

/// Verify the request against the route and expose the identity to handlers
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn enforce(State(guard): State<RouteGuard>, mut req: Request, next: Next) -> Response {
    match guard.composer.verify_and_guard(req.headers(), &guard.route).await {
        Ok(Some(identity)) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Ok(None) => next.run(req).await,
        Err(e) => auth_error_response(&e),
    }
}

/// Create error response for authentication errors
fn auth_error_response(error: &AuthError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_string(&ErrorResponse::from(error)).unwrap_or_default();

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        auth_error_response(&self)
    }
}

// =============================================================================
// Axum Extractors
// =============================================================================

/// Extractor for the authenticated identity
/// Returns 401 if the guard did not establish one
pub struct ActiveUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for ActiveUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(ActiveUser)
            .ok_or_else(|| auth_error_response(&AuthError::Unauthorized))
    }
}

/// Extractor for the identity on routes that also accept anonymous calls
pub struct MaybeUser(pub Option<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<Identity>().cloned()))
    }
}
