use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::{errors::ApiError, repo_types::User},
    state::AppState,
};

/// User resolved from a verified bearer token, placed in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Returns the token of a `Bearer <token>` header value; the scheme is case-insensitive.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Route layer for protected endpoints: continues with a `CurrentUser` or
/// answers 401 before the handler runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            warn!("missing or malformed Authorization header");
            ApiError::Unauthorized
        })?;

    let claims = state.keys.verify(token).map_err(|e| {
        warn!(error = %e, "bearer token rejected");
        ApiError::Unauthorized
    })?;

    let user = state
        .store
        .find_by_id(claims.id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.id, "token subject no longer exists");
            ApiError::Unauthorized
        })?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
