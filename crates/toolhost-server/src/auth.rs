//! Bearer authentication middleware (§4.5: "Authentication").

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Reject the request before any further processing unless it presents
/// the configured bearer credential, via either the `Authorization`
/// header or a `token` query parameter. A `None` configured token
/// disables auth entirely.
pub async fn require_bearer_token(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let header_token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let query_token = request.uri().query().and_then(|query| {
        url_encoded_param(query, "token")
    });

    if header_token == Some(expected) || query_token.as_deref() == Some(expected) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn url_encoded_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name == key {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_query_param_among_others() {
        assert_eq!(url_encoded_param("a=1&token=secret&b=2", "token"), Some("secret".to_string()));
        assert_eq!(url_encoded_param("a=1", "token"), None);
    }
}
