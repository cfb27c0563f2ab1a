use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use seatline_core::{Principal, Role};
use seatline_shared::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: UserId::new(self.sub.clone()),
            role: self.role,
        }
    }
}

/// Signs a token for `principal` valid for `ttl_seconds`.
pub fn issue_token(secret: &str, principal: &Principal, ttl_seconds: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: principal.user_id.to_string(),
        role: principal.role,
        exp: (Utc::now() + Duration::seconds(ttl_seconds)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    let token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    Ok(token_data.claims.principal())
}

// ============================================================================
// Middleware
// ============================================================================

/// Any signed-in passenger or admin. Injects the [`Principal`] into request extensions.
pub async fn user_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state, req.headers())?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state, req.headers())?;
    if !principal.is_admin() {
        return Err(AppError::AuthorizationError("Admin role required".to_string()));
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_round_trips_principal() {
        let token = issue_token("s3cret", &Principal::admin("ops-1"), 60).unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::default(),
        )
        .unwrap();

        assert_eq!(decoded.claims.principal(), Principal::admin("ops-1"));
    }
}
