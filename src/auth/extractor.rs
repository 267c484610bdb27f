use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::token;
use crate::db;
use crate::error::AppError;
use crate::state::SharedState;

/// The caller behind a valid, unexpired token.
///
/// Extracting this is the "is authenticated" half of the access policy;
/// handlers that need more call [`AuthUser::require_admin`] before touching
/// any data.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub token_id: i64,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_superuser {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth_header) = parts.headers.get("authorization") else {
            return Err(AppError::Unauthorized(
                "Authentication credentials were not provided.".to_string(),
            ));
        };

        let raw = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid token header.".to_string()))?;
        let presented = token::from_header(raw)
            .ok_or_else(|| AppError::Unauthorized("Invalid token header.".to_string()))?;

        let owner = db::auth_tokens::find_owner(&state.pool, &token::digest(presented))
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid token.".to_string()))?;

        if !owner.is_active {
            return Err(AppError::Unauthorized(
                "User inactive or deleted.".to_string(),
            ));
        }

        Ok(AuthUser {
            user_id: owner.user_id,
            username: owner.username,
            is_superuser: owner.is_superuser,
            token_id: owner.token_id,
        })
    }
}
