pub mod jwt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use crate::{
    error::AppError,
    state::AppState,
    verification::{Actor, Role},
};

/// The caller resolved from a bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Actor);

impl AuthenticatedUser {
    pub fn actor(&self) -> &Actor {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;
        let role = Role::parse(&claims.role)
            .ok_or_else(|| AppError::forbidden(format!("unknown role `{}`", claims.role)))?;

        Ok(AuthenticatedUser(Actor::new(claims.sub, role)))
    }
}
