// src/auth.rs

//! Authorization gate.
//!
//! Handlers never look at cookies or headers themselves: they take a
//! `Principal` (any signed-in user) or `Staff` (admin or instructor) argument
//! and pass it on explicitly.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use crate::{
    config::Config,
    error::AppError,
    utils::jwt::{Role, verify_jwt},
};

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

/// A principal with the admin or instructor role.
#[derive(Debug, Clone, Copy)]
pub struct Staff(pub Principal);

impl<S> FromRequestParts<S> for Principal
where
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);

        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_value(&parts.headers, &config.auth_cookie_name))
            .ok_or_else(|| AppError::AuthError("Missing credentials".to_string()))?;

        let claims = verify_jwt(token, &config.jwt_secret)?;

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

        Ok(Principal {
            user_id,
            role: claims.role,
        })
    }
}

impl<S> FromRequestParts<S> for Staff
where
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;

        if principal.is_staff() {
            Ok(Staff(principal))
        } else {
            Err(AppError::Forbidden("Staff access required".to_string()))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Finds `name` among all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
