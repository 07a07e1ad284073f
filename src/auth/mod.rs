pub mod jwt;
pub mod password;

use std::fmt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Worker,
    schema::workers,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Central,
    Tarotista,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Central, Role::Tarotista];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Central => "central",
            Role::Tarotista => "tarotista",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity taken from a valid bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
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

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// The active worker row behind the bearer token. Every role check goes
/// through this extractor.
#[derive(Debug, Clone)]
pub struct CurrentWorker {
    pub user: AuthenticatedUser,
    pub worker: Worker,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentWorker {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        let mut conn = state.db()?;
        let worker = workers::table
            .filter(workers::user_id.eq(user.user_id))
            .first::<Worker>(&mut conn)
            .optional()?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user.user_id, "authenticated user has no worker row");
                AppError::forbidden()
            })?;

        if !worker.is_active {
            tracing::warn!(worker_id = %worker.id, "inactive worker rejected");
            return Err(AppError::forbidden());
        }

        let role = Role::parse(&worker.role).ok_or_else(|| {
            tracing::error!(worker_id = %worker.id, role = %worker.role, "unknown worker role");
            AppError::forbidden()
        })?;

        Ok(CurrentWorker { user, worker, role })
    }
}

impl CurrentWorker {
    pub fn id(&self) -> Uuid {
        self.worker.id
    }

    pub fn require(&self, allowed: &[Role]) -> AppResult<()> {
        authorize(self.role, allowed)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Central)
    }

    /// Staff may look at anyone; tarotistas only at themselves.
    pub fn require_view_of(&self, worker_id: Uuid) -> AppResult<()> {
        if self.is_staff() || self.worker.id == worker_id {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }

    /// Resolves an optional `worker_id` query parameter to a target the
    /// caller is allowed to see, defaulting to the caller.
    pub fn target(&self, requested: Option<Uuid>) -> AppResult<Uuid> {
        match requested {
            Some(worker_id) => {
                self.require_view_of(worker_id)?;
                Ok(worker_id)
            }
            None => Ok(self.worker.id),
        }
    }
}

pub fn authorize(role: Role, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" tarotista "), Some(Role::Tarotista));
        assert_eq!(Role::parse("supervisor"), None);
    }

    #[test]
    fn authorize_rejects_roles_outside_the_allowed_set() {
        assert!(authorize(Role::Admin, &[Role::Admin]).is_ok());
        assert!(authorize(Role::Central, &[Role::Admin, Role::Central]).is_ok());
        let err = authorize(Role::Tarotista, &[Role::Admin, Role::Central]).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
