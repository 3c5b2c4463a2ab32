//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user in `X-User-Id` and their role in `X-User-Role`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::EcommerceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

#[derive(Clone, Copy, Debug)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
        let user_id = header(USER_ID_HEADER).and_then(|v| Uuid::parse_str(v).ok()).ok_or_else(|| {
            tracing::debug!(path = %parts.uri.path(), "Missing or invalid user id header");
            EcommerceError::Unauthorized
        })?;
        let role = match header(USER_ROLE_HEADER) {
            Some(r) if r.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        };
        Ok(Self { user_id, role })
    }
}

/// An [`Identity`] with the ADMIN role.
#[derive(Clone, Copy, Debug)]
pub struct AdminIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            tracing::warn!(user_id = %identity.user_id, path = %parts.uri.path(), "Admin route refused");
            return Err(EcommerceError::Forbidden);
        }
        Ok(Self(identity))
    }
}
