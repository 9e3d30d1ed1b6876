use std::future::{ready, Ready};

use actix_web::{dev::Payload, error::ErrorUnauthorized, Error, FromRequest, HttpRequest};
use serde::{Deserialize, Serialize};

/// Set by the upstream auth layer once the session is verified
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Agent,
}

impl UserRole {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            UserRole::Admin
        } else {
            UserRole::Agent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn new(user_id: &str, role: UserRole) -> Self {
        Self {
            user_id: user_id.to_string(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match header(req, USER_ID_HEADER) {
            Some(user_id) => ready(Ok(AuthenticatedUser {
                user_id: user_id.to_string(),
                role: header(req, USER_ROLE_HEADER)
                    .map(UserRole::parse)
                    .unwrap_or_default(),
            })),
            None => ready(Err(ErrorUnauthorized("User not authenticated"))),
        }
    }
}
