//! Identity of the caller, as forwarded by the gateway in front of this
//! service.

use crate::api::AppState;
use crate::domain::UserId;
use crate::error::AppError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const USER_HEADER: &str = "x-user-id";
pub const TIMEZONE_HEADER: &str = "x-timezone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user: UserId,
    /// IANA name; unknown names resolve to UTC downstream.
    pub timezone: String,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = header(parts, USER_HEADER)
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId::new)
            .ok_or_else(|| AppError::BadRequest(format!("Missing or invalid {} header", USER_HEADER)))?;

        let timezone = header(parts, TIMEZONE_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| state.config.default_timezone.clone());

        Ok(Caller { user, timezone })
    }
}
