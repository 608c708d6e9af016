//! Role gate for management routes
//!
//! The acting user is identified by `userId` in the request body when the
//! body carries one, otherwise by the `x-user-id` header. There is no
//! credential check beyond the lookup.

use axum::http::HeaderMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Role, User};
use crate::store::Repository;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Pick the acting user id: body first, then header.
pub fn acting_user_id<'a>(headers: &'a HeaderMap, body_user_id: Option<&'a str>) -> Option<&'a str> {
    body_user_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| {
            headers
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|id| !id.trim().is_empty())
        })
}

/// Resolve the acting user and require `role`.
///
/// Missing id is 401, unknown user is 404, wrong role is 403.
pub async fn require_role(
    repo: &dyn Repository,
    headers: &HeaderMap,
    body_user_id: Option<&str>,
    role: Role,
) -> Result<User> {
    let user_id = acting_user_id(headers, body_user_id)
        .ok_or_else(|| Error::unauthorized("User ID is missing"))?;

    let user = repo
        .find_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;

    if user.role != role {
        debug!(user_id, required = %role, actual = %user.role, "role check failed");
        return Err(Error::forbidden("Insufficient permissions"));
    }

    Ok(user)
}
