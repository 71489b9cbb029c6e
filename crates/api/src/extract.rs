//! Caller Identity
//!
//! Roles arrive in request headers set by the fronting proxy; authentication
//! happens before requests reach this server.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use incident_core::{Actor, Role};

pub const ROLE_HEADER: &str = "x-user-role";
pub const NAME_HEADER: &str = "x-user-name";

/// Actor taken from `X-User-Role` / `X-User-Name`. A missing role means visitor.
pub struct CallerActor(pub Actor);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, String> {
    let role = match header(headers, ROLE_HEADER) {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Visitor,
    };
    let identity = header(headers, NAME_HEADER).unwrap_or(role.as_str());
    Ok(Actor::new(role, identity))
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerActor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
            .map(CallerActor)
            .map_err(|e| (StatusCode::BAD_REQUEST, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_missing_role_is_visitor() {
        let actor = actor_from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(actor.role, Role::Visitor);
        assert_eq!(actor.identity, "visitor");
    }

    #[test]
    fn test_role_and_name() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLE_HEADER, HeaderValue::from_static("Operator2"));
        headers.insert(NAME_HEADER, HeaderValue::from_static("bob"));
        let actor = actor_from_headers(&headers).unwrap();
        assert_eq!(actor, Actor::new(Role::Operator2, "bob"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLE_HEADER, HeaderValue::from_static("root"));
        assert!(actor_from_headers(&headers).is_err());
    }
}
