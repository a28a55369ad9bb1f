use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, request::Parts},
    response::Response,
};

use stockflow_core::DomainError;
use stockflow_events::{ClientId, RoomId};
use stockflow_infra::ChangeOrigin;

use crate::app::errors;

/// Header naming the client that issued a mutation; its own connections are not notified.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
/// Header naming a room that should also hear about a mutation.
pub const ROOM_ID_HEADER: &str = "x-room-id";

/// Authenticated caller of a protected route (the token's `sub`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    subject: String,
}

impl PrincipalContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Originator of a mutating request, read from the `X-Client-ID` / `X-Room-ID` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin(pub ChangeOrigin);

#[async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        change_origin(&parts.headers)
            .map(RequestOrigin)
            .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_origin", e.to_string()))
    }
}

pub fn change_origin(headers: &HeaderMap) -> Result<ChangeOrigin, DomainError> {
    Ok(ChangeOrigin {
        client_id: header(headers, CLIENT_ID_HEADER)?.map(ClientId::parse).transpose()?,
        room_id: header(headers, ROOM_ID_HEADER)?.map(RoomId::parse).transpose()?,
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, DomainError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| DomainError::invalid_id(format!("{name} must be visible ASCII")))?
        .trim();
    Ok((!value.is_empty()).then_some(value))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn absent_headers_give_an_anonymous_origin() {
        assert_eq!(change_origin(&HeaderMap::new()).unwrap(), ChangeOrigin::default());
    }

    #[test]
    fn both_headers_are_read() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("tab-1"));
        headers.insert(ROOM_ID_HEADER, HeaderValue::from_static("inventory"));

        let origin = change_origin(&headers).unwrap();
        assert_eq!(origin.client_id.unwrap().as_str(), "tab-1");
        assert_eq!(origin.room_id.unwrap().as_str(), "inventory");
    }

    #[test]
    fn blank_header_counts_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(change_origin(&headers).unwrap().client_id, None);
    }

    #[test]
    fn non_ascii_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(ROOM_ID_HEADER, HeaderValue::from_bytes(b"caf\xe9").unwrap());
        assert!(change_origin(&headers).is_err());
    }
}
