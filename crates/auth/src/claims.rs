use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JWT claims model (transport-agnostic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the authenticated client identity.
    pub sub: String,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn new(sub: impl Into<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: sub.into(),
            issued_at,
            expires_at,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token could not be decoded: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has no subject")]
    MissingSubject,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Check the claim time window and subject. Signature checks happen in the validator.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.sub.trim().is_empty() {
        return Err(TokenError::MissingSubject);
    }
    if claims.expires_at <= claims.issued_at {
        return Err(TokenError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn time_window_is_enforced() {
        let now = Utc::now();
        let claims = JwtClaims::new("alice", now - Duration::minutes(1), now + Duration::minutes(1));
        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(validate_claims(&claims, now + Duration::minutes(2)), Err(TokenError::Expired));
        assert_eq!(validate_claims(&claims, now - Duration::minutes(2)), Err(TokenError::NotYetValid));

        let inverted = JwtClaims::new("alice", now, now);
        assert_eq!(validate_claims(&inverted, now), Err(TokenError::InvalidTimeWindow));
    }

    #[test]
    fn blank_subject_is_rejected() {
        let now = Utc::now();
        let claims = JwtClaims::new("  ", now, now + Duration::minutes(1));
        assert_eq!(validate_claims(&claims, now), Err(TokenError::MissingSubject));
    }
}
