//! Password hashing and bearer-token authentication.
//!
//! Passwords are stored as PHC strings; access tokens are signed JWTs with
//! `sub` and `exp` claims. Token verification rejects expired tokens.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{HypervisorError, HypervisorResult};

/// Claims carried by an access token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the username
    pub sub: String,
    /// Expiry as a unix timestamp
    pub exp: i64,
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> HypervisorResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| HypervisorError::Internal(format!("Password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Check a plain password against a stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> HypervisorResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| HypervisorError::Internal(format!("Stored password hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Issue a signed access token for `username`.
pub fn issue_token(username: &str, config: &AuthConfig) -> HypervisorResult<String> {
    let expires = Utc::now() + Duration::minutes(config.token_ttl_minutes);
    let claims = Claims {
        sub: username.to_string(),
        exp: expires.timestamp(),
    };
    let header = Header::new(config.algorithm()?);
    let token = encode(
        &header,
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )?;
    Ok(token)
}

/// Verify a token's signature and expiry, returning its claims.
pub fn verify_token(token: &str, config: &AuthConfig) -> HypervisorResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret_key.as_bytes()),
        &Validation::new(config.algorithm()?),
    )?;
    Ok(data.claims)
}

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> HypervisorResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| HypervisorError::Validation("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| HypervisorError::Validation("Malformed Authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| HypervisorError::Validation("Token must be a Bearer token".to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn password_roundtrip() {
        // Arrange
        let hash = hash_password("hunter2").unwrap();

        // Assert: correct password verifies, wrong one does not
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn token_roundtrip() {
        // Arrange
        let config = AuthConfig::default();

        // Act
        let token = issue_token("alice", &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();

        // Assert
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let config = AuthConfig::default();
        let other = AuthConfig {
            secret_key: "not_the_same_key".to_string(),
            ..AuthConfig::default()
        };

        let token = issue_token("alice", &other).unwrap();

        assert!(matches!(
            verify_token(&token, &config),
            Err(HypervisorError::Unauthorized(_))
        ));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            bearer_token(&headers),
            Err(HypervisorError::Validation(_))
        ));
    }
}
