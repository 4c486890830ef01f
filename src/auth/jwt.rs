//! JWT Token Handler
//! Mission: Generate and validate JWT tokens securely

use crate::auth::models::Claims;
use crate::config::TokenConfig;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a token was refused. All of these surface to clients as the same 401.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token claims are not acceptable (issuer, audience or not-before)")]
    InvalidClaims,
    #[error("failed to encode token")]
    Encoding,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::ImmatureSignature
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => TokenError::InvalidClaims,
            _ => TokenError::Malformed,
        }
    }
}

/// JWT Handler for token operations (HS256, stateless)
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    default_ttl: Duration,
    validation: Validation,
}

impl JwtHandler {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(std::slice::from_ref(&config.iss));
        validation.set_audience(std::slice::from_ref(&config.iss));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.iss.clone(),
            default_ttl: config.exp,
            validation,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign a token asserting `subject` that expires `ttl` from now.
    pub fn issue_token(&self, subject: i64, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: subject.to_string(),
            exp: now.saturating_add(ttl.as_secs()),
            iat: now,
            nbf: now,
            iss: self.issuer.clone(),
            aud: self.issuer.clone(),
        };

        debug!(subject, ttl_secs = ttl.as_secs(), "Issuing JWT");
        self.encode_claims(&claims)
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|_| TokenError::Encoding)
    }

    /// Verify signature, expiry, issuer and audience, then return the claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(decoded.claims)
    }
}
