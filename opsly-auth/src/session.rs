//! # Session Issuer
//!
//! Mints and validates the signed, self-contained session token. Tokens
//! carry `(user id, tenant id, role)` plus issued-at and expiry; nothing
//! is persisted and there is no revocation list. Validation here checks
//! signature and expiry only; the authentication gate re-checks live
//! tenant/user activity on every request.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use opsly_core::{AppConfigSnapshot, OpslyError, Role, User};

/// Default token lifetime: 3 days.
const DEFAULT_TTL_SECS: u64 = 259_200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Tenant id.
    pub tid: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Build from configuration. The signing secret is required; its
    /// absence already failed startup validation, so this only reads.
    pub fn from_config(config: &AppConfigSnapshot) -> Result<Self> {
        let secret = config.require("auth.jwt.secret")?;
        let ttl = Duration::from_secs(
            config
                .get_u64("auth.token_ttl_secs")
                .unwrap_or(DEFAULT_TTL_SECS),
        );
        Ok(Self::new(secret, ttl))
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            tid: user.tenant_id.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|err| {
            OpslyError::general_error("Token signing failed")
                .with_source(err.into())
                .into_anyhow()
        })
    }

    /// Signature + expiry check only, with zero leeway.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            let opsly = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    OpslyError::not_authenticated("Session expired")
                }
                _ => OpslyError::not_authenticated("Invalid session"),
            };
            opsly.with_source(err.into()).into_anyhow()
        })?;
        Ok(data.claims)
    }
}
