//! bcrypt hashing and verification for admin and shared secrets.

use anyhow::Result;
use bcrypt::{hash, verify, DEFAULT_COST};

use opsly_core::OpslyError;

/// Hash a plaintext secret. `cost` below bcrypt's minimum falls back to
/// the library default; tests lower it via `auth.hash_cost`.
pub fn hash_secret(plain: &str, cost: Option<u32>) -> Result<String> {
    let cost = match cost {
        Some(c) if c >= 4 => c,
        _ => DEFAULT_COST,
    };
    hash(plain, cost).map_err(|err| {
        OpslyError::general_error("Secret hashing failed")
            .with_source(err.into())
            .into_anyhow()
    })
}

/// Constant-style verification: a malformed stored hash verifies false
/// (and is logged) rather than erroring, so the login loop stays total.
pub fn verify_secret(plain: &str, hashed: &str) -> bool {
    match verify(plain, hashed) {
        Ok(ok) => ok,
        Err(err) => {
            tracing::warn!(error = %err, "stored secret hash failed to parse");
            false
        }
    }
}
