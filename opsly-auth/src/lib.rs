//! opsly-auth: credential resolution (bcrypt) and session issuance
//! (HS256 JWT) for the Opsly back-office service.

pub mod resolver;
pub mod secrets;
pub mod session;

pub use resolver::{CredentialResolver, LoginOutcome};
pub use secrets::{hash_secret, verify_secret};
pub use session::{Claims, SessionIssuer};
