//! opsly-server: the HTTP surface over registration, login and the
//! authentication gate. The binary lives in `main.rs`; everything else
//! is exported so integration tests can drive the router directly.

pub mod app;
pub mod error;
pub mod gate;
pub mod routes;
pub mod state;

pub use app::{load_config, router};
pub use error::ApiError;
pub use state::AppState;
