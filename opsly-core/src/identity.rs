//! The per-request identity context.
//!
//! Attached by the authentication gate after a token has been validated
//! and the tenant + user have been re-fetched live. Downstream handlers
//! read this instead of touching tokens or stores themselves.

use serde::Serialize;

use crate::user::Role;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub tenant_id: String,
    pub role: Role,
    pub email: String,
    pub tenant_display_name: String,
}
