//! The identity contract supplied by the upstream gateway.
//!
//! Authentication mechanics (passwords, certificates, magic links) live
//! outside this system. Authenticated requests arrive carrying a resolved
//! identity which the platform trusts unconditionally.

use serde::{Deserialize, Serialize};

use crate::roles;
use crate::types::DbId;

/// A resolved, trusted identity for an authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// The caller's internal user id.
    pub user_id: DbId,
    /// Role name (e.g. `"admin"`, `"supervisor"`, `"consultant"`).
    pub role: String,
    /// Client organizations the caller holds a standing grant over.
    #[serde(default)]
    pub owned_client_ids: Vec<DbId>,
    /// Projects the caller holds a standing grant over.
    #[serde(default)]
    pub owned_project_ids: Vec<DbId>,
    /// Thematic hubs the caller holds a standing grant over.
    #[serde(default)]
    pub owned_hubs: Vec<String>,
}

impl Identity {
    pub fn is_elevated(&self) -> bool {
        roles::is_elevated(&self.role)
    }

    pub fn is_facilitator(&self) -> bool {
        roles::is_facilitator(&self.role)
    }
}
