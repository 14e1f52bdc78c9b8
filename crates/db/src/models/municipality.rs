//! Municipality registry models.
//!
//! The registry is reference data seeded by migration; the platform reads it
//! for default session titles and existence checks, never writes it.

use serde::Serialize;
use sqlx::FromRow;

/// One municipality, keyed by its national registry code.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Municipality {
    pub id: String,
    pub name: String,
    /// Two-letter state code.
    pub uf: String,
}

impl Municipality {
    /// Display form used for default session and diagnostic titles.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.uf)
    }
}
