//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - Operation-specific input/output DTOs where plain CRUD is not enough

pub mod audit;
pub mod diagnostic;
pub mod municipality;
pub mod participant;
pub mod session;
pub mod version;
