//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Multi-step business transactions
//! (diagnostic saves, ledger appends) live here too, so every caller goes
//! through the same transactional boundaries.

pub mod audit_repo;
pub mod diagnostic_repo;
pub mod municipality_repo;
pub mod participant_repo;
pub mod session_repo;
pub mod version_repo;

pub use audit_repo::AuditRepo;
pub use diagnostic_repo::DiagnosticRepo;
pub use municipality_repo::MunicipalityRepo;
pub use participant_repo::ParticipantRepo;
pub use session_repo::SessionRepo;
pub use version_repo::VersionRepo;
