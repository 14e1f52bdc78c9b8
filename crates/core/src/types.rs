/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Municipality identifiers come from the national registry and are opaque
/// digit strings, not database serials.
pub type MunicipalityId = String;
