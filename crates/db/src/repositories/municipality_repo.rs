//! Repository for the `municipalities` reference table.

use sqlx::PgPool;

use crate::models::municipality::Municipality;

pub struct MunicipalityRepo;

impl MunicipalityRepo {
    /// Find a municipality by its registry code.
    pub async fn find_by_id(
        pool: &PgPool,
        id: &str,
    ) -> Result<Option<Municipality>, sqlx::Error> {
        sqlx::query_as::<_, Municipality>(
            "SELECT id, name, uf FROM municipalities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List all municipalities ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<Municipality>, sqlx::Error> {
        sqlx::query_as::<_, Municipality>("SELECT id, name, uf FROM municipalities ORDER BY name")
            .fetch_all(pool)
            .await
    }
}
