use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cluster {
    pub id: i64,
    pub domain: String,
    pub centroid_report_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Cluster {
    /// Create a cluster and point its member reports at it, as a single
    /// transactional unit. Member updates run in bounded chunks.
    pub async fn create_with_members(
        pool: &PgPool,
        domain: &str,
        centroid_report_id: i64,
        member_ids: &[i64],
        chunk_size: usize,
    ) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let cluster = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO clusters (domain, centroid_report_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(domain)
        .bind(centroid_report_id)
        .fetch_one(&mut *tx)
        .await?;

        for chunk in member_ids.chunks(chunk_size.max(1)) {
            sqlx::query("UPDATE reports SET cluster_id = $1 WHERE id = ANY($2)")
                .bind(cluster.id)
                .bind(chunk)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(cluster)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM clusters WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Delete all clusters, optionally scoped to a domain, clearing member
    /// back-references first. Returns the number of clusters deleted.
    pub async fn delete_scoped(
        pool: &PgPool,
        domain: Option<&str>,
        chunk_size: usize,
    ) -> Result<u64> {
        let ids: Vec<i64> = match domain {
            Some(domain) => {
                sqlx::query_scalar("SELECT id FROM clusters WHERE domain = $1 ORDER BY id")
                    .bind(domain)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT id FROM clusters ORDER BY id")
                    .fetch_all(pool)
                    .await?
            }
        };

        if ids.is_empty() {
            return Ok(0);
        }

        let pool_ref = pool;
        crate::chunked::for_each_chunk(&ids, chunk_size, |chunk| async move {
            sqlx::query("UPDATE reports SET cluster_id = NULL WHERE cluster_id = ANY($1)")
                .bind(&chunk)
                .execute(pool_ref)
                .await?;
            Ok(0)
        })
        .await?;

        let deleted = crate::chunked::for_each_chunk(&ids, chunk_size, |chunk| async move {
            let result = sqlx::query("DELETE FROM clusters WHERE id = ANY($1)")
                .bind(&chunk)
                .execute(pool_ref)
                .await?;
            Ok(result.rows_affected())
        })
        .await?;

        info!(deleted, domain = domain.unwrap_or("<all>"), "Deleted existing clusters");
        Ok(deleted)
    }
}
