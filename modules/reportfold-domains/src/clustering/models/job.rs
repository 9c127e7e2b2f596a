use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

pub const JOB_KIND_FULL: &str = "full";
pub const JOB_KIND_INCREMENTAL: &str = "incremental";

/// Durable record of one full or incremental run. A row with
/// `completed_at IS NULL` is the in-progress state; a partial unique index
/// guarantees at most one such row across all workers. Rows are finalized
/// exactly once and never mutated afterward.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClusteringJob {
    pub id: i64,
    pub job_kind: String,
    pub domain: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_ok: bool,
    pub buckets_created: i32,
    pub error_message: Option<String>,
}

/// Gating view over the job history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusteringStatus {
    pub in_progress: bool,
    pub has_successful_run: bool,
}

impl ClusteringJob {
    pub async fn status(pool: &PgPool) -> Result<ClusteringStatus> {
        let (in_progress, has_successful_run) = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM clustering_jobs WHERE completed_at IS NULL),
                EXISTS (SELECT 1 FROM clustering_jobs WHERE job_kind = $1 AND is_ok)
            "#,
        )
        .bind(JOB_KIND_FULL)
        .fetch_one(pool)
        .await?;

        Ok(ClusteringStatus {
            in_progress,
            has_successful_run,
        })
    }

    /// Insert the in-progress row for a new run. Returns `None` when another
    /// run won the race (the partial unique index turns it into a conflict).
    pub async fn try_start(
        pool: &PgPool,
        job_kind: &str,
        domain: Option<&str>,
    ) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO clustering_jobs (job_kind, domain)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(job_kind)
        .bind(domain)
        .fetch_optional(pool)
        .await?;

        if let Some(ref job) = job {
            info!(job_id = job.id, job_kind, "Clustering job started");
        }

        Ok(job)
    }

    /// Finalize the run exactly once: success with a bucket count, or
    /// failure with the captured error message.
    pub async fn complete(
        pool: &PgPool,
        job_id: i64,
        success: bool,
        buckets_created: u32,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE clustering_jobs
            SET completed_at = now(),
                is_ok = $2,
                buckets_created = $3,
                error_message = $4
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(job_id)
        .bind(success)
        .bind(buckets_created as i32)
        .bind(error)
        .execute(pool)
        .await?;

        info!(job_id, success, buckets_created, "Clustering job completed");
        Ok(())
    }
}
