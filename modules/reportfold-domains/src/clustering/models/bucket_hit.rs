use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

/// Hour-bucketed hit counters backing per-bucket histograms. Counters
/// follow actual membership: moving a report decrements its old bucket's
/// counter and increments the new one's.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BucketHit {
    pub id: i64,
    pub bucket_id: i64,
    pub begin: DateTime<Utc>,
    pub count: i32,
}

impl BucketHit {
    pub async fn increment<'e, E: PgExecutor<'e>>(
        executor: E,
        bucket_id: i64,
        reported_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bucket_hits (bucket_id, begin, count)
            VALUES ($1, date_trunc('hour', $2::timestamptz), 1)
            ON CONFLICT (bucket_id, begin)
                DO UPDATE SET count = bucket_hits.count + 1
            "#,
        )
        .bind(bucket_id)
        .bind(reported_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn decrement<'e, E: PgExecutor<'e>>(
        executor: E,
        bucket_id: i64,
        reported_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bucket_hits
            SET count = count - 1
            WHERE bucket_id = $1
              AND begin = date_trunc('hour', $2::timestamptz)
              AND count > 0
            "#,
        )
        .bind(bucket_id)
        .bind(reported_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}
