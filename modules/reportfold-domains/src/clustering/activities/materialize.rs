//! Turning cluster drafts into persisted clusters and buckets.
//!
//! Each cluster is one transactional unit (cluster row + member
//! reassignment), and each bucket likewise (bucket row + member bucket
//! references + hit counters). Distinct clusters are independent: a later
//! failure leaves earlier clusters committed, and the next full run's
//! cleanup pass is the recovery path.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use reportfold_core::ClusteringParams;

use crate::clustering::models::bucket::{
    build_cluster_signature, cluster_bucket_description, DEFAULT_BUCKET_PRIORITY,
};
use crate::clustering::models::{Bucket, BucketHit, Cluster};

use super::cluster_batch::ClusterDraft;

/// Delete prior cluster state (optionally domain-scoped) so a full run is
/// idempotent. Returns (clusters deleted, buckets deleted).
pub async fn cleanup_cluster_state(
    pool: &PgPool,
    params: &ClusteringParams,
    domain: Option<&str>,
) -> Result<(u64, u64)> {
    let clusters_deleted = Cluster::delete_scoped(pool, domain, params.bulk_chunk_size).await?;
    let buckets_deleted =
        Bucket::delete_cluster_buckets(pool, domain, params.bulk_chunk_size).await?;
    Ok((clusters_deleted, buckets_deleted))
}

/// Persist drafts as clusters and materialize one bucket per cluster.
/// Returns the number of buckets created.
pub async fn materialize_clusters(
    pool: &PgPool,
    params: &ClusteringParams,
    drafts: &[ClusterDraft],
) -> Result<u32> {
    let mut buckets_created = 0u32;

    for draft in drafts {
        if draft.reports.is_empty() {
            warn!(domain = %draft.domain, "Skipping cluster draft without members");
            continue;
        }

        let member_ids: Vec<i64> = draft.reports.iter().map(|r| r.id).collect();
        let cluster = Cluster::create_with_members(
            pool,
            &draft.domain,
            draft.centroid_report_id,
            &member_ids,
            params.bulk_chunk_size,
        )
        .await?;

        create_bucket_for_cluster(pool, params, &draft.domain, cluster.id, &member_ids).await?;
        buckets_created += 1;
    }

    info!(buckets_created, "Materialized cluster buckets");
    Ok(buckets_created)
}

/// Create the bucket for a cluster and move its members in, all or nothing.
/// Hit counters follow: decrement the previous bucket's hour counter for
/// each moved report, increment the new one's.
async fn create_bucket_for_cluster(
    pool: &PgPool,
    params: &ClusteringParams,
    domain: &str,
    cluster_id: i64,
    member_ids: &[i64],
) -> Result<i64> {
    let signature = build_cluster_signature(domain, cluster_id);
    let description = cluster_bucket_description(domain, cluster_id);

    let mut tx = pool.begin().await?;

    let bucket_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO buckets (domain, signature, description, priority)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(domain)
    .bind(&signature)
    .bind(&description)
    .bind(DEFAULT_BUCKET_PRIORITY)
    .fetch_one(&mut *tx)
    .await?;

    // Current bucket references come from the database, not the draft:
    // another materialization in this run may already have moved a member.
    let moves: Vec<(i64, Option<i64>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, bucket_id, reported_at FROM reports WHERE id = ANY($1) ORDER BY id",
    )
    .bind(member_ids)
    .fetch_all(&mut *tx)
    .await?;

    for (_, previous_bucket, reported_at) in &moves {
        if let Some(previous) = previous_bucket {
            BucketHit::decrement(&mut *tx, *previous, *reported_at).await?;
        }
        BucketHit::increment(&mut *tx, bucket_id, *reported_at).await?;
    }

    for chunk in member_ids.chunks(params.bulk_chunk_size.max(1)) {
        sqlx::query("UPDATE reports SET bucket_id = $1 WHERE id = ANY($2)")
            .bind(bucket_id)
            .bind(chunk)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    info!(domain, cluster_id, bucket_id, members = member_ids.len(), "Created cluster bucket");
    Ok(bucket_id)
}
