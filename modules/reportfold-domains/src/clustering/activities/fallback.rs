//! Coarse per-domain bucketing for reports nothing else matched.

use anyhow::Result;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use reportfold_core::ClusteringParams;

use crate::chunked::for_each_chunk;
use crate::clustering::models::{Bucket, TriageReport};

/// Domain → fallback bucket id, scoped to one run. Owned by the run and
/// passed down explicitly; a process-wide cache would go stale across runs
/// and leak between concurrent workers.
#[derive(Debug, Default)]
pub struct DomainBucketCache {
    map: HashMap<String, i64>,
}

impl DomainBucketCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, domain: &str) -> Option<i64> {
        self.map.get(domain).copied()
    }

    fn insert(&mut self, domain: &str, bucket_id: i64) {
        self.map.insert(domain.to_string(), bucket_id);
    }
}

/// Assign the given reports to plain per-domain buckets, finding or
/// creating one bucket per domain. Returns the number of reports bucketed.
pub async fn apply_domain_fallback(
    pool: &PgPool,
    params: &ClusteringParams,
    cache: &mut DomainBucketCache,
    reports: &[TriageReport],
) -> Result<u64> {
    if reports.is_empty() {
        return Ok(0);
    }

    info!(
        count = reports.len(),
        "Applying domain-based bucketing to reports that didn't cluster"
    );

    let mut ids_by_domain: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for report in reports {
        ids_by_domain
            .entry(report.domain.as_str())
            .or_default()
            .push(report.id);
    }

    let mut bucketed = 0u64;
    for (domain, report_ids) in ids_by_domain {
        let bucket_id = match cache.get(domain) {
            Some(id) => id,
            None => {
                let id = match Bucket::find_fallback_for_domain(pool, domain).await? {
                    Some(id) => id,
                    None => Bucket::create_fallback(pool, domain).await?,
                };
                cache.insert(domain, id);
                id
            }
        };

        bucketed += for_each_chunk(&report_ids, params.bulk_chunk_size, |chunk| async move {
            let result = sqlx::query("UPDATE reports SET bucket_id = $1 WHERE id = ANY($2)")
                .bind(bucket_id)
                .bind(&chunk)
                .execute(pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await?;
    }

    info!(bucketed, "Applied domain-based bucketing");
    Ok(bucketed)
}
