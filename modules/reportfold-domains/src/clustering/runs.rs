//! Run orchestration: the two entry points and the durable job gate.
//!
//! Both run kinds consult the ClusteringJob history before starting and
//! finalize their job row exactly once at the end. A failed run records the
//! error on the row and still propagates it, so schedulers can alert off
//! either channel.

use anyhow::Result;
use std::collections::HashSet;
use tracing::{error, info, warn};

use reportfold_core::ServerDeps;

use crate::clustering::activities::{
    apply_domain_fallback, build_cluster_index, cleanup_cluster_state, cluster_domain_reports,
    find_closest_cluster, group_by_domain, materialize_clusters, DomainBucketCache,
};
use crate::clustering::models::{
    Bucket, ClusteringJob, ClusteringStatus, Report, TriageReport, JOB_KIND_FULL,
    JOB_KIND_INCREMENTAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A run of either kind is already in progress.
    RunInProgress,
    /// No full run has ever succeeded, so incremental has nothing to
    /// assign into.
    NeverBootstrapped,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::RunInProgress => "clustering is currently in progress",
            SkipReason::NeverBootstrapped => "no successful clustering run has occurred yet",
        }
    }
}

/// What a run did. Skipped runs are not errors and leave no job row.
#[derive(Debug)]
pub struct RunOutcome {
    pub job_id: Option<i64>,
    pub buckets_created: u32,
    pub skipped: Option<SkipReason>,
}

impl RunOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            job_id: None,
            buckets_created: 0,
            skipped: Some(reason),
        }
    }
}

pub(crate) fn gate_full(status: &ClusteringStatus) -> Option<SkipReason> {
    if status.in_progress {
        return Some(SkipReason::RunInProgress);
    }
    None
}

pub(crate) fn gate_incremental(status: &ClusteringStatus) -> Option<SkipReason> {
    if status.in_progress {
        return Some(SkipReason::RunInProgress);
    }
    if !status.has_successful_run {
        return Some(SkipReason::NeverBootstrapped);
    }
    None
}

/// Full cluster run: wipe prior cluster state in scope, re-cluster every
/// eligible report per domain, and materialize buckets.
pub async fn run_full_clustering(deps: &ServerDeps, domain: Option<&str>) -> Result<RunOutcome> {
    let status = ClusteringJob::status(deps.pool()).await?;
    if let Some(reason) = gate_full(&status) {
        warn!("Skipping full clustering: {}", reason.describe());
        return Ok(RunOutcome::skipped(reason));
    }

    let Some(job) = ClusteringJob::try_start(deps.pool(), JOB_KIND_FULL, domain).await? else {
        warn!("Skipping full clustering: another run won the start race");
        return Ok(RunOutcome::skipped(SkipReason::RunInProgress));
    };

    finalize(deps, job.id, execute_full(deps, domain).await).await
}

/// Triage run: incrementally assign unbucketed reports into existing
/// clusters, batch-cluster the unmatched remainder, domain-bucket the rest.
pub async fn run_triage(deps: &ServerDeps) -> Result<RunOutcome> {
    let status = ClusteringJob::status(deps.pool()).await?;
    if let Some(reason) = gate_incremental(&status) {
        warn!("Skipping triaging: {}", reason.describe());
        return Ok(RunOutcome::skipped(reason));
    }

    let Some(job) = ClusteringJob::try_start(deps.pool(), JOB_KIND_INCREMENTAL, None).await? else {
        warn!("Skipping triaging: another run won the start race");
        return Ok(RunOutcome::skipped(SkipReason::RunInProgress));
    };

    finalize(deps, job.id, execute_triage(deps).await).await
}

/// Record the run result on the job row. Failures propagate after the row
/// is finalized.
async fn finalize(deps: &ServerDeps, job_id: i64, result: Result<u32>) -> Result<RunOutcome> {
    match result {
        Ok(buckets_created) => {
            ClusteringJob::complete(deps.pool(), job_id, true, buckets_created, None).await?;
            Ok(RunOutcome {
                job_id: Some(job_id),
                buckets_created,
                skipped: None,
            })
        }
        Err(e) => {
            let message = format!("{e:#}");
            if let Err(complete_err) =
                ClusteringJob::complete(deps.pool(), job_id, false, 0, Some(&message)).await
            {
                error!(job_id, error = %complete_err, "Failed to record job failure");
            }
            Err(e)
        }
    }
}

async fn execute_full(deps: &ServerDeps, domain: Option<&str>) -> Result<u32> {
    let params = &deps.file_config.clustering;

    // Clean up in case there was a previous run
    let (clusters_deleted, buckets_deleted) =
        cleanup_cluster_state(deps.pool(), params, domain).await?;
    info!(clusters_deleted, buckets_deleted, "Cleaned up previous cluster state");

    let all_reports = Report::fetch_eligible(deps.pool(), domain).await?;
    let reports_by_domain = group_by_domain(&all_reports, None);

    if let Some(domain) = domain {
        if !reports_by_domain.contains_key(domain) {
            info!(domain, "No reports found for domain");
            return Ok(0);
        }
        info!(domain, "Filtering to domain");
    }

    info!(count = all_reports.len(), "Clustering reports");

    let mut drafts = Vec::new();
    for (domain, reports) in reports_by_domain {
        drafts.extend(
            cluster_domain_reports(deps.embedder.as_ref(), params, &domain, reports).await?,
        );
    }

    if drafts.is_empty() {
        warn!("No clusters created");
        return Ok(0);
    }

    info!(count = drafts.len(), "Saving clusters");
    materialize_clusters(deps.pool(), params, &drafts).await
}

async fn execute_triage(deps: &ServerDeps) -> Result<u32> {
    let params = &deps.file_config.clustering;
    let embedder = deps.embedder.as_ref();

    let all_reports = Report::fetch_all(deps.pool()).await?;
    let unbucketed: Vec<TriageReport> = all_reports
        .iter()
        .filter(|r| r.bucket_id.is_none())
        .cloned()
        .collect();

    info!(count = unbucketed.len(), "Unbucketed reports to triage");

    if unbucketed.is_empty() {
        return Ok(0);
    }

    let domains: HashSet<String> = unbucketed
        .iter()
        .filter(|r| !r.domain.is_empty())
        .map(|r| r.domain.clone())
        .collect();
    let index = build_cluster_index(embedder, &all_reports, &domains).await?;

    // Low-quality reports (empty text, low probability) skip assignment and
    // go straight to domain bucketing.
    let (candidates, low_quality): (Vec<_>, Vec<_>) =
        unbucketed.into_iter().partition(|r| r.ok_to_cluster());

    let mut unmatched: Vec<TriageReport> = Vec::new();
    if !candidates.is_empty() {
        let texts: Vec<String> = candidates.iter().map(|r| r.text.clone()).collect();
        let embeddings = embedder.embed_batch(texts).await?;

        for (report, embedding) in candidates.into_iter().zip(embeddings) {
            let matched = find_closest_cluster(
                &index,
                &report.domain,
                &embedding,
                params.assign_top_n,
                params.assign_min_similarity,
            );

            let assigned = match matched {
                Some(cluster_id) => {
                    match Bucket::find_for_cluster(deps.pool(), cluster_id).await? {
                        Some(bucket_id) => {
                            Report::assign_cluster_and_bucket(
                                deps.pool(),
                                report.id,
                                cluster_id,
                                bucket_id,
                            )
                            .await?;
                            true
                        }
                        None => false,
                    }
                }
                None => false,
            };

            if !assigned {
                unmatched.push(report);
            }
        }
    }

    // Second pass: unmatched reports may form brand-new clusters among
    // themselves.
    let mut buckets_created = 0u32;
    let mut clustered_ids: HashSet<i64> = HashSet::new();

    if !unmatched.is_empty() {
        info!(
            count = unmatched.len(),
            "Processing unmatched reports for potential clustering"
        );
        let unmatched_by_domain = group_by_domain(&unmatched, None);
        for (domain, reports) in unmatched_by_domain {
            info!(domain = %domain, count = reports.len(), "Clustering unmatched reports");
            let drafts = cluster_domain_reports(embedder, params, &domain, reports).await?;
            if drafts.is_empty() {
                continue;
            }
            for draft in &drafts {
                for report in &draft.reports {
                    clustered_ids.insert(report.id);
                }
            }
            buckets_created += materialize_clusters(deps.pool(), params, &drafts).await?;
        }
    }

    // Everything still unmatched, plus the low-quality reports, falls back
    // to one plain bucket per domain.
    let mut remaining: Vec<TriageReport> = unmatched
        .into_iter()
        .filter(|r| !clustered_ids.contains(&r.id))
        .collect();
    remaining.extend(low_quality);

    let mut cache = DomainBucketCache::new();
    apply_domain_fallback(deps.pool(), params, &mut cache, &remaining).await?;

    info!(buckets_created, "Triage completed");
    Ok(buckets_created)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Job gating
    // -----------------------------------------------------------------------

    #[test]
    fn full_run_allowed_when_idle() {
        let status = ClusteringStatus {
            in_progress: false,
            has_successful_run: false,
        };
        assert_eq!(gate_full(&status), None);
    }

    #[test]
    fn full_run_skipped_while_running() {
        let status = ClusteringStatus {
            in_progress: true,
            has_successful_run: true,
        };
        assert_eq!(gate_full(&status), Some(SkipReason::RunInProgress));
    }

    #[test]
    fn incremental_skipped_while_running() {
        let status = ClusteringStatus {
            in_progress: true,
            has_successful_run: true,
        };
        assert_eq!(gate_incremental(&status), Some(SkipReason::RunInProgress));
    }

    #[test]
    fn incremental_skipped_before_first_full_success() {
        let status = ClusteringStatus {
            in_progress: false,
            has_successful_run: false,
        };
        assert_eq!(
            gate_incremental(&status),
            Some(SkipReason::NeverBootstrapped)
        );
    }

    #[test]
    fn incremental_allowed_after_bootstrap() {
        let status = ClusteringStatus {
            in_progress: false,
            has_successful_run: true,
        };
        assert_eq!(gate_incremental(&status), None);
    }

    #[test]
    fn busy_takes_precedence_over_bootstrap_reason() {
        let status = ClusteringStatus {
            in_progress: true,
            has_successful_run: false,
        };
        assert_eq!(gate_incremental(&status), Some(SkipReason::RunInProgress));
    }
}
