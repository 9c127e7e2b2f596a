//! Domain volume profiling: which reports a domain clusters over, and how
//! strict the distance threshold should be.

use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashSet};

use reportfold_core::ClusteringParams;

use crate::clustering::models::TriageReport;

/// Group clusterable reports by domain, optionally restricted to a domain
/// set. Reports failing `ok_to_cluster` are skipped.
pub fn group_by_domain(
    reports: &[TriageReport],
    domains: Option<&HashSet<String>>,
) -> BTreeMap<String, Vec<TriageReport>> {
    let mut by_domain: BTreeMap<String, Vec<TriageReport>> = BTreeMap::new();

    for report in reports {
        if !report.ok_to_cluster() {
            continue;
        }

        if let Some(domains) = domains {
            if !domains.contains(&report.domain) {
                continue;
            }
        }

        by_domain
            .entry(report.domain.clone())
            .or_default()
            .push(report.clone());
    }

    by_domain
}

/// A domain is high-volume when its average weekly report count exceeds
/// the configured threshold over the span its reports cover.
pub fn is_high_volume(reports: &[TriageReport], params: &ClusteringParams) -> bool {
    let (min_date, max_date) = match (
        reports.iter().map(|r| r.reported_at).min(),
        reports.iter().map(|r| r.reported_at).max(),
    ) {
        (Some(min), Some(max)) => (min, max),
        _ => return false,
    };
    let days_span = ((max_date - min_date).num_days() + 1).max(1);
    let avg_weekly = reports.len() as f64 / days_span as f64 * 7.0;

    avg_weekly > params.high_volume_weekly_threshold
}

/// Keep only reports from the last `days` days.
pub fn filter_recent(reports: Vec<TriageReport>, days: i64) -> Vec<TriageReport> {
    let cutoff = Utc::now() - Duration::days(days);
    reports
        .into_iter()
        .filter(|r| r.reported_at >= cutoff)
        .collect()
}
