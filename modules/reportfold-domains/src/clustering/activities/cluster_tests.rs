//! Batch clustering pipeline tests — MOCK → FUNCTION → OUTPUT.
//!
//! Register controlled vectors on a FixedEmbedder, run the per-domain
//! clustering activity, assert on the drafts that come out. Partition
//! assertions are property-level: near-duplicates merge, distinct texts
//! separate; exact labels near threshold ties are not guaranteed.

use chrono::{Duration, Utc};

use reportfold_core::ClusteringParams;

use crate::clustering::activities::{cluster_domain_reports, group_by_domain};
use crate::testing::{triage_report, unit2, FixedEmbedder};

// ---------------------------------------------------------------------------
// Degenerate inputs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_reports_no_drafts() {
    let embedder = FixedEmbedder::new(8);
    let drafts = cluster_domain_reports(
        &embedder,
        &ClusteringParams::default(),
        "example.com",
        vec![],
    )
    .await
    .unwrap();
    assert!(drafts.is_empty());
}

#[tokio::test]
async fn single_confident_report_becomes_its_own_cluster() {
    let embedder = FixedEmbedder::new(8);
    let reports = vec![triage_report(7, "Checkout broken", "example.com", 0.9, Utc::now())];

    let drafts = cluster_domain_reports(
        &embedder,
        &ClusteringParams::default(),
        "example.com",
        reports,
    )
    .await
    .unwrap();

    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].centroid_report_id, 7);
    assert_eq!(drafts[0].reports.len(), 1);
}

#[tokio::test]
async fn single_low_confidence_report_is_gated() {
    let embedder = FixedEmbedder::new(8);
    let reports = vec![triage_report(7, "Meh", "example.com", 0.3, Utc::now())];

    let drafts = cluster_domain_reports(
        &embedder,
        &ClusteringParams::default(),
        "example.com",
        reports,
    )
    .await
    .unwrap();

    assert!(drafts.is_empty());
}

// ---------------------------------------------------------------------------
// Partition properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn near_duplicates_merge_distinct_reports_separate() {
    let now = Utc::now();
    let embedder = FixedEmbedder::new(2)
        .on_text("Page loading issue", unit2(0.0))
        .on_text("Page not loading correctly", unit2(0.1))
        .on_text("Different issue", unit2(1.5));

    let reports = vec![
        triage_report(1, "Page loading issue", "example.com", 0.8, now),
        triage_report(2, "Page not loading correctly", "example.com", 0.7, now - Duration::days(1)),
        triage_report(3, "Different issue", "example.com", 0.9, now - Duration::days(2)),
    ];

    let drafts = cluster_domain_reports(
        &embedder,
        &ClusteringParams::default(),
        "example.com",
        reports,
    )
    .await
    .unwrap();

    assert_eq!(drafts.len(), 2);

    let pair = drafts.iter().find(|d| d.reports.len() == 2).unwrap();
    let mut pair_ids: Vec<i64> = pair.reports.iter().map(|r| r.id).collect();
    pair_ids.sort_unstable();
    assert_eq!(pair_ids, vec![1, 2]);

    let singleton = drafts.iter().find(|d| d.reports.len() == 1).unwrap();
    assert_eq!(singleton.reports[0].id, 3);
    assert_eq!(singleton.centroid_report_id, 3);
}

/// End-to-end over two domains: the near-duplicate pair on example.com
/// merges into one cluster, the distinct report on other.com stays its own
/// singleton bucket-to-be.
#[tokio::test]
async fn three_reports_two_domains_end_to_end() {
    let now = Utc::now();
    let embedder = FixedEmbedder::new(2)
        .on_text("Page loading issue", unit2(0.0))
        .on_text("Page not loading correctly", unit2(0.1));

    let reports = vec![
        triage_report(1, "Page loading issue", "example.com", 0.8, now),
        triage_report(2, "Page not loading correctly", "example.com", 0.7, now),
        triage_report(3, "Different issue", "other.com", 0.9, now),
    ];

    let by_domain = group_by_domain(&reports, None);
    let params = ClusteringParams::default();

    let mut drafts = Vec::new();
    for (domain, domain_reports) in by_domain {
        drafts.extend(
            cluster_domain_reports(&embedder, &params, &domain, domain_reports)
                .await
                .unwrap(),
        );
    }

    assert_eq!(drafts.len(), 2);

    let example = drafts.iter().find(|d| d.domain == "example.com").unwrap();
    assert_eq!(example.reports.len(), 2);

    let other = drafts.iter().find(|d| d.domain == "other.com").unwrap();
    assert_eq!(other.reports.len(), 1);
    assert_eq!(other.centroid_report_id, 3);
}

// ---------------------------------------------------------------------------
// High-volume windowing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn high_volume_domain_clusters_only_recent_reports() {
    let now = Utc::now();
    let mut embedder = FixedEmbedder::new(2);
    let mut reports = Vec::new();

    // 70 recent reports over 7 days push the weekly average over the
    // threshold even with the stragglers widening the span to 21 days.
    for i in 0..70 {
        let text = format!("Streaming stutters {i}");
        embedder = embedder.on_text(&text, unit2(0.0));
        reports.push(triage_report(
            i,
            &text,
            "example.com",
            0.8,
            now - Duration::days(i % 7),
        ));
    }
    for i in 70..72 {
        let text = format!("Streaming stutters {i}");
        embedder = embedder.on_text(&text, unit2(0.0));
        reports.push(triage_report(
            i,
            &text,
            "example.com",
            0.8,
            now - Duration::days(20),
        ));
    }

    let drafts = cluster_domain_reports(
        &embedder,
        &ClusteringParams::default(),
        "example.com",
        reports,
    )
    .await
    .unwrap();

    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].reports.len(), 70);
    assert!(drafts[0].reports.iter().all(|r| r.id < 70));
}
