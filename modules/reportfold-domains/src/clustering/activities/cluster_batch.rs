//! Full batch clustering for one domain's reports.

use anyhow::Result;
use tracing::info;

use reportfold_core::{ClusteringParams, ReportFoldError, TextEmbedder};

use crate::clustering::hclust;
use crate::clustering::models::TriageReport;

use super::profile::{filter_recent, is_high_volume};

/// An unsaved cluster: the centroid report and the members that back it.
#[derive(Debug, Clone)]
pub struct ClusterDraft {
    pub domain: String,
    pub centroid_report_id: i64,
    pub reports: Vec<TriageReport>,
}

/// Reports and their embeddings grouped under one cluster label.
#[derive(Debug)]
pub(crate) struct LabelGroup {
    pub reports: Vec<TriageReport>,
    pub embeddings: Vec<Vec<f32>>,
}

/// Cluster one domain's reports into drafts. High-volume domains are
/// windowed to recent reports and clustered with the stricter threshold.
pub async fn cluster_domain_reports(
    embedder: &dyn TextEmbedder,
    params: &ClusteringParams,
    domain: &str,
    reports: Vec<TriageReport>,
) -> Result<Vec<ClusterDraft>> {
    if reports.is_empty() {
        return Ok(Vec::new());
    }

    let high_volume = is_high_volume(&reports, params);

    let reports = if high_volume {
        filter_recent(reports, params.high_volume_window_days)
    } else {
        reports
    };

    if reports.is_empty() {
        info!(domain, "High-volume domain has no recent reports, skipping");
        return Ok(Vec::new());
    }

    let threshold = if high_volume {
        params.high_volume_distance_threshold
    } else {
        params.normal_volume_distance_threshold
    };

    let texts: Vec<String> = reports.iter().map(|r| r.text.clone()).collect();
    let embeddings = embedder.embed_batch(texts).await?;

    let labels = hclust::cluster_labels(&embeddings, threshold);

    let groups = group_by_label(reports, &labels, embeddings)?;
    Ok(build_drafts(groups, domain, params))
}

/// Group reports and their embeddings by cluster label. Misaligned inputs
/// are a fatal shape error.
pub(crate) fn group_by_label(
    reports: Vec<TriageReport>,
    labels: &[usize],
    embeddings: Vec<Vec<f32>>,
) -> Result<Vec<LabelGroup>> {
    if reports.len() != labels.len() || labels.len() != embeddings.len() {
        return Err(ReportFoldError::ShapeMismatch {
            reports: reports.len(),
            labels: labels.len(),
            embeddings: embeddings.len(),
        }
        .into());
    }

    let mut grouped: std::collections::BTreeMap<usize, LabelGroup> =
        std::collections::BTreeMap::new();

    for ((report, &label), embedding) in reports.into_iter().zip(labels).zip(embeddings) {
        let group = grouped.entry(label).or_insert_with(|| LabelGroup {
            reports: Vec::new(),
            embeddings: Vec::new(),
        });
        group.reports.push(report);
        group.embeddings.push(embedding);
    }

    Ok(grouped.into_values().collect())
}

/// Turn label groups into drafts: pick centroids and apply the quality
/// gate. A single low-confidence report does not justify a new bucket.
pub(crate) fn build_drafts(
    groups: Vec<LabelGroup>,
    domain: &str,
    params: &ClusteringParams,
) -> Vec<ClusterDraft> {
    let mut drafts = Vec::new();

    for group in groups {
        if group.reports.len() == 1
            && group.reports[0].valid_probability.unwrap_or(0.0)
                < params.min_valid_probability_single
        {
            continue;
        }

        let centroid_idx = hclust::find_centroid_index(&group.embeddings);
        drafts.push(ClusterDraft {
            domain: domain.to_string(),
            centroid_report_id: group.reports[centroid_idx].id,
            reports: group.reports,
        });
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::triage_report;
    use chrono::Utc;
    use reportfold_core::ClusteringParams;

    fn reports_abc() -> Vec<TriageReport> {
        let now = Utc::now();
        vec![
            triage_report(1, "Page loading issue", "example.com", 0.8, now),
            triage_report(2, "Page not loading correctly", "example.com", 0.7, now),
            triage_report(3, "Different issue", "other.com", 0.9, now),
        ]
    }

    #[test]
    fn groups_reports_by_label() {
        let reports = reports_abc();
        let labels = vec![0, 0, 1];
        let embeddings = vec![
            vec![0.1, 0.2],
            vec![0.15, 0.25],
            vec![0.9, 0.8],
        ];

        let groups = group_by_label(reports, &labels, embeddings).unwrap();
        assert_eq!(groups.len(), 2);

        let mut sizes: Vec<usize> = groups.iter().map(|g| g.reports.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
        assert_eq!(groups[0].reports.len(), groups[0].embeddings.len());
    }

    #[test]
    fn mismatched_lengths_are_fatal() {
        let reports = reports_abc();
        let labels = vec![0, 0]; // 3 reports, 2 labels
        let embeddings = vec![vec![0.1, 0.2], vec![0.15, 0.25], vec![0.9, 0.8]];

        let err = group_by_label(reports, &labels, embeddings).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn quality_gate_drops_low_probability_singletons() {
        let now = Utc::now();
        let groups = vec![LabelGroup {
            reports: vec![triage_report(1, "Low quality", "example.com", 0.49, now)],
            embeddings: vec![vec![0.1, 0.2]],
        }];

        let drafts = build_drafts(groups, "example.com", &ClusteringParams::default());
        assert!(drafts.is_empty());
    }

    #[test]
    fn quality_gate_keeps_high_probability_singletons() {
        let now = Utc::now();
        let groups = vec![LabelGroup {
            reports: vec![triage_report(1, "High quality", "example.com", 0.9, now)],
            embeddings: vec![vec![0.1, 0.2]],
        }];

        let drafts = build_drafts(groups, "example.com", &ClusteringParams::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].centroid_report_id, 1);
    }

    #[test]
    fn multi_report_groups_pass_regardless_of_probability() {
        let now = Utc::now();
        let groups = vec![LabelGroup {
            reports: vec![
                triage_report(1, "Report 1", "example.com", 0.59, now),
                triage_report(2, "Report 2", "example.com", 0.45, now),
            ],
            // Two members are equidistant from their mean; the tie goes to
            // the lowest index, never to the higher score.
            embeddings: vec![vec![1.0, 0.0], vec![0.8, 0.6]],
        }];

        let drafts = build_drafts(groups, "example.com", &ClusteringParams::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].reports.len(), 2);
        assert_eq!(drafts[0].centroid_report_id, 1);
    }

    #[test]
    fn centroid_is_the_member_nearest_the_mean() {
        let now = Utc::now();
        let groups = vec![LabelGroup {
            reports: vec![
                triage_report(1, "Report 1", "example.com", 0.9, now),
                triage_report(2, "Report 2", "example.com", 0.2, now),
                triage_report(3, "Report 3", "example.com", 0.5, now),
            ],
            // The middle vector of the fan is nearest the mean, despite
            // carrying the lowest probability.
            embeddings: vec![
                vec![1.0, 0.0],
                vec![0.92106, 0.38942],
                vec![0.69671, 0.71736],
            ],
        }];

        let drafts = build_drafts(groups, "example.com", &ClusteringParams::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].centroid_report_id, 2);
    }
}
