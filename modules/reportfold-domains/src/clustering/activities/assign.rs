//! Incremental triage assignment: route a new report into an existing
//! cluster by averaging its top-N member similarities.
//!
//! This intentionally trades recall for cost: no re-clustering, no centroid
//! recomputation. Reports that miss the floor fall through to a second-pass
//! batch clustering and then to domain fallback.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

use reportfold_core::TextEmbedder;

use crate::clustering::hclust::dot;
use crate::clustering::models::TriageReport;

/// Per-domain member embeddings of existing clusters, rebuilt per run.
#[derive(Debug, Default)]
pub struct ClusterIndex {
    by_domain: HashMap<String, BTreeMap<i64, Vec<Vec<f32>>>>,
}

impl ClusterIndex {
    pub fn domain(&self, domain: &str) -> Option<&BTreeMap<i64, Vec<Vec<f32>>>> {
        self.by_domain.get(domain)
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}

/// Embed the member texts of existing clusters in the given domains.
/// One batch call covers every member; embeddings stay in memory for the
/// duration of the run.
pub async fn build_cluster_index(
    embedder: &dyn TextEmbedder,
    all_reports: &[TriageReport],
    domains: &HashSet<String>,
) -> Result<ClusterIndex> {
    let members: Vec<&TriageReport> = all_reports
        .iter()
        .filter(|r| r.cluster_id.is_some() && domains.contains(&r.domain) && r.ok_to_cluster())
        .collect();

    if members.is_empty() {
        return Ok(ClusterIndex::default());
    }

    let texts: Vec<String> = members.iter().map(|r| r.text.clone()).collect();
    let embeddings = embedder.embed_batch(texts).await?;

    let mut index = ClusterIndex::default();
    for (report, embedding) in members.into_iter().zip(embeddings) {
        let cluster_id = match report.cluster_id {
            Some(id) => id,
            None => continue,
        };
        index
            .by_domain
            .entry(report.domain.clone())
            .or_default()
            .entry(cluster_id)
            .or_default()
            .push(embedding);
    }

    info!(
        domains = index.by_domain.len(),
        "Built cluster embedding index for triage"
    );
    Ok(index)
}

/// Pick the existing cluster whose top-N member similarities average
/// highest, if that average clears the floor.
pub fn find_closest_cluster(
    index: &ClusterIndex,
    domain: &str,
    embedding: &[f32],
    top_n: usize,
    min_similarity: f32,
) -> Option<i64> {
    let clusters = index.domain(domain)?;

    let mut best: Option<(i64, f32)> = None;
    for (&cluster_id, members) in clusters {
        let mut similarities: Vec<f32> = members.iter().map(|m| dot(embedding, m)).collect();
        similarities.sort_by(|a, b| b.total_cmp(a));
        similarities.truncate(top_n.max(1));

        let avg = similarities.iter().sum::<f32>() / similarities.len() as f32;
        if best.is_none_or(|(_, b)| avg > b) {
            best = Some((cluster_id, avg));
        }
    }

    best.filter(|&(_, avg)| avg > min_similarity)
        .map(|(cluster_id, _)| cluster_id)
}
