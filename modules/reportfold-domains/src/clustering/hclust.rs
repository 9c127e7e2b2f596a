//! Average-linkage hierarchical clustering over cosine distances.
//!
//! Embeddings are unit-norm, so cosine similarity is a plain dot product
//! and distance is `1 - similarity`. The dendrogram is cut at a distance
//! threshold: merges strictly below it are applied, so the data, not a
//! fixed cluster count, decides how many groups come out.
//!
//! Near-threshold ties are sensitive to floating-point ordering; callers
//! must not depend on exact partition boundaries there.

use kodama::{linkage, Method};
use std::collections::HashMap;

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cluster unit-norm embeddings, returning one label per input.
/// Labels are numbered by first appearance.
pub fn cluster_labels(embeddings: &[Vec<f32>], distance_threshold: f32) -> Vec<usize> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0];
    }

    // Condensed upper-triangle distance matrix, row-major.
    let mut condensed = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = (1.0 - dot(&embeddings[i], &embeddings[j])).max(0.0);
            condensed.push(d);
        }
    }

    let dendrogram = linkage(&mut condensed, n, Method::Average);

    // Steps come out sorted by dissimilarity; the cluster formed at step k
    // is labeled n + k. Apply merges below the threshold through a
    // union-find over the leaves.
    let mut parent: Vec<usize> = (0..n).collect();
    let mut rep: Vec<usize> = (0..n).collect();
    for step in dendrogram.steps() {
        rep.push(rep[step.cluster1]);
        if step.dissimilarity < distance_threshold {
            let a = find(&mut parent, rep[step.cluster1]);
            let b = find(&mut parent, rep[step.cluster2]);
            if a != b {
                parent[b] = a;
            }
        }
    }

    let mut labels = vec![0usize; n];
    let mut label_of_root: HashMap<usize, usize> = HashMap::new();
    let mut next_label = 0usize;
    for (i, label) in labels.iter_mut().enumerate() {
        let root = find(&mut parent, i);
        *label = *label_of_root.entry(root).or_insert_with(|| {
            let l = next_label;
            next_label += 1;
            l
        });
    }

    labels
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Index of the member embedding closest to the group mean, ties broken
/// by the lowest index.
pub fn find_centroid_index(embeddings: &[Vec<f32>]) -> usize {
    if embeddings.len() <= 1 {
        return 0;
    }

    let dim = embeddings[0].len();
    let mut mean = vec![0.0f32; dim];
    for embedding in embeddings {
        for (m, v) in mean.iter_mut().zip(embedding) {
            *m += v;
        }
    }
    let count = embeddings.len() as f32;
    for m in mean.iter_mut() {
        *m /= count;
    }

    let mut closest = 0;
    let mut closest_dist = f32::INFINITY;
    for (i, embedding) in embeddings.iter().enumerate() {
        let dist: f32 = embedding
            .iter()
            .zip(&mean)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if dist < closest_dist {
            closest_dist = dist;
            closest = i;
        }
    }

    closest
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit vector at the given angle (radians).
    fn v(theta: f32) -> Vec<f32> {
        vec![theta.cos(), theta.sin()]
    }

    #[test]
    fn empty_and_singleton_inputs() {
        assert!(cluster_labels(&[], 0.38).is_empty());
        assert_eq!(cluster_labels(&[v(0.0)], 0.38), vec![0]);
    }

    #[test]
    fn near_duplicates_merge() {
        // cos(0.2) ~ 0.98 -> distance ~0.02, well under 0.38
        let labels = cluster_labels(&[v(0.0), v(0.2)], 0.38);
        assert_eq!(labels[0], labels[1]);
    }

    #[test]
    fn distinct_vectors_separate() {
        // cos(1.4) ~ 0.17 -> distance ~0.83, well over 0.38
        let labels = cluster_labels(&[v(0.0), v(1.4)], 0.38);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn mixed_pair_and_outlier() {
        let labels = cluster_labels(&[v(0.0), v(0.1), v(1.5)], 0.38);
        assert_eq!(labels[0], labels[1]);
        assert_ne!(labels[0], labels[2]);

        let distinct: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn all_distinct_stay_apart() {
        let labels = cluster_labels(&[v(0.0), v(1.2), v(2.4)], 0.30);
        let distinct: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn tighter_threshold_splits_looser_merge() {
        // cos(0.9) ~ 0.62 -> distance ~0.38: merges at 0.40, not at 0.30
        let loose = cluster_labels(&[v(0.0), v(0.9)], 0.40);
        assert_eq!(loose[0], loose[1]);

        let strict = cluster_labels(&[v(0.0), v(0.9)], 0.30);
        assert_ne!(strict[0], strict[1]);
    }

    #[test]
    fn centroid_of_singleton_is_itself() {
        assert_eq!(find_centroid_index(&[v(0.3)]), 0);
    }

    #[test]
    fn centroid_is_member_nearest_mean() {
        // The middle vector sits closest to the mean of the fan.
        let embeddings = vec![v(0.0), v(0.4), v(0.8)];
        assert_eq!(find_centroid_index(&embeddings), 1);
    }

    #[test]
    fn centroid_ties_break_to_lowest_index() {
        let embeddings = vec![v(0.5), v(0.5), v(0.5)];
        assert_eq!(find_centroid_index(&embeddings), 0);
    }
}
