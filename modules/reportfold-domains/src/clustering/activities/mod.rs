pub mod assign;
pub mod cluster_batch;
pub mod fallback;
pub mod materialize;
pub mod profile;

#[cfg(test)]
mod cluster_tests;

pub use assign::{build_cluster_index, find_closest_cluster, ClusterIndex};
pub use cluster_batch::{cluster_domain_reports, ClusterDraft};
pub use fallback::{apply_domain_fallback, DomainBucketCache};
pub use materialize::{cleanup_cluster_state, materialize_clusters};
pub use profile::{filter_recent, group_by_domain, is_high_volume};
