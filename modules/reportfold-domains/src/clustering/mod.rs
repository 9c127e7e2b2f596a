pub mod activities;
pub mod hclust;
pub mod models;
pub mod runs;

pub use models::{
    Bucket, BucketHit, Cluster, ClusteringJob, ClusteringStatus, Report, TriageReport,
};
pub use runs::{run_full_clustering, run_triage, RunOutcome, SkipReason};
