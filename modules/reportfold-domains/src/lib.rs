pub mod chunked;
pub mod clustering;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use clustering::{run_full_clustering, run_triage, RunOutcome, SkipReason};
