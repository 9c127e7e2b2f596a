use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::ReportFoldError;

/// TOML-backed configuration loaded from disk.
/// Secrets (API keys, DB URL) stay as env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub models: ModelsConfig,
    pub clustering: ClusteringParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub embedding: String,
}

/// Clustering parameters.
///
/// Clustering uses different strategies based on domain volume:
/// high-volume domains get a stricter distance threshold over a recent
/// window; normal-volume domains get a permissive threshold over the
/// full eligible set. Distance is `1 - cosine similarity`, so 0.30
/// requires 70% similarity and 0.38 requires 62%.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringParams {
    /// Average weekly eligible reports above which a domain is high-volume.
    pub high_volume_weekly_threshold: f64,
    /// High-volume domains only cluster reports from the last N days.
    pub high_volume_window_days: i64,
    pub high_volume_distance_threshold: f32,
    pub normal_volume_distance_threshold: f32,
    /// Minimum validity probability for single-report clusters.
    pub min_valid_probability_single: f64,
    /// Top-N member similarities averaged during incremental assignment.
    pub assign_top_n: usize,
    /// Minimum averaged similarity for an incremental match.
    pub assign_min_similarity: f32,
    /// Ids per bulk UPDATE/DELETE statement.
    pub bulk_chunk_size: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            high_volume_weekly_threshold: 20.0,
            high_volume_window_days: 14,
            high_volume_distance_threshold: 0.30,
            normal_volume_distance_threshold: 0.38,
            min_valid_probability_single: 0.60,
            assign_top_n: 3,
            assign_min_similarity: 0.5,
            bulk_chunk_size: 500,
        }
    }
}

impl ClusteringParams {
    pub fn validate(&self) -> Result<(), ReportFoldError> {
        for (name, value) in [
            (
                "high_volume_distance_threshold",
                self.high_volume_distance_threshold,
            ),
            (
                "normal_volume_distance_threshold",
                self.normal_volume_distance_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReportFoldError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.assign_top_n == 0 {
            return Err(ReportFoldError::Config(
                "assign_top_n must be at least 1".to_string(),
            ));
        }
        if self.bulk_chunk_size == 0 {
            return Err(ReportFoldError::Config(
                "bulk_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.clustering.validate()?;
    Ok(config)
}
