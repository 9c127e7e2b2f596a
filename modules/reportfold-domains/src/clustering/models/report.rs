use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use url::Url;

use reportfold_core::normalize_text;

/// Validity probability at or below which a report never enters clustering.
pub const MIN_VALID_PROBABILITY: f64 = 0.03;

/// Check if a report meets quality thresholds for clustering.
pub fn ok_to_cluster(text: &str, valid_probability: Option<f64>) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    matches!(valid_probability, Some(p) if p > MIN_VALID_PROBABILITY)
}

/// A report row as stored. Owned by the ingestion pipeline; this system
/// only ever updates `bucket_id` and `cluster_id`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub comments: String,
    pub comments_translated: Option<String>,
    pub url: String,
    pub valid_probability: Option<f64>,
    pub reported_at: DateTime<Utc>,
    pub bucket_id: Option<i64>,
    pub cluster_id: Option<i64>,
}

/// In-memory view of a report prepared for clustering: normalized text,
/// derived domain.
#[derive(Debug, Clone)]
pub struct TriageReport {
    pub id: i64,
    pub valid_probability: Option<f64>,
    pub reported_at: DateTime<Utc>,
    pub url: String,
    pub bucket_id: Option<i64>,
    pub cluster_id: Option<i64>,
    pub text: String,
    pub domain: String,
}

impl TriageReport {
    pub fn ok_to_cluster(&self) -> bool {
        ok_to_cluster(&self.text, self.valid_probability)
    }
}

impl From<Report> for TriageReport {
    fn from(row: Report) -> Self {
        let raw = row
            .comments_translated
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&row.comments);
        let text = normalize_text(raw);
        let domain = hostname_of(&row.url);

        Self {
            id: row.id,
            valid_probability: row.valid_probability,
            reported_at: row.reported_at,
            url: row.url,
            bucket_id: row.bucket_id,
            cluster_id: row.cluster_id,
            text,
            domain,
        }
    }
}

fn hostname_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl Report {
    /// Fetch reports eligible for clustering: non-empty comments and a
    /// validity probability above the floor. Domain filtering happens in
    /// memory since the domain is derived from the URL.
    pub async fn fetch_eligible(pool: &PgPool, domain: Option<&str>) -> Result<Vec<TriageReport>> {
        let rows = sqlx::query_as::<_, Report>(
            r#"
            SELECT id, comments, comments_translated, url, valid_probability,
                   reported_at, bucket_id, cluster_id
            FROM reports
            WHERE comments <> '' AND valid_probability > $1
            ORDER BY id
            "#,
        )
        .bind(MIN_VALID_PROBABILITY)
        .fetch_all(pool)
        .await?;

        let mut reports: Vec<TriageReport> = rows.into_iter().map(TriageReport::from).collect();

        if let Some(domain) = domain {
            reports.retain(|r| r.domain == domain);
        }

        Ok(reports)
    }

    /// Fetch every report, including unbucketed and low-quality ones.
    /// Triage needs the full corpus for volume profiling and cluster
    /// member embeddings.
    pub async fn fetch_all(pool: &PgPool) -> Result<Vec<TriageReport>> {
        let rows = sqlx::query_as::<_, Report>(
            r#"
            SELECT id, comments, comments_translated, url, valid_probability,
                   reported_at, bucket_id, cluster_id
            FROM reports
            ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(TriageReport::from).collect())
    }

    /// Direct incremental assignment into an existing cluster and its bucket.
    pub async fn assign_cluster_and_bucket(
        pool: &PgPool,
        report_id: i64,
        cluster_id: i64,
        bucket_id: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE reports SET cluster_id = $1, bucket_id = $2 WHERE id = $3")
            .bind(cluster_id)
            .bind(bucket_id)
            .bind(report_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
