use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

/// Identifier in bucket descriptions for cluster-based buckets. Buckets
/// without it (manual, domain-fallback) are invisible to cluster cleanup.
pub const CLUSTER_BUCKET_MARKER: &str = "[Cluster";

pub const DEFAULT_BUCKET_PRIORITY: i32 = 0;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Bucket {
    pub id: i64,
    pub domain: Option<String>,
    pub signature: String,
    pub description: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

// Symptom fields are declared in alphabetical order so the serialized
// signature has a canonical key order, stable for re-parsing and comparison.
#[derive(Serialize)]
#[serde(untagged)]
enum Symptom<'a> {
    Url {
        part: &'a str,
        #[serde(rename = "type")]
        kind: &'a str,
        value: &'a str,
    },
    ClusterId {
        #[serde(rename = "type")]
        kind: &'a str,
        value: String,
    },
}

#[derive(Serialize)]
struct SignaturePayload<'a> {
    symptoms: Vec<Symptom<'a>>,
}

/// Build the signature JSON for a cluster bucket.
pub fn build_cluster_signature(domain: &str, cluster_id: i64) -> String {
    let payload = SignaturePayload {
        symptoms: vec![
            Symptom::Url {
                part: "hostname",
                kind: "url",
                value: domain,
            },
            Symptom::ClusterId {
                kind: "cluster_id",
                value: cluster_id.to_string(),
            },
        ],
    };
    serde_json::to_string(&payload).expect("signature serialization is infallible")
}

/// Build the trivial hostname signature used by domain-fallback buckets.
pub fn build_domain_signature(domain: &str) -> String {
    let payload = SignaturePayload {
        symptoms: vec![Symptom::Url {
            part: "hostname",
            kind: "url",
            value: domain,
        }],
    };
    serde_json::to_string(&payload).expect("signature serialization is infallible")
}

/// Description for a cluster bucket, carrying the cluster marker.
pub fn cluster_bucket_description(domain: &str, cluster_id: i64) -> String {
    format!("{domain} {CLUSTER_BUCKET_MARKER} {cluster_id}]")
}

impl Bucket {
    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM buckets WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Resolve the bucket materialized for a cluster via its description
    /// marker (`[Cluster <id>]`).
    pub async fn find_for_cluster(pool: &PgPool, cluster_id: i64) -> Result<Option<i64>> {
        let pattern = format!("%{CLUSTER_BUCKET_MARKER} {cluster_id}]%");
        sqlx::query_scalar("SELECT id FROM buckets WHERE description LIKE $1 ORDER BY id LIMIT 1")
            .bind(pattern)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find an existing non-cluster bucket for a domain.
    pub async fn find_fallback_for_domain(pool: &PgPool, domain: &str) -> Result<Option<i64>> {
        let marker = format!("%{CLUSTER_BUCKET_MARKER}%");
        sqlx::query_scalar(
            r#"
            SELECT id FROM buckets
            WHERE domain = $1 AND description NOT LIKE $2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(domain)
        .bind(marker)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Create the plain per-domain fallback bucket.
    pub async fn create_fallback(pool: &PgPool, domain: &str) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO buckets (domain, signature, description, priority)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(domain)
        .bind(build_domain_signature(domain))
        .bind(format!("domain is {domain}"))
        .bind(DEFAULT_BUCKET_PRIORITY)
        .fetch_one(pool)
        .await?;

        info!(domain, bucket_id = id, "Created domain fallback bucket");
        Ok(id)
    }

    /// Delete all cluster-tagged buckets, optionally scoped to a domain.
    /// Report references are cleared first to avoid cascading report loss;
    /// bucket hits go with their bucket. Returns the number deleted.
    pub async fn delete_cluster_buckets(
        pool: &PgPool,
        domain: Option<&str>,
        chunk_size: usize,
    ) -> Result<u64> {
        let marker = format!("%{CLUSTER_BUCKET_MARKER}%");
        let ids: Vec<i64> = match domain {
            Some(domain) => {
                sqlx::query_scalar(
                    "SELECT id FROM buckets WHERE description LIKE $1 AND domain = $2 ORDER BY id",
                )
                .bind(&marker)
                .bind(domain)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT id FROM buckets WHERE description LIKE $1 ORDER BY id")
                    .bind(&marker)
                    .fetch_all(pool)
                    .await?
            }
        };

        if ids.is_empty() {
            return Ok(0);
        }

        let pool_ref = pool;
        crate::chunked::for_each_chunk(&ids, chunk_size, |chunk| async move {
            sqlx::query("UPDATE reports SET bucket_id = NULL WHERE bucket_id = ANY($1)")
                .bind(&chunk)
                .execute(pool_ref)
                .await?;
            sqlx::query("DELETE FROM bucket_hits WHERE bucket_id = ANY($1)")
                .bind(&chunk)
                .execute(pool_ref)
                .await?;
            Ok(0)
        })
        .await?;

        let deleted = crate::chunked::for_each_chunk(&ids, chunk_size, |chunk| async move {
            let result = sqlx::query("DELETE FROM buckets WHERE id = ANY($1)")
                .bind(&chunk)
                .execute(pool_ref)
                .await?;
            Ok(result.rows_affected())
        })
        .await?;

        info!(deleted, domain = domain.unwrap_or("<all>"), "Deleted cluster-based buckets");
        Ok(deleted)
    }
}
