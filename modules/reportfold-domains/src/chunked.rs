//! Bounded-size chunking for bulk id-set operations.
//!
//! Postgres caps bind parameters per statement, so updates and deletes over
//! large id sets run in chunks. The affected total is the sum across chunks.

use anyhow::Result;
use std::future::Future;

/// Run `op` over `ids` in chunks of `chunk_size`, summing affected counts.
/// Every id is visited exactly once; a failing chunk aborts the remainder.
pub async fn for_each_chunk<T, F, Fut>(ids: &[T], chunk_size: usize, mut op: F) -> Result<u64>
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let mut total = 0u64;
    for chunk in ids.chunks(chunk_size.max(1)) {
        total += op(chunk.to_vec()).await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_into_expected_chunks() {
        let ids: Vec<i64> = (0..1200).collect();
        let mut sizes = Vec::new();
        let total = for_each_chunk(&ids, 500, |chunk| {
            sizes.push(chunk.len());
            async move { Ok(chunk.len() as u64) }
        })
        .await
        .unwrap();

        assert_eq!(sizes, vec![500, 500, 200]);
        assert_eq!(total, 1200);
    }

    #[tokio::test]
    async fn small_sets_take_one_chunk() {
        let ids: Vec<i64> = (0..7).collect();
        let total = for_each_chunk(&ids, 500, |chunk| async move { Ok(chunk.len() as u64) })
            .await
            .unwrap();
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn empty_set_runs_no_chunks() {
        let ids: Vec<i64> = Vec::new();
        let mut calls = 0;
        let total = for_each_chunk(&ids, 500, |chunk| {
            calls += 1;
            async move { Ok(chunk.len() as u64) }
        })
        .await
        .unwrap();
        assert_eq!(total, 0);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn visits_every_id_exactly_once() {
        let ids: Vec<i64> = (0..1003).collect();
        let mut seen = Vec::new();
        for_each_chunk(&ids, 250, |chunk| {
            seen.extend(chunk.iter().copied());
            async move { Ok(chunk.len() as u64) }
        })
        .await
        .unwrap();
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn failing_chunk_aborts() {
        let ids: Vec<i64> = (0..10).collect();
        let result = for_each_chunk(&ids, 3, |chunk| async move {
            if chunk.contains(&4) {
                anyhow::bail!("chunk failed");
            }
            Ok(chunk.len() as u64)
        })
        .await;
        assert!(result.is_err());
    }
}
