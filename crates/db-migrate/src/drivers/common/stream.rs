//! Row stream to bounded batch channel.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{Batch, Row};
use crate::error::{MigrateError, Result};

/// Drain a driver row stream into `tx` as batches of at most `batch_size`.
///
/// The last batch sent is marked final (it may be empty). Returns early
/// without error when the receiver is gone. Decode and fetch errors are
/// returned to the caller, which forwards them as the final channel item.
pub async fn pump_rows<S, R, E, F>(
    mut stream: S,
    table: &str,
    batch_size: usize,
    tx: &mpsc::Sender<Result<Batch>>,
    mut decode: F,
) -> Result<usize>
where
    S: Stream<Item = std::result::Result<R, E>> + Unpin,
    E: std::fmt::Display,
    F: FnMut(&R) -> Result<Row>,
{
    let batch_size = batch_size.max(1);
    let mut pending: Vec<Row> = Vec::with_capacity(batch_size);
    let mut offset = 0usize;

    while let Some(item) = stream.next().await {
        let raw = item.map_err(|e| MigrateError::read(table, e))?;
        pending.push(decode(&raw)?);

        if pending.len() == batch_size {
            let rows = std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
            let n = rows.len();
            if tx.send(Ok(Batch::new(rows, offset))).await.is_err() {
                debug!("{}: reader stopped, receiver dropped", table);
                return Ok(offset);
            }
            offset += n;
        }
    }

    let n = pending.len();
    let _ = tx.send(Ok(Batch::new(pending, offset).mark_final())).await;
    Ok(offset + n)
}

/// Spawned-task epilogue: deliver a reader error as the final item.
pub async fn forward_error(tx: &mpsc::Sender<Result<Batch>>, result: Result<usize>) {
    if let Err(e) = result {
        let _ = tx.send(Err(e)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    #[tokio::test]
    async fn test_pump_rows_batches_and_marks_last() {
        let items: Vec<std::result::Result<i64, String>> = (0..5).map(Ok).collect();
        let (tx, mut rx) = mpsc::channel(10);
        let total = pump_rows(futures::stream::iter(items), "t", 2, &tx, |v| {
            Ok(vec![SqlValue::I64(*v)])
        })
        .await
        .unwrap();
        drop(tx);
        assert_eq!(total, 5);

        let mut sizes = Vec::new();
        let mut offsets = Vec::new();
        let mut last_flags = Vec::new();
        while let Some(batch) = rx.recv().await {
            let batch = batch.unwrap();
            sizes.push(batch.len());
            offsets.push(batch.offset);
            last_flags.push(batch.is_last);
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(last_flags, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_pump_rows_exact_multiple_sends_empty_final() {
        let items: Vec<std::result::Result<i64, String>> = (0..4).map(Ok).collect();
        let (tx, mut rx) = mpsc::channel(10);
        pump_rows(futures::stream::iter(items), "t", 2, &tx, |v| {
            Ok(vec![SqlValue::I64(*v)])
        })
        .await
        .unwrap();
        drop(tx);

        let mut batches = Vec::new();
        while let Some(b) = rx.recv().await {
            batches.push(b.unwrap());
        }
        assert_eq!(batches.len(), 3);
        assert!(batches[2].is_empty() && batches[2].is_last);
    }

    #[tokio::test]
    async fn test_pump_rows_stream_error() {
        let items: Vec<std::result::Result<i64, String>> =
            vec![Ok(1), Err("connection reset".to_string())];
        let (tx, _rx) = mpsc::channel(10);
        let err = pump_rows(futures::stream::iter(items), "t", 10, &tx, |v| {
            Ok(vec![SqlValue::I64(*v)])
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
