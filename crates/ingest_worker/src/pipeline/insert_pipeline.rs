use crate::pipeline::Measures;
use crate::DropReason;
use anyhow::Result;
use common::domain::{Record, RecordInserter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub max_batch_size: usize,
    pub max_batch_wait: Duration,
    pub max_insert_workers: usize,
}

/// Accumulates validated records and writes them in batches.
///
/// A batch is flushed when it is full or when `max_batch_wait` has passed since
/// its first record arrived, whichever comes first. Each flush runs in its own
/// task, with at most `max_insert_workers` writes in flight.
pub struct InsertPipeline {
    records: mpsc::Receiver<Record>,
    inserter: Arc<dyn RecordInserter>,
    prune_hints: Option<mpsc::Sender<String>>,
    measures: Arc<dyn Measures>,
    settings: BatchSettings,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl InsertPipeline {
    pub fn new(
        records: mpsc::Receiver<Record>,
        inserter: Arc<dyn RecordInserter>,
        prune_hints: Option<mpsc::Sender<String>>,
        measures: Arc<dyn Measures>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            records,
            inserter,
            prune_hints,
            measures,
            permits: Arc::new(Semaphore::new(settings.max_insert_workers)),
            settings,
            tracker: TaskTracker::new(),
        }
    }

    /// Run until the record channel closes, then flush the partial batch and
    /// wait for every in-flight write.
    pub async fn run(mut self) -> Result<()> {
        debug!(
            max_batch_size = self.settings.max_batch_size,
            max_batch_wait_ms = self.settings.max_batch_wait.as_millis() as u64,
            max_insert_workers = self.settings.max_insert_workers,
            "starting insert pipeline"
        );

        while let Some(first) = self.records.recv().await {
            let deadline = Instant::now() + self.settings.max_batch_wait;
            let mut batch = Vec::with_capacity(self.settings.max_batch_size);
            batch.push(first);

            while batch.len() < self.settings.max_batch_size {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    record = self.records.recv() => match record {
                        Some(record) => batch.push(record),
                        None => break,
                    },
                }
            }

            self.flush(batch).await;
        }

        self.tracker.close();
        self.tracker.wait().await;
        debug!("insert pipeline stopped");
        Ok(())
    }

    async fn flush(&self, batch: Vec<Record>) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            self.measures
                .dropped(DropReason::DbFail, batch.len() as u64);
            return;
        };

        let inserter = self.inserter.clone();
        let prune_hints = self.prune_hints.clone();
        let measures = self.measures.clone();
        self.tracker.spawn(async move {
            write_batch(inserter, prune_hints, measures, batch).await;
            drop(permit);
        });
    }
}

#[instrument(skip_all, fields(batch_size = batch.len()))]
async fn write_batch(
    inserter: Arc<dyn RecordInserter>,
    prune_hints: Option<mpsc::Sender<String>>,
    measures: Arc<dyn Measures>,
    batch: Vec<Record>,
) {
    let count = batch.len() as u64;
    if let Err(e) = inserter.insert_records(&batch).await {
        error!(
            error = %e,
            reason = %DropReason::DbFail,
            "failed to insert batch, dropping records"
        );
        measures.dropped(DropReason::DbFail, count);
        return;
    }

    measures.batch_flushed();
    measures.inserted(count);
    debug!("batch inserted");

    let Some(prune_hints) = prune_hints else {
        return;
    };
    for record in &batch {
        // Pruning is best effort; a busy pruner catches up on the next insert
        if prune_hints.try_send(record.device_id.clone()).is_err() {
            debug!(device_id = %record.device_id, "prune queue unavailable, skipping hint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MockMeasures;
    use chrono::Utc;
    use common::domain::{MockRecordInserter, RecordType};
    use std::sync::Mutex;

    fn record(device_id: &str) -> Record {
        Record {
            record_type: RecordType::State,
            device_id: device_id.to_string(),
            birth_date: Utc::now(),
            death_date: Utc::now() + chrono::Duration::minutes(5),
            data: b"data".to_vec(),
            nonce: Vec::new(),
            alg: "none".to_string(),
            kid: "none".to_string(),
        }
    }

    fn quiet_measures() -> MockMeasures {
        let mut measures = MockMeasures::new();
        measures.expect_batch_flushed().return_const(());
        measures.expect_inserted().return_const(());
        measures.expect_dropped().return_const(());
        measures
    }

    /// Inserter that remembers each batch's size
    fn recording_inserter(batches: Arc<Mutex<Vec<usize>>>) -> MockRecordInserter {
        let mut inserter = MockRecordInserter::new();
        inserter.expect_insert_records().returning(move |batch| {
            batches.lock().unwrap().push(batch.len());
            Ok(())
        });
        inserter
    }

    #[tokio::test]
    async fn test_flushes_when_batch_is_full() {
        // Arrange
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(10);
        let pipeline = InsertPipeline::new(
            rx,
            Arc::new(recording_inserter(batches.clone())),
            None,
            Arc::new(quiet_measures()),
            BatchSettings {
                max_batch_size: 3,
                max_batch_wait: Duration::from_secs(10),
                max_insert_workers: 5,
            },
        );
        let handle = tokio::spawn(pipeline.run());

        // Act
        for i in 0..6 {
            tx.send(record(&format!("dev-{}", i))).await.unwrap();
        }
        // Both batches must go out well before the 10s wait
        tokio::time::timeout(Duration::from_secs(2), async {
            while batches.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        // Assert
        assert_eq!(*batches.lock().unwrap(), vec![3, 3]);
    }

    #[tokio::test]
    async fn test_flushes_when_wait_elapses() {
        // Arrange
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(10);
        let pipeline = InsertPipeline::new(
            rx,
            Arc::new(recording_inserter(batches.clone())),
            None,
            Arc::new(quiet_measures()),
            BatchSettings {
                max_batch_size: 100,
                max_batch_wait: Duration::from_millis(50),
                max_insert_workers: 5,
            },
        );
        let handle = tokio::spawn(pipeline.run());

        // Act
        let started = std::time::Instant::now();
        tx.send(record("dev-1")).await.unwrap();
        tx.send(record("dev-2")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while batches.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let elapsed = started.elapsed();

        // Assert
        assert_eq!(*batches.lock().unwrap(), vec![2]);
        assert!(elapsed >= Duration::from_millis(50), "flushed after {:?}", elapsed);

        drop(tx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_channel_close_flushes_partial_batch() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(10);
        let pipeline = InsertPipeline::new(
            rx,
            Arc::new(recording_inserter(batches.clone())),
            None,
            Arc::new(quiet_measures()),
            BatchSettings {
                max_batch_size: 100,
                max_batch_wait: Duration::from_secs(60),
                max_insert_workers: 5,
            },
        );

        tx.send(record("dev-1")).await.unwrap();
        tx.send(record("dev-2")).await.unwrap();
        drop(tx);
        pipeline.run().await.unwrap();

        assert_eq!(*batches.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_failed_insert_counts_every_record() {
        // Arrange
        let mut inserter = MockRecordInserter::new();
        inserter
            .expect_insert_records()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused").into()));
        let mut measures = MockMeasures::new();
        measures
            .expect_dropped()
            .withf(|reason, count| *reason == DropReason::DbFail && *count == 2)
            .times(1)
            .return_const(());
        measures.expect_inserted().times(0);
        let (prune_tx, mut prune_rx) = mpsc::channel(10);
        let (tx, rx) = mpsc::channel(10);
        let pipeline = InsertPipeline::new(
            rx,
            Arc::new(inserter),
            Some(prune_tx),
            Arc::new(measures),
            BatchSettings {
                max_batch_size: 2,
                max_batch_wait: Duration::from_secs(60),
                max_insert_workers: 5,
            },
        );

        // Act
        tx.send(record("dev-1")).await.unwrap();
        tx.send(record("dev-2")).await.unwrap();
        drop(tx);
        pipeline.run().await.unwrap();

        // Assert
        assert!(prune_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_successful_insert_sends_prune_hints() {
        let mut measures = MockMeasures::new();
        measures.expect_batch_flushed().times(1).return_const(());
        measures
            .expect_inserted()
            .withf(|count| *count == 2)
            .times(1)
            .return_const(());
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (prune_tx, mut prune_rx) = mpsc::channel(1);
        let (tx, rx) = mpsc::channel(10);
        let pipeline = InsertPipeline::new(
            rx,
            Arc::new(recording_inserter(batches)),
            Some(prune_tx),
            Arc::new(measures),
            BatchSettings {
                max_batch_size: 2,
                max_batch_wait: Duration::from_secs(60),
                max_insert_workers: 5,
            },
        );

        tx.send(record("dev-1")).await.unwrap();
        tx.send(record("dev-2")).await.unwrap();
        drop(tx);
        pipeline.run().await.unwrap();

        // Capacity one: the second hint is dropped instead of blocking the write
        assert_eq!(prune_rx.recv().await.as_deref(), Some("dev-1"));
        assert!(prune_rx.recv().await.is_none());
    }
}
