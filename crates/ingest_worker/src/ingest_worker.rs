use crate::domain::{IngestConfig, RecordBuilder, RecordLimits, RuleEngine};
use crate::pipeline::{
    BatchSettings, Dispatcher, InsertPipeline, Measures, Pruner, RequestQueue,
};
use anyhow::Context;
use common::domain::{Blacklist, Clock, Encrypter, RecordInserter, RetentionStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Collaborators the pipeline is wired against
pub struct IngestWorkerDeps {
    pub rules: Arc<RuleEngine>,
    pub blacklist: Arc<dyn Blacklist>,
    pub encrypter: Arc<dyn Encrypter>,
    pub clock: Arc<dyn Clock>,
    pub inserter: Arc<dyn RecordInserter>,
    pub retention: Arc<dyn RetentionStore>,
    pub measures: Arc<dyn Measures>,
}

/// The assembled ingestion pipeline: dispatcher, batched inserts and pruning
pub struct IngestWorker {
    dispatcher: Dispatcher,
    insert_pipeline: InsertPipeline,
    pruner: Option<Pruner>,
}

impl IngestWorker {
    /// Wire the pipeline and return it with the producer handle for its admission queue
    pub fn new(config: IngestConfig, deps: IngestWorkerDeps) -> (Self, RequestQueue) {
        let config = config.normalized();
        info!(
            queue_size = config.queue_size,
            max_workers = config.max_workers,
            max_insert_workers = config.max_insert_workers,
            max_batch_size = config.max_batch_size,
            state_limit_per_device = config.state_limit_per_device,
            rule_count = deps.rules.len(),
            "initializing ingest worker"
        );

        let (queue, requests) = RequestQueue::channel(config.queue_size);
        let (records_tx, records_rx) = mpsc::channel(config.queue_size);

        let (prune_tx, pruner) = if config.pruning_enabled() {
            let (tx, rx) = mpsc::channel(config.prune_queue_size);
            let pruner = Pruner::new(
                rx,
                deps.retention,
                deps.measures.clone(),
                config.state_limit_per_device,
            );
            (Some(tx), Some(pruner))
        } else {
            (None, None)
        };

        let builder = Arc::new(RecordBuilder::new(
            deps.blacklist,
            deps.encrypter,
            deps.clock,
            RecordLimits {
                default_ttl: config.default_ttl,
                payload_max_size: config.payload_max_size,
                metadata_max_size: config.metadata_max_size,
            },
        ));

        let dispatcher = Dispatcher::new(
            requests,
            deps.rules,
            builder,
            records_tx,
            deps.measures.clone(),
            config.max_workers,
        );

        let insert_pipeline = InsertPipeline::new(
            records_rx,
            deps.inserter,
            prune_tx,
            deps.measures,
            BatchSettings {
                max_batch_size: config.max_batch_size,
                max_batch_wait: config.max_batch_wait,
                max_insert_workers: config.max_insert_workers,
            },
        );

        (
            Self {
                dispatcher,
                insert_pipeline,
                pruner,
            },
            queue,
        )
    }

    /// Run until `ctx` is cancelled, then shut down in pipeline order.
    ///
    /// Admission closes first and accepted requests drain through the
    /// dispatcher. The insert pipeline then flushes its last batch and waits
    /// for in-flight writes before the pruner finishes its backlog.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let insert_handle = tokio::spawn(self.insert_pipeline.run());
        let prune_handle = self.pruner.map(|pruner| tokio::spawn(pruner.run()));

        self.dispatcher.run(ctx).await?;
        insert_handle
            .await
            .context("insert pipeline task failed")??;
        if let Some(handle) = prune_handle {
            handle.await.context("pruner task failed")??;
        }

        info!("ingest worker stopped");
        Ok(())
    }

    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send,
    > {
        Box::new(move |ctx| Box::pin(async move { self.run(ctx).await }))
    }
}
