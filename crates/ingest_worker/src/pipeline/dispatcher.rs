use crate::domain::{record_type_for, RecordBuilder, RecordError, RuleEngine};
use crate::pipeline::Measures;
use crate::DropReason;
use anyhow::Result;
use common::domain::{AdmittedItem, Message, Record};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Drains the admission queue through a bounded pool of build tasks.
///
/// At most `max_workers` messages are matched, validated and encrypted at any
/// one time, on the blocking pool; queue capacity is sized separately.
pub struct Dispatcher {
    requests: mpsc::Receiver<AdmittedItem>,
    rules: Arc<RuleEngine>,
    builder: Arc<RecordBuilder>,
    records: mpsc::Sender<Record>,
    measures: Arc<dyn Measures>,
    permits: Arc<Semaphore>,
    max_workers: usize,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        requests: mpsc::Receiver<AdmittedItem>,
        rules: Arc<RuleEngine>,
        builder: Arc<RecordBuilder>,
        records: mpsc::Sender<Record>,
        measures: Arc<dyn Measures>,
        max_workers: usize,
    ) -> Self {
        Self {
            requests,
            rules,
            builder,
            records,
            measures,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            tracker: TaskTracker::new(),
        }
    }

    /// Run until cancelled, then close admission and drain what was accepted.
    ///
    /// A slot on the insert channel is reserved before each request is taken
    /// off the admission queue, so a stalled store backs up into admission
    /// instead of piling finished records up in memory.
    ///
    /// Returns once every dispatched task has handed off its record; dropping
    /// `self` afterwards releases this side of the insert channel.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        debug!(max_workers = self.max_workers, "starting dispatcher");
        let mut closing = false;

        loop {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            // None once the insert pipeline is gone; records are then dropped as dbFail
            let slot = self.records.clone().reserve_owned().await.ok();

            let item = tokio::select! {
                biased;
                _ = ctx.cancelled(), if !closing => {
                    info!("closing admission, draining accepted requests");
                    self.requests.close();
                    closing = true;
                    continue;
                }
                item = self.requests.recv() => item,
            };
            let Some(item) = item else {
                break;
            };

            let rules = self.rules.clone();
            let builder = self.builder.clone();
            let measures = self.measures.clone();
            self.tracker.spawn(async move {
                let built = tokio::task::spawn_blocking(move || {
                    let outcome = build(&rules, &builder, &item.message);
                    (item, outcome)
                })
                .await;
                drop(permit);

                let (item, outcome) = match built {
                    Ok(built) => built,
                    Err(e) => {
                        error!(error = %e, "record build task failed");
                        return;
                    }
                };

                match (outcome, slot) {
                    (Ok(record), Some(slot)) => {
                        slot.send(record);
                    }
                    (Ok(record), None) => {
                        warn!(
                            device_id = %record.device_id,
                            reason = %DropReason::DbFail,
                            "insert queue closed, dropping record"
                        );
                        measures.dropped(DropReason::DbFail, 1);
                    }
                    (Err(e), _) => {
                        warn!(
                            destination = %item.message.destination,
                            reason = %e.reason(),
                            error = %e,
                            "dropping message"
                        );
                        measures.dropped(e.reason(), 1);
                    }
                }
                measures.processing_time(item.admitted_at.elapsed());
            });
        }

        self.tracker.close();
        self.tracker.wait().await;
        debug!("dispatcher stopped");
        Ok(())
    }
}

fn build(rules: &RuleEngine, builder: &RecordBuilder, message: &Message) -> Result<Record, RecordError> {
    let rule = rules.find_rule(&message.destination)?;
    builder.build_record(message, rule, record_type_for(message.message_type))
}
