use crate::pipeline::{RequestQueue, SubmitError};
use anyhow::Result;
use chrono::Utc;
use common::domain::{Message, MessageType};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the demo producer
#[derive(Debug, Clone)]
pub struct DemoProducerConfig {
    /// Interval between submitted messages
    pub interval: Duration,
    /// Number of distinct simulated devices
    pub device_count: usize,
    pub source: String,
}

impl Default for DemoProducerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            device_count: 3,
            source: "dns:demo-producer".to_string(),
        }
    }
}

/// Submit synthetic device notifications until cancelled.
///
/// Devices take turns; every other message is a State update so retention
/// pruning has something to do.
pub async fn run_demo_producer(
    ctx: CancellationToken,
    config: DemoProducerConfig,
    queue: RequestQueue,
) -> Result<()> {
    info!(
        interval_ms = config.interval.as_millis() as u64,
        device_count = config.device_count,
        "demo producer started"
    );

    let mut sequence: u64 = 0;
    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                info!("received shutdown signal, stopping demo producer");
                break;
            }
            _ = tokio::time::sleep(config.interval) => {
                let message = demo_message(&config, sequence);
                sequence += 1;

                match queue.try_submit(message) {
                    Ok(()) => debug!(sequence, "submitted demo message"),
                    Err(SubmitError::QueueFull) => warn!(sequence, "request queue full, skipping demo message"),
                    Err(SubmitError::Closed) => {
                        info!("request queue closed, stopping demo producer");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn demo_message(config: &DemoProducerConfig, sequence: u64) -> Message {
    let device = sequence % config.device_count.max(1) as u64;
    let (message_type, event) = if sequence % 2 == 0 {
        (MessageType::State, "online")
    } else {
        (MessageType::SimpleEvent, "heartbeat")
    };
    let payload = serde_json::json!({
        "ts": Utc::now().to_rfc3339(),
        "sequence": sequence,
    });

    Message {
        source: config.source.clone(),
        destination: format!("event:device-status/mac:{:012x}/{}", device, event),
        message_type,
        partner_ids: vec!["demo".to_string()],
        transaction_uuid: format!("demo-{}", sequence),
        payload: Some(payload.to_string().into_bytes()),
        metadata: BTreeMap::from([("/boot-time".to_string(), sequence.to_string())]),
    }
}
