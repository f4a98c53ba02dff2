mod config;

use anyhow::Context;
use common::domain::{Encrypter, SystemClock};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use common::{AesGcmEncrypter, InMemoryRecordStore, NoopEncrypter, StaticBlacklist};
use crate::config::ServiceConfig;
use ingest_worker::{
    run_demo_producer, DemoProducerConfig, IngestWorker, IngestWorkerDeps, MetricsMeasures,
    RuleEngine,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vigil_runner::Runner;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
        json_logs: config.log_json,
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "starting vigil-all-in-one service"
    );
    debug!("configuration: {:?}", config);

    let runner = match build_runner(&config) {
        Ok(runner) => runner,
        Err(e) => {
            error!("failed to initialize service: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let result = runner
        .with_closer(move || async move {
            info!("running cleanup tasks");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;

    if result.is_err() {
        std::process::exit(1);
    }
}

fn build_runner(config: &ServiceConfig) -> anyhow::Result<Runner> {
    install_metrics_exporter(&config.metrics_listen_addr)?;

    let rules = RuleEngine::from_configs(&config.rule_configs()?).context("invalid rule table")?;
    if rules.is_empty() {
        warn!("rule table is empty, every message will be dropped");
    }

    let encrypter: Arc<dyn Encrypter> = match config.encryption_key() {
        Some(key) => {
            let encrypter = AesGcmEncrypter::from_base64(key, config.encryption_kid.clone())
                .context("failed to load encryption key")?;
            info!(kid = %encrypter.kid(), "payload encryption enabled");
            Arc::new(encrypter)
        }
        None => {
            warn!("no encryption key configured, storing payloads unencrypted");
            Arc::new(NoopEncrypter)
        }
    };

    let blacklist = StaticBlacklist::from_comma_separated(&config.blacklist);
    info!(entries = blacklist.len(), "loaded device blacklist");

    let store = Arc::new(InMemoryRecordStore::new());
    let (ingest_worker, request_queue) = IngestWorker::new(
        config.ingest_config(),
        IngestWorkerDeps {
            rules: Arc::new(rules),
            blacklist: Arc::new(blacklist),
            encrypter,
            clock: Arc::new(SystemClock),
            inserter: store.clone(),
            retention: store,
            measures: Arc::new(MetricsMeasures),
        },
    );

    let mut runner = Runner::new()
        .with_named_process("ingest_worker", ingest_worker.into_runner_process())
        .with_shutdown_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    if config.demo_producer_enabled {
        let demo_config = DemoProducerConfig {
            interval: Duration::from_millis(config.demo_interval_ms),
            device_count: config.demo_device_count,
            ..Default::default()
        };
        runner = runner.with_named_process(
            "demo_producer",
            Box::new(move |ctx| Box::pin(run_demo_producer(ctx, demo_config, request_queue))),
        );
    } else {
        // Without a producer holding the queue the pipeline drains and exits right away
        warn!("demo producer disabled and no request boundary attached");
    }

    Ok(runner)
}

fn install_metrics_exporter(listen_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", listen_addr))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install prometheus exporter")?;
    MetricsMeasures::describe();
    info!(%addr, "prometheus exporter listening");
    Ok(())
}
