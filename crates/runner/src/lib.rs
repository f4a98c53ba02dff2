//! Runs long-lived app processes until a shutdown signal, then drains them.
//!
//! Shutdown happens in two stages:
//! - cancellation: SIGINT/SIGTERM, an external token, or the first failing
//!   process cancels the shared token and every process starts draining
//! - cleanup: once processes have drained (or the drain timeout expired and
//!   they were aborted), closers run under their own timeout
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vigil_runner::Runner;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_app_process(|ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("working");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("cleaning up");
//!             Ok(())
//!         })
//!         .with_shutdown_timeout(Duration::from_secs(30))
//!         .run()
//!         .await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// An app process: receives the shared cancellation token and runs until it
/// has finished draining.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Cleanup run after every process has stopped
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CLOSER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    shutdown_timeout: Duration,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// A runner with a 30s drain timeout and a 10s closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            closer_timeout: DEFAULT_CLOSER_TIMEOUT,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = format!("process_{}", self.app_processes.len());
        self.with_named_process(name, Box::new(|token| Box::pin(process(token))))
    }

    /// Add a process under a name used in shutdown logs
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push((name.into(), process));
        self
    }

    /// Closers run concurrently after all processes stop, whatever the outcome.
    /// A failing closer does not prevent the others from running.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// How long processes get to drain after cancellation before being aborted
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Share cancellation with code outside the runner
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run every process until cancellation or the first failure, drain, then
    /// run closers. Returns the first process error, if any.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(joined) => {
                        if let Some(err) = process_exit(joined) {
                            first_error = Some(err);
                            break;
                        }
                    }
                },
            }
        }

        token.cancel();
        if !join_set.is_empty() {
            tracing::info!(
                remaining = join_set.len(),
                timeout_secs = self.shutdown_timeout.as_secs_f64(),
                "waiting for app processes to drain"
            );
            let drained = tokio::time::timeout(self.shutdown_timeout, async {
                while let Some(joined) = join_set.join_next().await {
                    if let Some(err) = process_exit(joined) {
                        first_error.get_or_insert(err);
                    }
                }
            })
            .await;

            if drained.is_err() {
                tracing::error!(
                    remaining = join_set.len(),
                    "app processes did not drain in time, aborting"
                );
                join_set.shutdown().await;
            }
        }

        if !self.closers.is_empty() {
            tracing::info!(
                timeout_secs = self.closer_timeout.as_secs_f64(),
                "running closers"
            );
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => tracing::info!("all closers completed"),
                Err(_) => tracing::error!("closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => {
                tracing::error!("application exiting with error: {:#}", err);
                Err(err)
            }
            None => {
                tracing::info!("application exiting normally");
                Ok(())
            }
        }
    }
}

/// Log a finished process and turn failures into errors
fn process_exit(joined: Result<(String, anyhow::Result<()>), JoinError>) -> Option<anyhow::Error> {
    match joined {
        Ok((name, Ok(()))) => {
            tracing::debug!(process = %name, "app process completed");
            None
        }
        Ok((name, Err(err))) => {
            tracing::error!(process = %name, "app process error: {:#}", err);
            Some(err.context(format!("app process '{}' failed", name)))
        }
        Err(err) => {
            tracing::error!("app process panicked: {}", err);
            Some(anyhow::anyhow!("app process panicked: {}", err))
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => tracing::error!("error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => tracing::error!("error setting up SIGTERM handler: {}", err),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!("closer error: {:#}", err),
            Err(err) => tracing::error!("closer panicked: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn flag_closer(flag: Arc<AtomicBool>) -> impl FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> {
        move || {
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_cancellation_drains_before_closers() {
        // Arrange
        let drained = Arc::new(AtomicBool::new(false));
        let drained_seen_by_closer = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();

        let process_drained = drained.clone();
        let closer_drained = drained.clone();
        let closer_seen = drained_seen_by_closer.clone();
        let runner = Runner::new()
            .with_app_process(move |ctx| async move {
                ctx.cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                process_drained.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_closer(move || async move {
                closer_seen.store(closer_drained.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token.clone());

        // Act
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let result = runner.run().await;

        // Assert
        assert!(result.is_ok());
        assert!(drained.load(Ordering::SeqCst));
        assert!(drained_seen_by_closer.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_process_error_cancels_others_and_is_returned() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let other_stopped = Arc::new(AtomicBool::new(false));
        let other_flag = other_stopped.clone();

        let result = Runner::new()
            .with_named_process(
                "failing",
                Box::new(|_ctx| Box::pin(async { Err(anyhow::anyhow!("boom")) })),
            )
            .with_app_process(move |ctx| async move {
                ctx.cancelled().await;
                other_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_closer(flag_closer(closer_called.clone()))
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
        assert!(err.to_string().contains("failing"));
        assert!(other_stopped.load(Ordering::SeqCst));
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_finished_processes_return_without_cancellation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let first = runs.clone();
        let second = runs.clone();

        let result = Runner::new()
            .with_app_process(move |_ctx| async move {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_app_process(move |_ctx| async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stuck_process_is_aborted_after_shutdown_timeout() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();
        token.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Runner::new()
                .with_app_process(|_ctx| async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                })
                .with_closer(flag_closer(closer_called.clone()))
                .with_cancellation_token(token)
                .with_shutdown_timeout(Duration::from_millis(50))
                .run(),
        )
        .await
        .expect("runner should give up on the stuck process");

        assert!(result.is_ok());
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_closers_all_run_despite_failures() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let runner = Runner::new()
            .with_closer(|| async { Err(anyhow::anyhow!("close failed")) })
            .with_closer(flag_closer(closer_called.clone()))
            .with_closer_timeout(Duration::from_secs(1));

        run_closers(runner.closers).await;
        assert!(closer_called.load(Ordering::SeqCst));
    }
}
