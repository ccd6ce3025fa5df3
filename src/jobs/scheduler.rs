//! Periodic job runner
//!
//! Each job gets its own tokio task that runs once per period, first after one
//! full period, until its handle is stopped.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A unit of background work run on a fixed period
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// One run of the job. Runs never overlap for the same job.
    async fn run(&self);
}

/// Handle to a spawned periodic job
pub struct JobHandle {
    name: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the job and wait for its task to exit.
    ///
    /// A run already in progress completes first.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(job = %self.name, error = %e, "Job task ended abnormally");
        }
        tracing::info!(job = %self.name, "Job stopped");
    }
}

/// Spawn `job` to run every `period`
pub fn spawn_periodic(job: Arc<dyn Job>, period: Duration) -> JobHandle {
    let name = job.name().to_string();
    let token = CancellationToken::new();
    let first = Instant::now() + period;

    let task = tokio::spawn({
        let token = token.clone();
        let name = name.clone();
        async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(job = %name, period_secs = period.as_secs(), "Job started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::debug!(job = %name, "Job tick");
                        job.run().await;
                    }
                }
            }
        }
    });

    JobHandle { name, token, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> Arc<CountingJob> {
        Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
        })
    }

    async fn advance(by: Duration) {
        tokio::time::advance(by).await;
        // Let the job task observe the tick
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_after_one_period() {
        let job = counting();
        let handle = spawn_periodic(job.clone(), Duration::from_secs(60));

        advance(Duration::from_secs(59)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        advance(Duration::from_secs(1)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(120)).await;
        assert!(job.runs.load(Ordering::SeqCst) >= 2);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_the_task() {
        let job = counting();
        let handle = spawn_periodic(job.clone(), Duration::from_secs(10));
        assert_eq!(handle.name(), "counting");

        advance(Duration::from_secs(10)).await;
        let runs = job.runs.load(Ordering::SeqCst);
        handle.stop().await;

        advance(Duration::from_secs(100)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }
}
