//! Named multi-queue outbound broker. Built on the same `tokio::mpsc`
//! shape as `hub_core::bus::MessageBus` (see that module's doc comment),
//! generalized from one fixed inbound/outbound pair into many
//! independently named queues, each with its own worker pool and
//! retry/backoff/dead-letter bookkeeping.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::error::QueueError;
use crate::job::{EnqueueOptions, Job, JobRecord, DEFAULT_KEEP_COMPLETED, DEFAULT_KEEP_FAILED};

/// Executes one job. Implementations dispatch on `job.job_name` (e.g.
/// "whatsapp.send", "telegram.send") to the right channel adapter.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> anyhow::Result<()>;
}

struct QueueState {
    sender: mpsc::Sender<Job>,
    completed: Arc<Mutex<VecDeque<JobRecord>>>,
    dead_letter: Arc<Mutex<VecDeque<JobRecord>>>,
}

/// A durable-by-retry outbound queue broker. "Durable" here means jobs
/// survive provider failures via bounded retry, not a crash of the process
/// itself — there is no disk-backed journal, the same in-memory-only
/// tradeoff `MessageBus` makes.
pub struct QueueBroker {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl QueueBroker {
    pub fn new() -> Self {
        QueueBroker {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a named queue with `worker_count` concurrent workers, each
    /// pulling jobs from a bounded channel and dispatching to `handler`.
    pub async fn register_queue(
        &self,
        queue_name: impl Into<String>,
        worker_count: usize,
        buffer_size: usize,
        handler: Arc<dyn JobHandler>,
    ) {
        let queue_name = queue_name.into();
        let (tx, rx) = mpsc::channel::<Job>(buffer_size);
        let rx = Arc::new(Mutex::new(rx));
        let completed = Arc::new(Mutex::new(VecDeque::with_capacity(DEFAULT_KEEP_COMPLETED)));
        let dead_letter = Arc::new(Mutex::new(VecDeque::with_capacity(DEFAULT_KEEP_FAILED)));

        for worker_id in 0..worker_count.max(1) {
            let rx = rx.clone();
            let tx = tx.clone();
            let handler = handler.clone();
            let completed = completed.clone();
            let dead_letter = dead_letter.clone();
            let queue_name = queue_name.clone();

            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        debug!(queue = %queue_name, worker_id, "queue worker shutting down: channel closed");
                        break;
                    };
                    run_job(job, &tx, &handler, &completed, &dead_letter, &queue_name).await;
                }
            });
        }

        let mut queues = self.queues.lock().await;
        queues.insert(queue_name, QueueState { sender: tx, completed, dead_letter });
    }

    /// Enqueues a job. Returns `Err` if the queue is not registered or its
    /// channel is closed — callers must treat this as "delivery degraded,
    /// not fatal to the turn" and log accordingly, the way the ingress
    /// webhook still acks even when outbound dispatch is unavailable.
    pub async fn enqueue(
        &self,
        queue_name: &str,
        job_name: impl Into<String>,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<(), QueueError> {
        let queues = self.queues.lock().await;
        let state = queues
            .get(queue_name)
            .ok_or_else(|| QueueError::UnknownQueue(queue_name.to_string()))?;

        let job = Job::new(queue_name, job_name, payload, &options);
        state
            .sender
            .send(job)
            .await
            .map_err(|_| QueueError::EnqueueFailed(queue_name.to_string()))
    }

    pub async fn completed_count(&self, queue_name: &str) -> usize {
        let queues = self.queues.lock().await;
        match queues.get(queue_name) {
            Some(state) => state.completed.lock().await.len(),
            None => 0,
        }
    }

    pub async fn dead_letter_count(&self, queue_name: &str) -> usize {
        let queues = self.queues.lock().await;
        match queues.get(queue_name) {
            Some(state) => state.dead_letter.lock().await.len(),
            None => 0,
        }
    }
}

impl Default for QueueBroker {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(
    job: Job,
    tx: &mpsc::Sender<Job>,
    handler: &Arc<dyn JobHandler>,
    completed: &Arc<Mutex<VecDeque<JobRecord>>>,
    dead_letter: &Arc<Mutex<VecDeque<JobRecord>>>,
    queue_name: &str,
) {
    match handler.handle(&job).await {
        Ok(()) => {
            info!(queue = %queue_name, job_id = %job.id, job_name = %job.job_name, attempt = job.attempt, "job completed");
            push_bounded(completed, JobRecord {
                job_id: job.id,
                job_name: job.job_name.clone(),
                attempts_made: job.attempt + 1,
                finished_at: chrono::Utc::now(),
                error: None,
            }, DEFAULT_KEEP_COMPLETED)
            .await;
        }
        Err(e) => {
            if job.exhausted() {
                error!(
                    queue = %queue_name,
                    job_id = %job.id,
                    job_name = %job.job_name,
                    attempts = job.attempt + 1,
                    error = %e,
                    "CRITICAL: job exhausted retry attempts, moved to dead letter"
                );
                push_bounded(dead_letter, JobRecord {
                    job_id: job.id,
                    job_name: job.job_name.clone(),
                    attempts_made: job.attempt + 1,
                    finished_at: chrono::Utc::now(),
                    error: Some(e.to_string()),
                }, DEFAULT_KEEP_FAILED)
                .await;
            } else {
                let retry = job.next_attempt();
                let delay = retry.backoff;
                tracing::warn!(
                    queue = %queue_name,
                    job_id = %retry.id,
                    job_name = %retry.job_name,
                    attempt = retry.attempt,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "job failed, retrying after backoff"
                );
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if tx.send(retry).await.is_err() {
                        error!("queue closed while scheduling retry, job dropped");
                    }
                });
            }
        }
    }
}

async fn push_bounded(records: &Arc<Mutex<VecDeque<JobRecord>>>, record: JobRecord, cap: usize) {
    let mut records = records.lock().await;
    if records.len() >= cap {
        records.pop_front();
    }
    records.push_back(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysOk;
    #[async_trait]
    impl JobHandler for AlwaysOk {
        async fn handle(&self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl JobHandler for AlwaysFail {
        async fn handle(&self, _job: &Job) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("simulated failure"))
        }
    }

    struct CountingHandler(Arc<AtomicUsize>);
    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_enqueue_unknown_queue_errors() {
        let broker = QueueBroker::new();
        let result = broker
            .enqueue("missing", "job", serde_json::json!({}), EnqueueOptions::default())
            .await;
        assert!(matches!(result, Err(QueueError::UnknownQueue(_))));
    }

    #[tokio::test]
    async fn test_job_completes_and_is_recorded() {
        let broker = QueueBroker::new();
        broker.register_queue("outbound", 1, 8, Arc::new(AlwaysOk)).await;
        broker
            .enqueue("outbound", "whatsapp.send", serde_json::json!({"to": "1"}), EnqueueOptions::default())
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(broker.completed_count("outbound").await, 1);
    }

    #[tokio::test]
    async fn test_job_exhausts_to_dead_letter() {
        let broker = QueueBroker::new();
        broker.register_queue("outbound", 1, 8, Arc::new(AlwaysFail)).await;
        let options = EnqueueOptions {
            attempts: 1,
            initial_backoff: std::time::Duration::from_millis(1),
        };
        broker
            .enqueue("outbound", "whatsapp.send", serde_json::json!({}), options)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(broker.dead_letter_count("outbound").await, 1);
    }

    #[tokio::test]
    async fn test_multiple_jobs_all_processed() {
        let broker = QueueBroker::new();
        let counter = Arc::new(AtomicUsize::new(0));
        broker.register_queue("outbound", 4, 32, Arc::new(CountingHandler(counter.clone()))).await;

        for i in 0..10 {
            broker
                .enqueue("outbound", "job", serde_json::json!({"i": i}), EnqueueOptions::default())
                .await
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
