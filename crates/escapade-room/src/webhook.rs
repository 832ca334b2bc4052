//! Fire-and-forget webhook delivery.
//!
//! Room actors hand jobs to a bounded queue and move on; a worker task
//! posts them with a per-attempt timeout and one retry, at most
//! `webhook_concurrency` at a time. Delivery is best-effort and outside
//! the room's event ordering.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::EngineConfig;

/// One POST to make.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookJob {
    pub url: String,
    pub body: Value,
}

/// Sending half of the delivery queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WebhookQueue {
    tx: mpsc::Sender<WebhookJob>,
}

impl WebhookQueue {
    /// Starts the delivery worker. It stops once every queue handle has
    /// been dropped and the backlog is drained.
    pub fn spawn(config: &EngineConfig) -> (Self, JoinHandle<()>) {
        let (queue, rx) = Self::detached(config.webhook_queue_size);
        let worker = tokio::spawn(run_worker(
            rx,
            reqwest::Client::new(),
            Delivery {
                timeout: config.webhook_timeout,
                retry_delay: config.webhook_retry_delay,
                concurrency: config.webhook_concurrency.max(1),
            },
        ));
        (queue, worker)
    }

    /// A queue whose jobs are consumed by the caller instead of a worker.
    pub fn detached(capacity: usize) -> (Self, mpsc::Receiver<WebhookJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues a job without waiting. Returns `false` if it was dropped
    /// because the queue is full or the worker is gone.
    pub fn enqueue(&self, job: WebhookJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(url = %job.url, "webhook queue full, dropping delivery");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(url = %job.url, "webhook worker stopped, dropping delivery");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    timeout: Duration,
    retry_delay: Duration,
    concurrency: usize,
}

/// Pulls jobs only while a delivery slot is free, so a slow endpoint
/// backs jobs up into the bounded queue instead of piling up tasks.
async fn run_worker(mut rx: mpsc::Receiver<WebhookJob>, client: reqwest::Client, delivery: Delivery) {
    let slots = Arc::new(Semaphore::new(delivery.concurrency));
    loop {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        let Some(job) = rx.recv().await else {
            break;
        };
        let client = client.clone();
        tokio::spawn(async move {
            deliver(&client, &job, delivery.timeout, delivery.retry_delay).await;
            drop(permit);
        });
    }

    // Let in-flight deliveries finish before reporting the worker done.
    let all = u32::try_from(delivery.concurrency).unwrap_or(u32::MAX);
    let _ = slots.acquire_many(all).await;
    debug!("webhook worker stopped");
}

/// Posts `job`, retrying once. Returns whether either attempt succeeded.
async fn deliver(
    client: &reqwest::Client,
    job: &WebhookJob,
    timeout: Duration,
    retry_delay: Duration,
) -> bool {
    for attempt in 1..=2 {
        let result = client
            .post(&job.url)
            .timeout(timeout)
            .json(&job.body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        match result {
            Ok(resp) => {
                debug!(url = %job.url, status = %resp.status(), attempt, "webhook delivered");
                return true;
            }
            Err(e) if attempt == 1 => {
                debug!(url = %job.url, error = %e, "webhook attempt failed, retrying");
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => {
                warn!(url = %job.url, error = %e, "webhook delivery failed");
            }
        }
    }
    false
}
