//! Outbound activity delivery
//!
//! Tasks are durable records in the store. The drain marks a task
//! delivering, attempts each still-pending recipient with a signed POST,
//! and either retires the task or reschedules it with exponential
//! backoff. Per-recipient outcomes are appended to an NDJSON log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::actors::ActorStore;
use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::store::{self, ns, Store};

/// Backoff ceiling between retries
const MAX_BACKOFF_SECS: i64 = 300;
/// Worker poll interval when no enqueue wakes it earlier
const WORKER_POLL: Duration = Duration::from_secs(5);
/// Terminal tasks older than this are swept
pub const CLEANUP_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Delivering,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Delivered,
    Failed,
}

/// One recipient of a task, with its own delivery state
///
/// Successful recipients are never re-attempted; only pending ones are
/// retried on later drains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecipient {
    pub uri: String,
    pub status: RecipientStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub id: String,
    pub activity: Value,
    pub recipients: Vec<TaskRecipient>,
    pub retry_count: u32,
    pub next_retry_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sender_handle: Option<String>,
}

/// Queue size broken down by status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub pending: usize,
    pub delivering: usize,
    pub delivered: usize,
    pub failed: usize,
    pub total: usize,
}

/// One per-recipient outcome line in the task log
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogEntry {
    at: DateTime<Utc>,
    recipient: String,
    inbox: Option<String>,
    success: bool,
    error: Option<String>,
}

/// `min(2^retryCount * 1s, 5min)`
fn backoff_delay(retry_count: u32) -> chrono::Duration {
    let secs = 2i64
        .checked_pow(retry_count.min(16))
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    chrono::Duration::seconds(secs)
}

pub struct DeliveryQueue {
    config: Arc<FederationConfig>,
    store: Arc<dyn Store>,
    actors: Arc<ActorStore>,
    http_client: Arc<reqwest::Client>,
    notify: Notify,
    drain_lock: Mutex<()>,
}

impl DeliveryQueue {
    pub fn new(
        config: Arc<FederationConfig>,
        store: Arc<dyn Store>,
        actors: Arc<ActorStore>,
        http_client: Arc<reqwest::Client>,
    ) -> Self {
        Self {
            config,
            store,
            actors,
            http_client,
            notify: Notify::new(),
            drain_lock: Mutex::new(()),
        }
    }

    /// Persist a delivery task and wake the worker
    ///
    /// A no-op when federation is disabled or no recipient remains after
    /// de-duplication; returns the task id otherwise.
    pub async fn enqueue(
        &self,
        activity: Value,
        recipients: Vec<String>,
        sender_handle: Option<String>,
    ) -> Result<Option<String>> {
        if !self.config.federation.enabled {
            tracing::debug!("Federation disabled, dropping outbound activity");
            return Ok(None);
        }

        let mut seen = std::collections::HashSet::new();
        let recipients: Vec<TaskRecipient> = recipients
            .into_iter()
            .filter(|uri| seen.insert(uri.clone()))
            .map(|uri| TaskRecipient {
                uri,
                status: RecipientStatus::Pending,
                last_error: None,
            })
            .collect();
        if recipients.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let task = DeliveryTask {
            id: ulid::Ulid::new().to_string(),
            activity,
            recipients,
            retry_count: 0,
            next_retry_at: now,
            status: TaskStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
            sender_handle,
        };
        store::put_json(self.store.as_ref(), ns::DELIVERY_QUEUE, &task.id, &task).await?;
        tracing::info!(
            task_id = %task.id,
            recipients = task.recipients.len(),
            "Queued activity for delivery"
        );
        self.notify.notify_one();
        Ok(Some(task.id))
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<DeliveryTask>> {
        store::get_json(self.store.as_ref(), ns::DELIVERY_QUEUE, task_id).await
    }

    /// All tasks currently in the queue, in unspecified order
    pub async fn tasks(&self) -> Result<Vec<DeliveryTask>> {
        let mut tasks = Vec::new();
        for key in self.store.list(ns::DELIVERY_QUEUE).await? {
            if let Some(task) =
                store::get_json::<DeliveryTask>(self.store.as_ref(), ns::DELIVERY_QUEUE, &key)
                    .await?
            {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    pub async fn stats(&self) -> Result<DeliveryStats> {
        let mut stats = DeliveryStats::default();
        for key in self.store.list(ns::DELIVERY_QUEUE).await? {
            let Some(task) =
                store::get_json::<DeliveryTask>(self.store.as_ref(), ns::DELIVERY_QUEUE, &key)
                    .await?
            else {
                continue;
            };
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Delivering => stats.delivering += 1,
                TaskStatus::Delivered => stats.delivered += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// One drain pass: attempt every due pending task
    ///
    /// Returns the number of tasks attempted. Passes are serialized so a
    /// task is owned by at most one drain at a time.
    pub async fn run_once(&self) -> Result<usize> {
        let _drain = self.drain_lock.lock().await;
        let now = Utc::now();
        let mut attempted = 0;

        for key in self.store.list(ns::DELIVERY_QUEUE).await? {
            let Some(task) =
                store::get_json::<DeliveryTask>(self.store.as_ref(), ns::DELIVERY_QUEUE, &key)
                    .await?
            else {
                continue;
            };
            if task.status != TaskStatus::Pending || task.next_retry_at > now {
                continue;
            }
            attempted += 1;
            self.deliver_task(task).await?;
        }
        Ok(attempted)
    }

    /// Attempt one task's pending recipients and apply the outcome policy
    async fn deliver_task(&self, mut task: DeliveryTask) -> Result<()> {
        task.status = TaskStatus::Delivering;
        task.updated_at = Utc::now();
        store::put_json(self.store.as_ref(), ns::DELIVERY_QUEUE, &task.id, &task).await?;

        let body = serde_json::to_vec(&task.activity).map_err(|e| {
            FederationError::Federation(format!("failed to serialize activity: {}", e))
        })?;
        let signer = match &task.sender_handle {
            Some(handle) => self.actors.get(handle).await?,
            None => None,
        };

        for index in 0..task.recipients.len() {
            if task.recipients[index].status != RecipientStatus::Pending {
                continue;
            }
            let uri = task.recipients[index].uri.clone();
            let outcome = self.deliver_to_recipient(&uri, &body, &signer).await;

            let entry = LogEntry {
                at: Utc::now(),
                recipient: uri.clone(),
                inbox: outcome.as_ref().ok().cloned(),
                success: outcome.is_ok(),
                error: outcome.as_ref().err().map(|e| e.to_string()),
            };
            if let Ok(line) = serde_json::to_string(&entry) {
                if let Err(error) = self.store.append(ns::DELIVERY_LOGS, &task.id, &line).await {
                    tracing::warn!(task_id = %task.id, %error, "Failed to append delivery log");
                }
            }

            match outcome {
                Ok(_) => {
                    task.recipients[index].status = RecipientStatus::Delivered;
                    task.recipients[index].last_error = None;
                }
                Err(error) => {
                    tracing::warn!(
                        task_id = %task.id,
                        recipient = %uri,
                        %error,
                        "Delivery attempt failed"
                    );
                    task.recipients[index].last_error = Some(error.to_string());
                }
            }
        }

        let now = Utc::now();
        let pending = task
            .recipients
            .iter()
            .filter(|r| r.status == RecipientStatus::Pending)
            .count();

        if pending == 0 {
            // Every recipient delivered; the task is done and removed
            tracing::info!(task_id = %task.id, "Delivery complete");
            self.store.delete(ns::DELIVERY_QUEUE, &task.id).await?;
            return Ok(());
        }

        if task.retry_count >= self.config.federation.max_delivery_retries {
            for recipient in &mut task.recipients {
                if recipient.status == RecipientStatus::Pending {
                    recipient.status = RecipientStatus::Failed;
                }
            }
            task.status = TaskStatus::Failed;
            task.error = Some(format!(
                "gave up after {} retries, {} recipient(s) unreached",
                task.retry_count, pending
            ));
            task.updated_at = now;
            tracing::warn!(
                task_id = %task.id,
                unreached = pending,
                "Delivery failed terminally"
            );
        } else {
            task.retry_count += 1;
            task.next_retry_at = now + backoff_delay(task.retry_count);
            task.status = TaskStatus::Pending;
            task.updated_at = now;
            tracing::info!(
                task_id = %task.id,
                retry = task.retry_count,
                next_retry_at = %task.next_retry_at,
                "Delivery rescheduled"
            );
        }
        store::put_json(self.store.as_ref(), ns::DELIVERY_QUEUE, &task.id, &task).await
    }

    /// Resolve a recipient's inbox and POST the signed activity to it
    ///
    /// Returns the inbox URL used on success.
    async fn deliver_to_recipient(
        &self,
        recipient_uri: &str,
        body: &[u8],
        signer: &Option<crate::actors::StoredActor>,
    ) -> Result<String> {
        let inbox = self.resolve_inbox(recipient_uri).await?;

        let mut request = self
            .http_client
            .post(&inbox)
            .header("Content-Type", "application/activity+json")
            .timeout(self.config.federation_timeout());

        if let Some(actor) = signer {
            let signed = super::signature::sign_request(
                "POST",
                &inbox,
                Some(body),
                &actor.private_key_pem,
                &actor.public_key_id,
                None,
            )?;
            request = request
                .header("Date", signed.date)
                .header("Signature", signed.signature);
            if let Some(digest) = signed.digest {
                request = request.header("Digest", digest);
            }
        }

        let response = request
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| FederationError::Delivery(format!("POST {}: {}", inbox, e)))?;

        if !response.status().is_success() {
            return Err(FederationError::Delivery(format!(
                "inbox {} rejected activity: HTTP {}",
                inbox,
                response.status()
            )));
        }
        Ok(inbox)
    }

    /// Resolve an actor URI to its inbox
    ///
    /// URIs that already point at an inbox (the shared-inbox fallback the
    /// enqueuer may synthesize) are used as-is.
    async fn resolve_inbox(&self, recipient_uri: &str) -> Result<String> {
        if recipient_uri.ends_with("/inbox") {
            return Ok(recipient_uri.to_string());
        }

        let response = self
            .http_client
            .get(recipient_uri)
            .header(
                "Accept",
                "application/activity+json, application/ld+json; \
                 profile=\"https://www.w3.org/ns/activitystreams\"",
            )
            .timeout(self.config.federation_timeout())
            .send()
            .await
            .map_err(|e| FederationError::Delivery(format!("GET {}: {}", recipient_uri, e)))?;

        if !response.status().is_success() {
            return Err(FederationError::Delivery(format!(
                "actor fetch {} failed: HTTP {}",
                recipient_uri,
                response.status()
            )));
        }

        let actor: Value = response.json().await.map_err(|e| {
            FederationError::Delivery(format!("actor {} is not JSON: {}", recipient_uri, e))
        })?;

        actor
            .get("inbox")
            .and_then(Value::as_str)
            .or_else(|| {
                actor
                    .get("endpoints")
                    .and_then(|e| e.get("sharedInbox"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .ok_or_else(|| {
                FederationError::Delivery(format!("actor {} has no inbox", recipient_uri))
            })
    }

    /// Sweep terminal tasks older than `max_age`
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut removed = 0;
        for key in self.store.list(ns::DELIVERY_QUEUE).await? {
            let Some(task) =
                store::get_json::<DeliveryTask>(self.store.as_ref(), ns::DELIVERY_QUEUE, &key)
                    .await?
            else {
                continue;
            };
            let terminal = matches!(task.status, TaskStatus::Delivered | TaskStatus::Failed);
            if terminal && task.updated_at < cutoff {
                self.store.delete(ns::DELIVERY_QUEUE, &key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Cleaned up terminal delivery tasks");
        }
        Ok(removed)
    }

    /// Background worker: drain on wakeup or poll interval, sweep hourly
    ///
    /// Runs until the owning task is aborted; cancellation lands between
    /// drain passes.
    pub async fn run(self: Arc<Self>) {
        let mut last_cleanup = std::time::Instant::now();
        loop {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(WORKER_POLL) => {}
            }
            if let Err(error) = self.run_once().await {
                tracing::error!(%error, "Delivery drain failed");
            }
            if last_cleanup.elapsed() >= CLEANUP_MAX_AGE {
                if let Err(error) = self.cleanup(CLEANUP_MAX_AGE).await {
                    tracing::error!(%error, "Delivery cleanup failed");
                }
                last_cleanup = std::time::Instant::now();
            }
        }
    }
}
