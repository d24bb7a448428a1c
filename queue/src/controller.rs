//! Admission controller.
//!
//! The controller owns one admission worker per active event. Workers are
//! started lazily on the first join (or by [`AdmissionController::configure`])
//! and live in a registry behind a mutex. A worker whose waiting set stays
//! empty for [`IDLE_TICKS`] consecutive ticks deregisters itself and exits;
//! the next join starts a fresh one.
//!
//! ```text
//! join ──► waiting set ──(worker tick: admit batch)──► ready + ticket
//!                                                        │
//!                         gateway guard: validate ◄──────┤
//!                         checkout:      consume  ◄──────┘
//! ```

use crate::config::{QueueConfig, QueueSettings};
use crate::error::{QueueError, Result};
use crate::model::{Admitted, EntryStatus, JoinOutcome, JoinStatus, QueueEntry, QueueStats, Ticket};
use crate::providers::QueueStore;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use travio_core::environment::Clock;
use travio_runtime::Worker;
use uuid::Uuid;

/// Bytes of entropy in an admission ticket.
pub const TICKET_BYTES: usize = 16;

/// Consecutive ticks with an empty waiting set before a worker retires.
pub const IDLE_TICKS: u32 = 3;

/// Mint an opaque admission ticket (128 random bits, base64url).
#[must_use]
pub fn mint_ticket() -> String {
    let bytes: [u8; TICKET_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

struct Inner<S, C> {
    store: S,
    clock: C,
    settings: QueueSettings,
    last_score: AtomicI64,
    worker_ids: AtomicU64,
}

/// A running worker and the id that lets it recognise its own entry.
struct Registration {
    id: u64,
    retiring: bool,
    worker: Worker,
}

type Registry = Mutex<HashMap<String, Registration>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Registration>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: QueueStore, C: Clock> Inner<S, C> {
    /// Strictly increasing join score in microseconds since the epoch.
    ///
    /// Microseconds keep scores exact in the cache's `f64` representation.
    fn next_score(&self) -> i64 {
        let now = self.clock.now().timestamp_micros();
        let previous = self
            .last_score
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    async fn config_for(&self, event_id: &str) -> Result<QueueConfig> {
        Ok(self
            .store
            .load_config(event_id)
            .await?
            .unwrap_or_else(|| QueueConfig::for_event(event_id)))
    }

    async fn admit_batch(&self, config: &QueueConfig) -> Result<Vec<Admitted>> {
        if !config.enabled {
            return Ok(Vec::new());
        }

        let tickets: Vec<String> = (0..config.batch_size).map(|_| mint_ticket()).collect();
        let expires_at = ticket_expiry(config, self.clock.now());

        let admitted = self
            .store
            .admit(&config.event_id, &tickets, config.token_ttl, expires_at)
            .await?;

        if !admitted.is_empty() {
            metrics::counter!("queue.admitted").increment(admitted.len() as u64);
            tracing::info!(
                event_id = %config.event_id,
                admitted = admitted.len(),
                "Admitted batch from queue"
            );
        }
        Ok(admitted)
    }
}

/// Virtual waiting room over a [`QueueStore`].
///
/// Cheap to clone; clones share the store and the worker registry.
pub struct AdmissionController<S, C> {
    inner: Arc<Inner<S, C>>,
    workers: Arc<Registry>,
}

impl<S, C> Clone for AdmissionController<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            workers: Arc::clone(&self.workers),
        }
    }
}

impl<S, C> AdmissionController<S, C>
where
    S: QueueStore + 'static,
    C: Clock + 'static,
{
    /// Create a controller. No worker runs until an event is joined or
    /// configured.
    #[must_use]
    pub fn new(store: S, clock: C, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                settings,
                last_score: AtomicI64::new(0),
                worker_ids: AtomicU64::new(0),
            }),
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the waiting room of `event_id`.
    ///
    /// Repeated joins are idempotent: a waiting user keeps their original
    /// place, and an admitted user gets their ready entry back. Disabled
    /// events answer with a synthetic ready entry and no ticket.
    ///
    /// # Errors
    ///
    /// - [`QueueError::QueueFull`] if the waiting set is at capacity
    /// - [`QueueError::Cache`] on cache failure
    pub async fn join(&self, event_id: &str, user_id: &str, session_id: &str) -> Result<JoinOutcome> {
        let config = self.inner.config_for(event_id).await?;
        let now = self.inner.clock.now();

        if !config.enabled {
            return Ok(JoinOutcome {
                entry: QueueEntry {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    session_id: session_id.to_string(),
                    event_id: event_id.to_string(),
                    position: 0,
                    token: None,
                    joined_at: now,
                    estimated_wait_secs: 0,
                    status: EntryStatus::Ready,
                    expires_at: ticket_expiry(&config, now),
                },
                position: 0,
                status: JoinStatus::New,
            });
        }

        let existing = self.inner.store.entry(event_id, user_id).await?;
        if let Some(existing) =
            existing.filter(|e| e.status == EntryStatus::Ready && !e.is_expired(now))
        {
            return Ok(JoinOutcome {
                entry: existing,
                position: 0,
                status: JoinStatus::Existing,
            });
        }

        if self.inner.store.rank(event_id, user_id).await?.is_none() {
            let waiting = self.inner.store.waiting_count(event_id).await?;
            if waiting >= self.inner.settings.max_size {
                tracing::warn!(event_id = %event_id, waiting, "Queue full, join rejected");
                return Err(QueueError::QueueFull);
            }
        }

        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            event_id: event_id.to_string(),
            position: 0,
            token: None,
            joined_at: now,
            estimated_wait_secs: 0,
            status: EntryStatus::Waiting,
            expires_at: now + to_chrono(self.inner.settings.entry_ttl),
        };

        #[allow(clippy::cast_precision_loss)]
        let score = self.inner.next_score() as f64;
        let enqueued = self
            .inner
            .store
            .enqueue(&entry, score, self.inner.settings.entry_ttl)
            .await?;

        let mut entry = match enqueued.status {
            JoinStatus::New => {
                metrics::counter!("queue.joined").increment(1);
                tracing::debug!(event_id = %event_id, user_id = %user_id, "User joined queue");
                entry
            }
            JoinStatus::Existing => self
                .inner
                .store
                .entry(event_id, user_id)
                .await?
                .unwrap_or(entry),
        };

        let position = enqueued.rank + 1;
        entry.position = position;
        entry.estimated_wait_secs = config.estimated_wait_secs(position);

        self.ensure_worker(&config);

        Ok(JoinOutcome {
            entry,
            position,
            status: enqueued.status,
        })
    }

    /// Current entry of a user with a freshly computed position.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotInQueue`] if the user has no entry
    /// - [`QueueError::Cache`] on cache failure
    pub async fn position(&self, event_id: &str, user_id: &str) -> Result<QueueEntry> {
        let mut entry = self
            .inner
            .store
            .entry(event_id, user_id)
            .await?
            .ok_or(QueueError::NotInQueue)?;
        let now = self.inner.clock.now();

        if entry.is_expired(now) && entry.status != EntryStatus::Completed {
            entry.status = EntryStatus::Expired;
            entry.position = 0;
            return Ok(entry);
        }

        if entry.status == EntryStatus::Waiting {
            match self.inner.store.rank(event_id, user_id).await? {
                Some(rank) => {
                    let config = self.inner.config_for(event_id).await?;
                    entry.position = rank + 1;
                    entry.estimated_wait_secs = config.estimated_wait_secs(entry.position);
                }
                None => {
                    entry.status = EntryStatus::Expired;
                    entry.position = 0;
                }
            }
        }

        Ok(entry)
    }

    /// Leave the waiting room. Leaving twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] on cache failure.
    pub async fn leave(&self, event_id: &str, user_id: &str) -> Result<()> {
        self.inner.store.remove(event_id, user_id).await?;
        tracing::debug!(event_id = %event_id, user_id = %user_id, "User left queue");
        Ok(())
    }

    /// Look a ticket up, distinguishing unknown from expired.
    ///
    /// # Errors
    ///
    /// - [`QueueError::TicketInvalid`] if the ticket is unknown or consumed
    /// - [`QueueError::TicketExpired`] if the ticket outlived its ttl
    /// - [`QueueError::Cache`] on cache failure
    pub async fn require_ticket(&self, ticket: &str) -> Result<Ticket> {
        let found = self
            .inner
            .store
            .ticket(ticket)
            .await?
            .ok_or(QueueError::TicketInvalid)?;
        if found.expires_at <= self.inner.clock.now() {
            return Err(QueueError::TicketExpired);
        }
        Ok(found)
    }

    /// Whether a ticket is currently valid, with the identity it admits.
    /// Does not consume the ticket.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] on cache failure.
    pub async fn validate_ticket(&self, ticket: &str) -> Result<Option<Ticket>> {
        match self.require_ticket(ticket).await {
            Ok(found) => Ok(Some(found)),
            Err(QueueError::TicketInvalid | QueueError::TicketExpired) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Use up a ticket. Consuming a missing ticket succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] on cache failure.
    pub async fn consume_ticket(&self, ticket: &str) -> Result<()> {
        if let Some(consumed) = self.inner.store.consume(ticket).await? {
            tracing::debug!(
                event_id = %consumed.event_id,
                user_id = %consumed.user_id,
                "Admission ticket consumed"
            );
        }
        Ok(())
    }

    /// Queue statistics of an event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] on cache failure.
    pub async fn stats(&self, event_id: &str) -> Result<QueueStats> {
        let config = self.inner.config_for(event_id).await?;
        let total_waiting = self.inner.store.waiting_count(event_id).await?;
        let total_admitted = self.inner.store.admitted_count(event_id).await?;
        Ok(QueueStats {
            event_id: event_id.to_string(),
            total_waiting,
            total_admitted,
            admission_rate_per_min: config.admission_rate_per_min(),
            estimated_wait_secs: config.estimated_wait_secs(total_waiting),
        })
    }

    /// Effective configuration of an event (stored or default).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] on cache failure.
    pub async fn config(&self, event_id: &str) -> Result<QueueConfig> {
        self.inner.config_for(event_id).await
    }

    /// Persist a configuration and restart the event's worker with it.
    ///
    /// A disabled event keeps no worker; tickets already issued stay valid
    /// until their ttl.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidConfig`] if validation fails
    /// - [`QueueError::Cache`] on cache failure
    pub async fn configure(&self, config: QueueConfig) -> Result<()> {
        config.validate()?;
        self.inner.store.save_config(&config).await?;

        let previous = lock(&self.workers).remove(&config.event_id);
        if let Some(registration) = previous {
            registration.worker.stop().await;
        }
        if config.enabled {
            self.ensure_worker(&config);
        }

        tracing::info!(
            event_id = %config.event_id,
            batch_size = config.batch_size,
            interval_secs = config.admission_interval.as_secs(),
            enabled = config.enabled,
            "Queue configured"
        );
        Ok(())
    }

    /// Run one admission step for an event now, outside the worker schedule.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] on cache failure.
    pub async fn admit_next(&self, event_id: &str) -> Result<Vec<Admitted>> {
        let config = self.inner.config_for(event_id).await?;
        self.inner.admit_batch(&config).await
    }

    /// Whether an admission worker is running for `event_id`.
    #[must_use]
    pub fn has_worker(&self, event_id: &str) -> bool {
        lock(&self.workers)
            .get(event_id)
            .is_some_and(|registration| !registration.worker.is_finished())
    }

    /// Number of registered admission workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Stop every admission worker.
    pub async fn shutdown(&self) {
        let workers: Vec<Worker> = lock(&self.workers)
            .drain()
            .map(|(_, registration)| registration.worker)
            .collect();
        let count = workers.len();
        for worker in workers {
            worker.stop().await;
        }
        tracing::info!(workers = count, "Admission workers stopped");
    }

    fn ensure_worker(&self, config: &QueueConfig) {
        let mut workers = lock(&self.workers);
        if workers
            .get(&config.event_id)
            .is_some_and(|registration| !registration.retiring && !registration.worker.is_finished())
        {
            return;
        }

        let id = self.inner.worker_ids.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let registry = Arc::clone(&self.workers);
        let config = config.clone();
        let name = format!("admission:{}", config.event_id);
        let event_id = config.event_id.clone();

        let worker = Worker::spawn(name, move |cancel| async move {
            let mut ticker = tokio::time::interval(config.admission_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            tracing::info!(event_id = %config.event_id, "Admission worker started");

            let mut idle_ticks = 0;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inner.admit_batch(&config).await {
                            tracing::error!(
                                event_id = %config.event_id,
                                error = %e,
                                "Admission batch failed"
                            );
                        }
                        match inner.store.waiting_count(&config.event_id).await {
                            Ok(0) => idle_ticks += 1,
                            Ok(_) => idle_ticks = 0,
                            Err(_) => {}
                        }
                        if idle_ticks >= IDLE_TICKS
                            && retire(&inner, &registry, &config.event_id, id).await
                        {
                            tracing::info!(event_id = %config.event_id, "Admission worker idle, retiring");
                            break;
                        }
                    }
                }
            }
            tracing::info!(event_id = %config.event_id, "Admission worker stopped");
        });
        workers.insert(
            event_id,
            Registration {
                id,
                retiring: false,
                worker,
            },
        );
    }
}

/// Try to retire worker `id` of `event_id`. Returns whether it should exit.
///
/// The entry is flagged first so a concurrent join spawns a replacement
/// instead of relying on this worker, then the waiting set is checked again:
/// a join that slipped in before the flag keeps the worker alive.
async fn retire<S: QueueStore, C>(
    inner: &Inner<S, C>,
    registry: &Registry,
    event_id: &str,
    id: u64,
) -> bool {
    match lock(registry).get_mut(event_id) {
        Some(registration) if registration.id == id => registration.retiring = true,
        _ => return true,
    }

    let still_idle = matches!(inner.store.waiting_count(event_id).await, Ok(0));

    let mut workers = lock(registry);
    match workers.get_mut(event_id) {
        Some(registration) if registration.id == id => {
            if still_idle {
                workers.remove(event_id);
                true
            } else {
                registration.retiring = false;
                false
            }
        }
        _ => true,
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Expiry of a ticket minted at `now` for `config`.
#[must_use]
pub fn ticket_expiry(config: &QueueConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now + to_chrono(config.token_ttl)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::MockQueueStore;
    use std::time::Duration;
    use travio_testing::mocks::{ManualClock, test_clock};

    fn controller() -> (AdmissionController<MockQueueStore, ManualClock>, ManualClock) {
        let clock = ManualClock::starting_at(test_clock().now());
        let controller =
            AdmissionController::new(MockQueueStore::new(), clock.clone(), QueueSettings::default());
        (controller, clock)
    }

    #[test]
    fn tickets_are_long_and_distinct() {
        let a = mint_ticket();
        let b = mint_ticket();
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn scores_strictly_increase_under_a_frozen_clock() {
        let (controller, _) = controller();
        let first = controller.inner.next_score();
        let second = controller.inner.next_score();
        assert!(second > first);
    }

    #[tokio::test]
    async fn repeated_join_keeps_place() {
        let (controller, _) = controller();
        controller.join("evt", "u1", "s1").await.unwrap();
        controller.join("evt", "u2", "s2").await.unwrap();

        let again = controller.join("evt", "u1", "s1-retry").await.unwrap();
        assert_eq!(again.status, JoinStatus::Existing);
        assert_eq!(again.position, 1);
        assert_eq!(again.entry.session_id, "s1");
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn disabled_event_bypasses_queue() {
        let (controller, _) = controller();
        controller
            .configure(QueueConfig::for_event("evt").with_enabled(false))
            .await
            .unwrap();

        let outcome = controller.join("evt", "u1", "s1").await.unwrap();
        assert_eq!(outcome.entry.status, EntryStatus::Ready);
        assert_eq!(outcome.position, 0);
        assert!(!controller.has_worker("evt"));
        assert_eq!(controller.stats("evt").await.unwrap().total_waiting, 0);
    }

    #[tokio::test]
    async fn full_queue_rejects_newcomers_but_not_members() {
        let clock = ManualClock::starting_at(test_clock().now());
        let controller = AdmissionController::new(
            MockQueueStore::new(),
            clock,
            QueueSettings::default().with_max_size(2),
        );
        controller.join("evt", "u1", "s").await.unwrap();
        controller.join("evt", "u2", "s").await.unwrap();

        assert_eq!(controller.join("evt", "u3", "s").await.unwrap_err(), QueueError::QueueFull);
        assert!(controller.join("evt", "u1", "s").await.is_ok());
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn expired_ticket_is_distinguished() {
        let (controller, clock) = controller();
        controller
            .configure(
                QueueConfig::for_event("evt")
                    .with_batch_size(1)
                    .with_token_ttl(Duration::from_secs(60)),
            )
            .await
            .unwrap();
        controller.join("evt", "u1", "s").await.unwrap();
        let admitted = controller.admit_next("evt").await.unwrap();
        let ticket = &admitted[0].ticket;

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(
            controller.require_ticket(ticket).await.unwrap_err(),
            QueueError::TicketExpired
        );
        assert!(controller.validate_ticket(ticket).await.unwrap().is_none());
        assert_eq!(
            controller.require_ticket("nope").await.unwrap_err(),
            QueueError::TicketInvalid
        );
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn leaving_marks_position_lookup_not_in_queue() {
        let (controller, _) = controller();
        controller.join("evt", "u1", "s").await.unwrap();
        controller.leave("evt", "u1").await.unwrap();
        controller.leave("evt", "u1").await.unwrap();

        assert_eq!(
            controller.position("evt", "u1").await.unwrap_err(),
            QueueError::NotInQueue
        );
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn cache_outage_surfaces_as_transient_error() {
        let store = MockQueueStore::new();
        let controller = AdmissionController::new(
            store.clone(),
            ManualClock::starting_at(test_clock().now()),
            QueueSettings::default(),
        );
        store.set_unavailable(true);

        let err = controller.join("evt", "u1", "s").await.unwrap_err();
        assert!(err.kind().is_transient());
    }

    #[test]
    fn expiry_follows_token_ttl() {
        let now = test_clock().now();
        let config = QueueConfig::for_event("evt").with_token_ttl(Duration::from_secs(90));
        assert_eq!(ticket_expiry(&config, now) - now, chrono::Duration::seconds(90));
    }
}
