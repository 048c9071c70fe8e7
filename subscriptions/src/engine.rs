//! The catch-up subscription engine.
//!
//! A subscription reads the global log from its checkpoint, replays history
//! until it catches up, then keeps tailing new commits. Events are fanned out
//! to lanes by a hash of their stream id, so independent streams process in
//! parallel while each stream stays strictly ordered. The checkpoint only
//! ever advances to the safe lower bound computed across all lanes.

use crate::lane::Lane;
use crate::progress::ProgressTracker;
use roomline_core::checkpoint::{CheckpointError, CheckpointStore};
use roomline_core::event::RecordedEvent;
use roomline_core::event_store::EventStore;
use roomline_core::handler::{DeadLetterSink, EventHandler};
use roomline_core::stream::{GlobalPosition, StreamId};
use roomline_runtime::retry::RetryPolicy;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

/// Failure starting a subscription.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    /// The checkpoint could not be loaded, so the resume position is unknown.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The subscription was configured without any handlers.
    #[error("subscription '{0}' has no handlers registered")]
    NoHandlers(String),
}

/// Builder for a [`Subscription`].
///
/// Handlers are registered as an explicit ordered list; the engine invokes
/// them in registration order for every event.
pub struct SubscriptionBuilder {
    id: String,
    store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    handlers: Vec<Arc<dyn EventHandler>>,
    partition_count: usize,
    batch_size: usize,
    poll_interval: Duration,
    checkpoint_interval: Duration,
    retry_policy: RetryPolicy,
    max_handler_attempts: u32,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
}

impl SubscriptionBuilder {
    /// Register a handler. Order of registration is order of invocation.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Number of concurrent lanes (minimum 1). Events for one stream always
    /// land on the same lane.
    #[must_use]
    pub fn partition_count(mut self, count: usize) -> Self {
        self.partition_count = count.max(1);
        self
    }

    /// Maximum events fetched per log read.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// How long to wait when caught up before polling the log again.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How often progress is persisted while the subscription runs.
    #[must_use]
    pub const fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Backoff policy for handler retries and log-read failures.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Transient-failure attempts per handler before the dead-letter sink is
    /// consulted (minimum 1).
    #[must_use]
    pub fn max_handler_attempts(mut self, attempts: u32) -> Self {
        self.max_handler_attempts = attempts.max(1);
        self
    }

    /// Park unresolvable events here instead of blocking their lane forever.
    #[must_use]
    pub fn dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Load the checkpoint and start the subscription tasks.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NoHandlers`] for an empty handler list
    /// and [`SubscriptionError::Checkpoint`] when the resume position cannot
    /// be loaded.
    pub async fn start(self) -> Result<SubscriptionHandle, SubscriptionError> {
        if self.handlers.is_empty() {
            return Err(SubscriptionError::NoHandlers(self.id));
        }
        let resume = self.checkpoints.load(&self.id).await?;
        tracing::info!(
            subscription_id = %self.id,
            resume = resume.map_or_else(|| "start-of-log".to_string(), |p| p.to_string()),
            lanes = self.partition_count,
            handlers = self.handlers.len(),
            "subscription starting"
        );

        let subscription_id: Arc<str> = self.id.clone().into();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let progress = Arc::new(Mutex::new(ProgressTracker::new()));
        let handlers = Arc::new(self.handlers);

        let mut lane_senders = Vec::with_capacity(self.partition_count);
        let mut lane_tasks = Vec::with_capacity(self.partition_count);
        for index in 0..self.partition_count {
            let (tx, rx) = mpsc::channel(self.batch_size);
            let lane = Lane {
                subscription_id: Arc::clone(&subscription_id),
                index,
                handlers: Arc::clone(&handlers),
                progress: Arc::clone(&progress),
                retry_policy: self.retry_policy.clone(),
                max_attempts: self.max_handler_attempts,
                dead_letter: self.dead_letter.clone(),
                shutdown: shutdown_rx.clone(),
            };
            lane_tasks.push(lane.spawn(rx));
            lane_senders.push(tx);
        }

        let engine = Engine {
            id: self.id,
            store: self.store,
            checkpoints: self.checkpoints,
            lane_senders,
            lane_tasks,
            progress,
            resume,
            batch_size: self.batch_size,
            poll_interval: self.poll_interval,
            checkpoint_interval: self.checkpoint_interval,
            retry_policy: self.retry_policy,
            shutdown: shutdown_rx,
        };
        let join = tokio::spawn(engine.run());
        Ok(SubscriptionHandle {
            shutdown: shutdown_tx,
            join,
        })
    }
}

/// A running subscription.
///
/// Dropping the handle does not stop the subscription; call
/// [`SubscriptionHandle::shutdown`] for a graceful drain.
pub struct SubscriptionHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop pulling new events, let in-flight work finish, persist the final
    /// checkpoint and release the subscription's resources.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

/// Entry point: a named subscription over `store`, checkpointed in
/// `checkpoints`.
#[must_use]
pub fn subscription(
    id: impl Into<String>,
    store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
) -> SubscriptionBuilder {
    SubscriptionBuilder {
        id: id.into(),
        store,
        checkpoints,
        handlers: Vec::new(),
        partition_count: 1,
        batch_size: 100,
        poll_interval: Duration::from_millis(100),
        checkpoint_interval: Duration::from_secs(1),
        retry_policy: RetryPolicy::default(),
        max_handler_attempts: 5,
        dead_letter: None,
    }
}

struct Engine {
    id: String,
    store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    lane_senders: Vec<mpsc::Sender<RecordedEvent>>,
    lane_tasks: Vec<JoinHandle<()>>,
    progress: Arc<Mutex<ProgressTracker>>,
    resume: Option<GlobalPosition>,
    batch_size: usize,
    poll_interval: Duration,
    checkpoint_interval: Duration,
    retry_policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Engine {
    async fn run(mut self) {
        let mut position = self.resume;
        let mut last_saved = self.resume;
        let mut last_save_at = Instant::now();
        let mut read_failures: usize = 0;

        loop {
            let batch = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                result = self.store.read_all(position, self.batch_size) => result,
            };

            match batch {
                Err(error) => {
                    // The checkpoint must not move while the log is unreadable.
                    let delay = self.retry_policy.delay_for_attempt(read_failures);
                    read_failures += 1;
                    tracing::warn!(
                        subscription_id = %self.id,
                        error = %error,
                        delay_ms = delay.as_millis(),
                        "global log read failed, backing off"
                    );
                    if self.wait(delay).await.is_err() {
                        break;
                    }
                }
                Ok(events) if events.is_empty() => {
                    read_failures = 0;
                    self.save_progress(&mut last_saved).await;
                    last_save_at = Instant::now();
                    if self.wait(self.poll_interval).await.is_err() {
                        break;
                    }
                }
                Ok(events) => {
                    read_failures = 0;
                    for event in events {
                        position = Some(event.global_position);
                        if self.dispatch(event).await.is_err() {
                            tracing::error!(
                                subscription_id = %self.id,
                                "lane channel closed unexpectedly, stopping"
                            );
                            self.finish(&mut last_saved).await;
                            return;
                        }
                    }
                    if last_save_at.elapsed() >= self.checkpoint_interval {
                        self.save_progress(&mut last_saved).await;
                        last_save_at = Instant::now();
                    }
                }
            }
        }

        self.finish(&mut last_saved).await;
    }

    /// Hand one event to the lane that owns its stream.
    async fn dispatch(&self, event: RecordedEvent) -> Result<(), ()> {
        self.progress.lock().await.dispatched(event.global_position);
        let lane = lane_for(&event.stream_id, self.lane_senders.len());
        self.lane_senders[lane].send(event).await.map_err(|_| ())
    }

    /// Sleep, waking early on shutdown.
    async fn wait(&mut self, delay: Duration) -> Result<(), ()> {
        tokio::select! {
            biased;
            _ = self.shutdown.changed() => Err(()),
            () = sleep(delay) => Ok(()),
        }
    }

    /// Persist the safe lower bound if it moved. A failed save is logged and
    /// retried on the next cycle; progress is never advanced past a failure.
    async fn save_progress(&self, last_saved: &mut Option<GlobalPosition>) {
        let safe = self.progress.lock().await.safe_position();
        let Some(safe) = safe else { return };
        if last_saved.is_some_and(|saved| safe <= saved) {
            return;
        }
        match self.checkpoints.save(&self.id, safe).await {
            Ok(()) => {
                tracing::debug!(
                    subscription_id = %self.id,
                    position = %safe,
                    "checkpoint saved"
                );
                *last_saved = Some(safe);
            }
            Err(error) => {
                tracing::warn!(
                    subscription_id = %self.id,
                    position = %safe,
                    error = %error,
                    "checkpoint save failed, will retry"
                );
            }
        }
    }

    /// Drain the lanes, then persist the checkpoint for the drained state.
    async fn finish(mut self, last_saved: &mut Option<GlobalPosition>) {
        self.lane_senders.clear();
        for task in self.lane_tasks.drain(..) {
            let _ = task.await;
        }
        self.save_progress(last_saved).await;
        tracing::info!(subscription_id = %self.id, "subscription stopped");
    }
}

fn lane_for(stream_id: &StreamId, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    stream_id.as_str().hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}
