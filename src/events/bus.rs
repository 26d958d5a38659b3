use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::envelope::{EventContext, EventEnvelope};
use super::handler::{ErasedHandler, EventHandler, Registered};
use super::retry::RetryPolicy;
use crate::context::{Collaborators, RequestContext};
use crate::core::{Result, ServiceError};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1000;

/// Where handlers run relative to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Awaited by the publisher, once the envelope has been accepted. The
    /// delivery runs on its own task so an abandoned publisher cannot cut it
    /// short.
    Inline,
    /// On worker tasks fed by a bounded queue; a full queue blocks publishers.
    Queued { capacity: usize, workers: usize },
}

impl Default for DeliveryMode {
    fn default() -> Self {
        Self::Queued {
            capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub delivery: DeliveryMode,
    pub retry: RetryPolicy,
    /// Dead letters kept for inspection; the oldest is evicted first.
    pub dead_letter_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::default(),
            retry: RetryPolicy::default(),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }
}

impl EventBusConfig {
    pub fn inline() -> Self {
        Self {
            delivery: DeliveryMode::Inline,
            ..Self::default()
        }
    }

    pub fn queued(capacity: usize, workers: usize) -> Self {
        Self {
            delivery: DeliveryMode::Queued { capacity, workers },
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity;
        self
    }
}

/// An envelope the bus gave up on.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: EventEnvelope,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Inline deliveries still running, so shutdown can wait for them.
#[derive(Default)]
struct InFlight {
    running: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.running.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.running.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Runs envelopes through their handler, retrying transient failures.
struct Dispatcher {
    handlers: HashMap<&'static str, Arc<dyn ErasedHandler>>,
    retry: RetryPolicy,
    collaborators: Option<Arc<Collaborators>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    dead_letter_capacity: usize,
    counters: BusCounters,
}

impl Dispatcher {
    fn handler_context(&self, envelope: &EventEnvelope) -> RequestContext {
        let ctx = RequestContext::background().with_optional_claims(envelope.claims.clone());
        match &self.collaborators {
            Some(collaborators) => ctx.with_collaborators(Arc::clone(collaborators)),
            None => ctx,
        }
    }

    async fn deliver(&self, mut envelope: EventEnvelope) {
        let Some(handler) = self.handlers.get(envelope.name.as_str()).cloned() else {
            let err = ServiceError::EventPublish(format!(
                "no handler registered for event '{}'",
                envelope.name
            ));
            self.dead_letter(envelope, &err).await;
            return;
        };

        let request = self.handler_context(&envelope);
        loop {
            envelope.attempt += 1;
            let ctx = EventContext::new(&envelope, request.clone());

            match handler.handle(&ctx, &envelope.payload).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        event = %envelope.name,
                        envelope_id = %envelope.id,
                        attempt = envelope.attempt,
                        "event delivered"
                    );
                    return;
                }
                Err(err) if err.is_retryable() && self.retry.can_retry(envelope.attempt) => {
                    let delay = self.retry.delay_for(envelope.attempt);
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event = %envelope.name,
                        envelope_id = %envelope.id,
                        attempt = envelope.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "event handler failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.dead_letter(envelope, &err).await;
                    return;
                }
            }
        }
    }

    async fn dead_letter(&self, envelope: EventEnvelope, err: &ServiceError) {
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        error!(
            event = %envelope.name,
            envelope_id = %envelope.id,
            attempt = envelope.attempt,
            error = %err,
            "event dead-lettered"
        );
        let mut dead_letters = self.dead_letters.lock().await;
        if self.dead_letter_capacity == 0 {
            return;
        }
        if dead_letters.len() == self.dead_letter_capacity {
            dead_letters.pop_front();
        }
        dead_letters.push_back(DeadLetter {
            envelope,
            error: err.to_string(),
            failed_at: Utc::now(),
        });
    }
}

struct Queue {
    sender: RwLock<Option<mpsc::Sender<EventEnvelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Process-wide mapping from event names to handlers.
///
/// Publishing returns once the envelope is accepted; handler failures are
/// retried and dead-lettered here and never reach the publisher.
pub struct EventBus {
    dispatcher: Arc<Dispatcher>,
    queue: Option<Queue>,
    inline: Arc<InFlight>,
    closed: AtomicBool,
}

impl EventBus {
    pub fn builder(config: EventBusConfig) -> EventBusBuilder {
        EventBusBuilder::new(config)
    }

    /// Accepts `payload` for delivery to the handler registered as `name`.
    ///
    /// Fails with `Cancelled` when `ctx` is cancelled before the envelope is
    /// accepted, and with `EventPublish` when there is no handler for `name`
    /// or the bus is closed.
    pub async fn publish<P>(&self, ctx: &RequestContext, name: &str, payload: &P) -> Result<Uuid>
    where
        P: Serialize + ?Sized,
    {
        if ctx.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        if self.is_closed() {
            return Err(ServiceError::EventPublish("event bus is closed".to_string()));
        }
        if !self.dispatcher.handlers.contains_key(name) {
            return Err(ServiceError::EventPublish(format!(
                "no handler registered for event '{name}'"
            )));
        }

        let payload = serde_json::to_value(payload).map_err(|err| {
            ServiceError::EventPublish(format!("payload for '{name}' could not be encoded: {err}"))
        })?;
        let envelope = EventEnvelope::new(name, payload).with_claims(ctx.claims().cloned());
        let envelope_id = envelope.id;

        match &self.queue {
            None => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let guard = self.inline.enter();
                dispatcher.counters.published.fetch_add(1, Ordering::Relaxed);
                let delivery = tokio::spawn(async move {
                    let _guard = guard;
                    dispatcher.deliver(envelope).await;
                });
                if let Err(err) = delivery.await {
                    error!(
                        event = name,
                        envelope_id = %envelope_id,
                        error = %err,
                        "inline delivery terminated abnormally"
                    );
                }
            }
            Some(queue) => {
                let sender = queue.sender.read().await.clone().ok_or_else(|| {
                    ServiceError::EventPublish("event bus is closed".to_string())
                })?;

                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(ServiceError::Cancelled),
                    sent = sender.send(envelope) => {
                        sent.map_err(|_| ServiceError::EventPublish("event bus is closed".to_string()))?;
                    }
                }
                self.dispatcher.counters.published.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(event = name, envelope_id = %envelope_id, "event published");
        Ok(envelope_id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Names of the registered events with their payload types.
    pub fn registrations(&self) -> Vec<(&'static str, &'static str)> {
        let mut registrations: Vec<_> = self
            .dispatcher
            .handlers
            .iter()
            .map(|(name, handler)| (*name, handler.payload_type()))
            .collect();
        registrations.sort();
        registrations
    }

    pub fn stats(&self) -> BusStats {
        let counters = &self.dispatcher.counters;
        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// The most recent dead letters, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dispatcher
            .dead_letters
            .lock()
            .await
            .iter()
            .cloned()
            .collect()
    }

    /// Removes and returns the retained dead letters, oldest first.
    pub async fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        self.dispatcher.dead_letters.lock().await.drain(..).collect()
    }

    /// Stops accepting envelopes, lets pending deliveries finish and waits
    /// for them.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let Some(queue) = &self.queue else {
            self.inline.wait_idle().await;
            return;
        };

        queue.sender.write().await.take();
        let workers = std::mem::take(&mut *queue.workers.lock().await);
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "event worker terminated abnormally");
            }
        }
    }
}

pub struct EventBusBuilder {
    config: EventBusConfig,
    handlers: Vec<(&'static str, Arc<dyn ErasedHandler>)>,
    collaborators: Option<Arc<Collaborators>>,
}

impl EventBusBuilder {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            collaborators: None,
        }
    }

    pub fn register<H: EventHandler>(mut self, handler: H) -> Self {
        self.handlers
            .push((handler.name(), Arc::new(Registered(handler))));
        self
    }

    /// Collaborator handles made available to handler contexts.
    pub fn with_collaborators(mut self, collaborators: Arc<Collaborators>) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Queued delivery spawns its workers here, so it needs a Tokio runtime.
    pub fn build(self) -> Result<EventBus> {
        if self.config.retry.max_attempts == 0 {
            return Err(ServiceError::Initialization(
                "event retry policy must allow at least one attempt".to_string(),
            ));
        }

        let mut handlers = HashMap::with_capacity(self.handlers.len());
        for (name, handler) in self.handlers {
            if handlers.insert(name, handler).is_some() {
                return Err(ServiceError::Initialization(format!(
                    "more than one handler registered for event '{name}'"
                )));
            }
        }

        let dispatcher = Arc::new(Dispatcher {
            handlers,
            retry: self.config.retry,
            collaborators: self.collaborators,
            dead_letters: Mutex::new(VecDeque::new()),
            dead_letter_capacity: self.config.dead_letter_capacity,
            counters: BusCounters::default(),
        });

        let queue = match self.config.delivery {
            DeliveryMode::Inline => None,
            DeliveryMode::Queued { capacity, workers } => {
                Some(spawn_workers(&dispatcher, capacity, workers)?)
            }
        };

        Ok(EventBus {
            dispatcher,
            queue,
            inline: Arc::new(InFlight::default()),
            closed: AtomicBool::new(false),
        })
    }
}

fn spawn_workers(dispatcher: &Arc<Dispatcher>, capacity: usize, workers: usize) -> Result<Queue> {
    if capacity == 0 || workers == 0 {
        return Err(ServiceError::Initialization(
            "queued delivery needs a non-zero capacity and worker count".to_string(),
        ));
    }
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
        ServiceError::Initialization("queued delivery needs a Tokio runtime".to_string())
    })?;

    let (sender, receiver) = mpsc::channel::<EventEnvelope>(capacity);
    let receiver = Arc::new(Mutex::new(receiver));

    let handles = (0..workers)
        .map(|worker| {
            let receiver = Arc::clone(&receiver);
            let dispatcher = Arc::clone(dispatcher);
            runtime.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(envelope) = next else {
                        break;
                    };
                    dispatcher.deliver(envelope).await;
                }
                debug!(worker, "event worker stopped");
            })
        })
        .collect();

    Ok(Queue {
        sender: RwLock::new(Some(sender)),
        workers: Mutex::new(handles),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        value: u32,
    }

    struct Counter {
        seen: Arc<AtomicU32>,
    }

    #[async_trait]
    impl EventHandler for Counter {
        type Payload = Ping;

        fn name(&self) -> &'static str {
            "ping"
        }

        async fn validate(&self, _ctx: &EventContext, _payload: &Ping) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _ctx: &EventContext, payload: Ping) -> Result<()> {
            self.seen.fetch_add(payload.value, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counter() -> (Counter, Arc<AtomicU32>) {
        let seen = Arc::new(AtomicU32::new(0));
        (
            Counter {
                seen: Arc::clone(&seen),
            },
            seen,
        )
    }

    #[tokio::test]
    async fn inline_delivery_runs_before_publish_returns() {
        let (handler, seen) = counter();
        let bus = EventBus::builder(EventBusConfig::inline())
            .register(handler)
            .build()
            .unwrap();

        bus.publish(&RequestContext::background(), "ping", &Ping { value: 3 })
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(bus.stats().published, 1);
        assert_eq!(bus.stats().delivered, 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (first, _) = counter();
        let (second, _) = counter();
        let result = EventBus::builder(EventBusConfig::inline())
            .register(first)
            .register(second)
            .build();

        assert!(matches!(result, Err(ServiceError::Initialization(_))));
    }

    #[tokio::test]
    async fn registrations_report_payload_types() {
        let (handler, _) = counter();
        let bus = EventBus::builder(EventBusConfig::inline())
            .register(handler)
            .build()
            .unwrap();

        let registrations = bus.registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].0, "ping");
        assert!(registrations[0].1.ends_with("Ping"));
    }

    #[test]
    fn queued_delivery_outside_runtime_fails_fast() {
        let (handler, _) = counter();
        let result = EventBus::builder(EventBusConfig::queued(4, 1))
            .register(handler)
            .build();

        assert!(matches!(result, Err(ServiceError::Initialization(_))));
    }

    #[tokio::test]
    async fn shutdown_drains_queued_envelopes() {
        let (handler, seen) = counter();
        let bus = EventBus::builder(EventBusConfig::queued(64, 2))
            .register(handler)
            .build()
            .unwrap();

        for _ in 0..50 {
            bus.publish(&RequestContext::background(), "ping", &Ping { value: 1 })
                .await
                .unwrap();
        }
        bus.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 50);
        assert!(bus.is_closed());
        let err = bus
            .publish(&RequestContext::background(), "ping", &Ping { value: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EventPublish(_)));
    }

    #[tokio::test]
    async fn dead_letters_are_bounded_oldest_first() {
        let (handler, _) = counter();
        let bus = EventBus::builder(EventBusConfig::inline().with_dead_letter_capacity(3))
            .register(handler)
            .build()
            .unwrap();

        for n in 0..5 {
            bus.publish(&RequestContext::background(), "ping", &serde_json::json!({ "n": n }))
                .await
                .unwrap();
        }

        let kept: Vec<_> = bus
            .dead_letters()
            .await
            .iter()
            .map(|dead| dead.envelope.payload["n"].clone())
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert_eq!(bus.stats().dead_lettered, 5);

        assert_eq!(bus.drain_dead_letters().await.len(), 3);
        assert!(bus.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn zero_dead_letter_capacity_keeps_nothing() {
        let (handler, _) = counter();
        let bus = EventBus::builder(EventBusConfig::inline().with_dead_letter_capacity(0))
            .register(handler)
            .build()
            .unwrap();

        bus.publish(&RequestContext::background(), "ping", &serde_json::json!({}))
            .await
            .unwrap();

        assert!(bus.dead_letters().await.is_empty());
        assert_eq!(bus.stats().dead_lettered, 1);
    }
}
