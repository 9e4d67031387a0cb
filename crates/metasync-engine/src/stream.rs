//! Fan-out broadcaster between one producer and many batched subscribers.
//!
//! A [`Stream`] owns an ordered middleware chain and a set of
//! subscriptions. The producer calls [`Stream::push`]; every record runs
//! through the middleware chain once, then a clone lands on each
//! subscriber's single-slot queue. [`Stream::broadcast`] runs one worker
//! per subscriber that accumulates records into a [`Batch`] and delivers
//! full batches, plus one final partial batch once the stream closes.
//!
//! The first error, from middleware or a subscriber, becomes the stream's
//! terminal error and closes it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use metasync_types::{Emit, Record};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::batch::Batch;
use crate::errors::StreamError;

/// Per-record transformation applied before fan-out.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, record: Record) -> Result<Record>;
}

/// Destination fed by a stream worker.
#[async_trait]
pub trait Subscriber: Send {
    /// Deliver a non-empty batch, in push order.
    async fn deliver(&mut self, batch: Vec<Record>) -> Result<()>;

    /// Called once after the last delivery.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Names the subscriber in errors raised on its behalf.
    fn label(&self) -> String {
        "subscriber".to_string()
    }
}

/// Middleware built from a synchronous closure.
pub struct FnMiddleware<F>(F);

/// Wrap a closure as [`Middleware`].
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(Record) -> Result<Record> + Send + Sync,
{
    FnMiddleware(f)
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Record) -> Result<Record> + Send + Sync,
{
    async fn handle(&self, record: Record) -> Result<Record> {
        (self.0)(record)
    }
}

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Accepting records.
    Open,
    /// Closed to new records; workers are flushing.
    Closing,
    /// Every worker has exited.
    Closed,
}

struct Subscription {
    subscriber: Box<dyn Subscriber>,
    batch: Batch,
    queue: mpsc::Receiver<Record>,
}

#[derive(Default)]
struct StreamState {
    closed: bool,
    drained: bool,
    error: Option<anyhow::Error>,
    queues: Vec<mpsc::Sender<Record>>,
}

struct Shared {
    state: Mutex<StreamState>,
    closed_tx: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        // Dropping the senders ends every worker's queue once in-flight
        // pushes release their clones.
        state.queues.clear();
        drop(state);
        self.closed_tx.send_replace(true);
    }

    fn close_with_error(&self, err: anyhow::Error) {
        {
            let mut state = self.state();
            if state.error.is_none() {
                state.error = Some(err);
            } else {
                tracing::debug!(error = %format!("{err:#}"), "Dropping secondary stream error");
            }
        }
        self.close();
    }
}

/// One run's record broadcaster.
pub struct Stream {
    middlewares: Vec<Box<dyn Middleware>>,
    pending: Mutex<Vec<Subscription>>,
    shared: Arc<Shared>,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    #[must_use]
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            middlewares: Vec::new(),
            pending: Mutex::new(Vec::new()),
            shared: Arc::new(Shared {
                state: Mutex::new(StreamState::default()),
                closed_tx,
            }),
        }
    }

    /// Register a destination. `batch_size` of `0` delivers everything in
    /// one batch when the stream ends.
    ///
    /// On a closed stream the queue starts out ended: the subscriber is
    /// only closed once `broadcast` runs.
    pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber>, batch_size: usize) {
        let (tx, rx) = mpsc::channel(1);
        {
            let mut state = self.shared.state();
            if !state.closed {
                state.queues.push(tx);
            }
        }
        self.pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                subscriber,
                batch: Batch::new(batch_size),
                queue: rx,
            });
    }

    /// Append a middleware; the chain runs in registration order.
    pub fn use_middleware(&mut self, middleware: Box<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Run `record` through the middleware chain and hand it to every
    /// subscriber, waiting on each subscriber's queue in turn.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream is closed, or if a
    /// middleware fails (its error becomes the terminal error).
    pub async fn push(&self, record: Record) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        let mut record = record;
        for middleware in &self.middlewares {
            match middleware.handle(record).await {
                Ok(next) => record = next,
                Err(err) => {
                    self.shared.close_with_error(err);
                    return Err(StreamError::Closed);
                }
            }
        }

        let queues = {
            let state = self.shared.state();
            if state.closed {
                return Err(StreamError::Closed);
            }
            state.queues.clone()
        };
        for queue in queues {
            if queue.send(record.clone()).await.is_err() {
                return Err(StreamError::Closed);
            }
        }
        Ok(())
    }

    /// Drive every subscriber until the stream closes and all of them have
    /// flushed.
    ///
    /// # Errors
    ///
    /// Returns the terminal error, if any.
    pub async fn broadcast(&self) -> Result<()> {
        let subscriptions = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut workers = JoinSet::new();
        for subscription in subscriptions {
            let label = subscription.subscriber.label();
            let worker = tokio::spawn(subscription.run(Arc::clone(&self.shared)));
            workers.spawn(async move { (label, worker.await) });
        }
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((label, Err(join_err))) => {
                    self.shared.close_with_error(
                        anyhow::anyhow!("worker panicked: {join_err}")
                            .context(format!("could not run {label}")),
                    );
                }
                Err(join_err) => {
                    self.shared
                        .close_with_error(anyhow::anyhow!("subscriber worker failed: {join_err}"));
                }
            }
        }

        // With no subscribers nothing above waits for the producer.
        let mut closed_rx = self.shared.closed_tx.subscribe();
        // The sender lives in `self.shared`, so this cannot fail.
        let _ = closed_rx.wait_for(|closed| *closed).await;

        let mut state = self.shared.state();
        state.drained = true;
        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop accepting records and let workers flush. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Store `err` as the terminal error (unless one is already set) and
    /// close.
    pub fn close_with_error(&self, err: anyhow::Error) {
        self.shared.close_with_error(err);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        let state = self.shared.state();
        match (state.closed, state.drained) {
            (false, _) => StreamPhase::Open,
            (true, false) => StreamPhase::Closing,
            (true, true) => StreamPhase::Closed,
        }
    }
}

impl Subscription {
    async fn run(mut self, shared: Arc<Shared>) {
        let mut failed = false;
        while let Some(record) = self.queue.recv().await {
            // The queue holds one record and is drained after every full
            // batch, so the batch always has room here.
            if let Err(err) = self.batch.add(record) {
                shared.close_with_error(err.into());
                failed = true;
                break;
            }
            if self.batch.is_full() {
                if let Err(err) = self.subscriber.deliver(self.batch.flush()).await {
                    shared.close_with_error(err);
                    failed = true;
                    break;
                }
            }
        }

        if !failed && !self.batch.is_empty() {
            if let Err(err) = self.subscriber.deliver(self.batch.flush()).await {
                shared.close_with_error(err);
            }
        }

        if let Err(err) = self.subscriber.close().await {
            tracing::warn!(error = %format!("{err:#}"), "Failed to close subscriber");
        }
    }
}

#[async_trait]
impl Emit for Stream {
    async fn emit(&self, record: Record) -> Result<()> {
        self.push(record).await.map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    type Deliveries = Arc<Mutex<Vec<Vec<String>>>>;

    struct Collector {
        deliveries: Deliveries,
        closed: Arc<AtomicBool>,
        fail_on_call: Option<usize>,
        calls: usize,
    }

    impl Collector {
        fn new() -> (Self, Deliveries, Arc<AtomicBool>) {
            let deliveries = Deliveries::default();
            let closed = Arc::new(AtomicBool::new(false));
            let collector = Self {
                deliveries: Arc::clone(&deliveries),
                closed: Arc::clone(&closed),
                fail_on_call: None,
                calls: 0,
            };
            (collector, deliveries, closed)
        }
    }

    #[async_trait]
    impl Subscriber for Collector {
        async fn deliver(&mut self, batch: Vec<Record>) -> Result<()> {
            self.calls += 1;
            if self.fail_on_call == Some(self.calls) {
                anyhow::bail!("destination unavailable");
            }
            let urns = batch
                .iter()
                .map(|r| r.urn().unwrap_or_default().to_string())
                .collect();
            self.deliveries.lock().unwrap().push(urns);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record(urn: &str) -> Record {
        Record::new(json!({ "urn": urn }))
    }

    async fn produce(stream: Arc<Stream>, urns: &'static [&'static str]) -> Result<(), StreamError> {
        let result = async {
            for urn in urns {
                stream.push(record(urn)).await?;
            }
            Ok::<(), StreamError>(())
        }
        .await;
        stream.close();
        result
    }

    #[tokio::test]
    async fn delivers_full_batches_then_remainder() {
        let (collector, deliveries, closed) = Collector::new();
        let mut stream = Stream::new();
        stream.subscribe(Box::new(collector), 2);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b", "c", "d", "e"]));
        stream.broadcast().await.unwrap();
        producer.await.unwrap().unwrap();

        assert_eq!(
            *deliveries.lock().unwrap(),
            vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]
        );
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(stream.phase(), StreamPhase::Closed);
    }

    #[tokio::test]
    async fn zero_batch_size_delivers_once_at_end() {
        let (collector, deliveries, _) = Collector::new();
        let mut stream = Stream::new();
        stream.subscribe(Box::new(collector), 0);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b", "c"]));
        stream.broadcast().await.unwrap();
        producer.await.unwrap().unwrap();

        assert_eq!(*deliveries.lock().unwrap(), vec![vec!["a", "b", "c"]]);
    }

    #[tokio::test]
    async fn empty_stream_never_calls_subscriber() {
        let (collector, deliveries, closed) = Collector::new();
        let mut stream = Stream::new();
        stream.subscribe(Box::new(collector), 0);
        stream.close();

        stream.broadcast().await.unwrap();
        assert!(deliveries.lock().unwrap().is_empty());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_record_in_order() {
        let (first, first_deliveries, _) = Collector::new();
        let (second, second_deliveries, _) = Collector::new();
        let mut stream = Stream::new();
        stream.subscribe(Box::new(first), 1);
        stream.subscribe(Box::new(second), 3);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b", "c"]));
        stream.broadcast().await.unwrap();
        producer.await.unwrap().unwrap();

        assert_eq!(
            *first_deliveries.lock().unwrap(),
            vec![vec!["a"], vec!["b"], vec!["c"]]
        );
        assert_eq!(*second_deliveries.lock().unwrap(), vec![vec!["a", "b", "c"]]);
    }

    #[tokio::test]
    async fn middleware_runs_in_registration_order() {
        let (collector, deliveries, _) = Collector::new();
        let mut stream = Stream::new();
        stream.use_middleware(Box::new(middleware_fn(|r: Record| {
            let urn = format!("{}-first", r.urn().unwrap_or_default());
            Ok(Record::new(json!({ "urn": urn })))
        })));
        stream.use_middleware(Box::new(middleware_fn(|r: Record| {
            let urn = format!("{}-second", r.urn().unwrap_or_default());
            Ok(Record::new(json!({ "urn": urn })))
        })));
        stream.subscribe(Box::new(collector), 0);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a"]));
        stream.broadcast().await.unwrap();
        producer.await.unwrap().unwrap();

        assert_eq!(*deliveries.lock().unwrap(), vec![vec!["a-first-second"]]);
    }

    #[tokio::test]
    async fn middleware_error_closes_stream_and_is_returned() {
        let (collector, deliveries, _) = Collector::new();
        let mut stream = Stream::new();
        stream.use_middleware(Box::new(middleware_fn(|r: Record| {
            if r.urn() == Some("b") {
                anyhow::bail!("cannot transform b");
            }
            Ok(r)
        })));
        stream.subscribe(Box::new(collector), 1);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b", "c"]));
        let err = stream.broadcast().await.unwrap_err();
        assert_eq!(err.to_string(), "cannot transform b");
        assert_eq!(producer.await.unwrap(), Err(StreamError::Closed));
        assert_eq!(*deliveries.lock().unwrap(), vec![vec!["a"]]);
    }

    #[tokio::test]
    async fn subscriber_error_becomes_terminal_error() {
        let (mut collector, _, closed) = Collector::new();
        collector.fail_on_call = Some(1);
        let mut stream = Stream::new();
        stream.subscribe(Box::new(collector), 1);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b", "c"]));
        let err = stream.broadcast().await.unwrap_err();
        assert_eq!(err.to_string(), "destination unavailable");
        assert_eq!(producer.await.unwrap(), Err(StreamError::Closed));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn push_after_close_is_rejected() {
        let stream = Stream::new();
        stream.close();
        assert_eq!(stream.push(record("a")).await, Err(StreamError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let stream = Stream::new();
        assert_eq!(stream.phase(), StreamPhase::Open);
        stream.close();
        stream.close();
        assert_eq!(stream.phase(), StreamPhase::Closing);
        stream.broadcast().await.unwrap();
        assert_eq!(stream.phase(), StreamPhase::Closed);
    }

    #[tokio::test]
    async fn first_error_wins() {
        let stream = Stream::new();
        stream.close_with_error(anyhow::anyhow!("first"));
        stream.close_with_error(anyhow::anyhow!("second"));
        assert_eq!(stream.broadcast().await.unwrap_err().to_string(), "first");
    }

    #[tokio::test]
    async fn subscribe_after_close_still_finishes_broadcast() {
        let (collector, deliveries, closed) = Collector::new();
        let mut stream = Stream::new();
        stream.close();
        stream.subscribe(Box::new(collector), 0);

        tokio::time::timeout(std::time::Duration::from_secs(3), stream.broadcast())
            .await
            .expect("broadcast finished")
            .unwrap();
        assert!(deliveries.lock().unwrap().is_empty());
        assert!(closed.load(Ordering::SeqCst));
    }

    struct Panicking;

    #[async_trait]
    impl Subscriber for Panicking {
        async fn deliver(&mut self, _batch: Vec<Record>) -> Result<()> {
            panic!("sink panic");
        }

        fn label(&self) -> String {
            "sink \"broken\"".to_string()
        }
    }

    #[tokio::test]
    async fn panicking_subscriber_is_named_in_terminal_error() {
        let mut stream = Stream::new();
        stream.subscribe(Box::new(Panicking), 1);
        let stream = Arc::new(stream);

        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b"]));
        let err = stream.broadcast().await.unwrap_err();
        assert_eq!(err.to_string(), "could not run sink \"broken\"");
        assert!(format!("{err:#}").contains("sink panic"));
        let _ = producer.await.unwrap();
    }

    #[tokio::test]
    async fn overfull_batch_closes_stream_with_error() {
        let (collector, deliveries, closed) = Collector::new();
        let stream = Stream::new();
        let mut batch = Batch::new(1);
        batch.add(record("a")).unwrap();
        let (tx, rx) = mpsc::channel(1);
        tx.send(record("b")).await.unwrap();
        drop(tx);

        let subscription = Subscription {
            subscriber: Box::new(collector),
            batch,
            queue: rx,
        };
        subscription.run(Arc::clone(&stream.shared)).await;

        assert!(stream.is_closed());
        let err = stream.broadcast().await.unwrap_err();
        assert!(err.is::<crate::errors::BatchFullError>());
        assert!(deliveries.lock().unwrap().is_empty());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_waits_for_close() {
        let stream = Arc::new(Stream::new());
        let producer = tokio::spawn(produce(Arc::clone(&stream), &["a", "b"]));
        stream.broadcast().await.unwrap();
        assert!(stream.is_closed());
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn emit_maps_closed_stream_to_error() {
        let stream = Stream::new();
        stream.close();
        let err = stream.emit(record("a")).await.unwrap_err();
        assert_eq!(err.to_string(), "stream is closed");
    }
}
