// EventLoopBridge - Coordinates between the tokio runtime and the front-end loop
//
// Background workers (blocking jobs, async update tasks) never touch front-end
// state. They post AppEvents into one unbounded channel; the front end drains
// it once per tick and applies the events in the order they were posted.

use crate::metrics::Metrics;
use crate::models::InputSpec;
use crate::services::orchestrator::JobEvent;
use crate::services::resolver::{ResolveError, ResolvedInput};
use crate::services::update::UpdateEvent;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a worker can tell the front end
///
/// `Input` owns any extraction directory it carries; an event that is never
/// applied removes that directory when dropped.
#[derive(Debug)]
pub enum AppEvent {
    Job(JobEvent),
    Update(UpdateEvent),

    /// A background folder listing or zip extraction finished
    Input {
        spec: InputSpec,
        result: Result<ResolvedInput, ResolveError>,
    },
}

/// Owns the receiving end of the worker channel plus a runtime handle
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let mut bridge = EventLoopBridge::new(runtime.handle().clone(), metrics);
///
/// let handle = bridge.clone_handle();
/// handle.spawn_blocking(move |post| {
///     post(AppEvent::Job(event));
/// });
///
/// // Once per tick
/// for event in bridge.drain() {
///     controller.apply(event);
/// }
/// ```
pub struct EventLoopBridge {
    /// Handle to the tokio runtime for spawning tasks
    tokio_handle: tokio::runtime::Handle,

    /// Unbounded so a worker never blocks on a slow front end
    event_tx: mpsc::UnboundedSender<AppEvent>,
    event_rx: mpsc::UnboundedReceiver<AppEvent>,

    metrics: Arc<Metrics>,
}

impl EventLoopBridge {
    /// Create a new EventLoopBridge
    ///
    /// # Arguments
    /// * `tokio_handle` - Handle to the tokio runtime for spawning tasks
    /// * `metrics` - Shared counters; every posted event is recorded
    pub fn new(tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            tokio_handle,
            event_tx,
            event_rx,
            metrics,
        }
    }

    /// Take every event posted so far, oldest first
    ///
    /// Never blocks. Events posted while draining are picked up on the next tick.
    pub fn drain(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        if !events.is_empty() {
            tracing::debug!("Drained {} event(s)", events.len());
        }
        events
    }

    /// Post an event from the front-end thread itself
    pub fn post(&self, event: AppEvent) {
        post_event(&self.event_tx, &self.metrics, event);
    }

    /// Lightweight cloneable handle for workers
    pub fn clone_handle(&self) -> EventLoopBridgeHandle {
        EventLoopBridgeHandle {
            tokio_handle: self.tokio_handle.clone(),
            event_tx: self.event_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Cloneable sending side of the bridge
#[derive(Clone)]
pub struct EventLoopBridgeHandle {
    tokio_handle: tokio::runtime::Handle,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    metrics: Arc<Metrics>,
}

impl EventLoopBridgeHandle {
    /// Queue an event for the next front-end tick
    pub fn post(&self, event: AppEvent) {
        post_event(&self.event_tx, &self.metrics, event);
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    /// Run blocking work on the tokio blocking pool
    ///
    /// The closure gets a `post` function that queues events for the front end.
    pub fn spawn_blocking<F>(&self, work: F)
    where
        F: FnOnce(&dyn Fn(AppEvent)) + Send + 'static,
    {
        let handle = self.clone();
        self.tokio_handle.spawn_blocking(move || {
            work(&|event| handle.post(event));
        });
    }
}

fn post_event(tx: &mpsc::UnboundedSender<AppEvent>, metrics: &Metrics, event: AppEvent) {
    match tx.send(event) {
        Ok(()) => metrics.record_event_posted(),
        Err(_) => tracing::warn!("Dropping event - front end has stopped draining"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn progress(current: usize) -> JobEvent {
        JobEvent::Progress {
            current,
            total: 3,
            message: format!("Checking {current}/3"),
        }
    }

    fn job_events(events: Vec<AppEvent>) -> Vec<JobEvent> {
        events
            .into_iter()
            .map(|event| match event {
                AppEvent::Job(event) => event,
                other => panic!("expected a job event, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_drain_preserves_order() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let metrics = Arc::new(Metrics::new());
        let mut bridge = EventLoopBridge::new(rt.handle().clone(), metrics.clone());
        let handle = bridge.clone_handle();

        for i in 1..=3 {
            handle.post(AppEvent::Job(progress(i)));
        }

        assert_eq!(
            job_events(bridge.drain()),
            vec![progress(1), progress(2), progress(3)]
        );
        assert!(bridge.drain().is_empty());
        assert_eq!(
            metrics
                .events_posted
                .load(std::sync::atomic::Ordering::Relaxed),
            3
        );

        rt.shutdown_timeout(Duration::from_secs(1));
    }

    #[test]
    fn test_spawn_blocking_posts_back() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut bridge = EventLoopBridge::new(rt.handle().clone(), Arc::new(Metrics::new()));

        bridge.clone_handle().spawn_blocking(|post| {
            post(AppEvent::Job(progress(1)));
            post(AppEvent::Job(progress(2)));
        });

        let mut events = Vec::new();
        for _ in 0..100 {
            events.extend(bridge.drain());
            if events.len() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(job_events(events), vec![progress(1), progress(2)]);
        rt.shutdown_timeout(Duration::from_secs(1));
    }

    #[test]
    fn test_spawn_async() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut bridge = EventLoopBridge::new(rt.handle().clone(), Arc::new(Metrics::new()));
        let handle = bridge.clone_handle();

        let poster = handle.clone();
        handle.spawn_async(move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            poster.post(AppEvent::Job(progress(1)));
        });

        let mut events = Vec::new();
        for _ in 0..100 {
            events.extend(bridge.drain());
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(job_events(events), vec![progress(1)]);

        rt.shutdown_timeout(Duration::from_secs(1));
    }
}
