//! Serialized task queues.
//!
//! A `TaskQueue` runs the closures handed to it one at a time, in the order
//! they were enqueued. Handlers use one queue per mutated resource (usually a
//! guild) so that edits to the same resource never interleave while unrelated
//! resources proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::debug;

use crate::common::error::QueueError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    running: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    delay: Duration,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO runner with at most one task in flight.
///
/// Cloning yields another handle to the same queue. When the pending list is
/// empty the queue owns no task and no timer; the next `enqueue` spawns a
/// fresh runner.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Queue that waits `delay` after each task before starting the next one.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                delay,
            }),
        }
    }

    /// Append `task` to the queue and return a handle that settles with its output.
    ///
    /// The task is recorded immediately, so enqueue order is call order even if
    /// the returned handle is awaited later or never. Must be called from within
    /// a tokio runtime.
    pub fn enqueue<F, Fut, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let outcome = match std::panic::catch_unwind(AssertUnwindSafe(task)) {
                    Ok(fut) => AssertUnwindSafe(fut)
                        .catch_unwind()
                        .await
                        .map_err(|_| QueueError::Panicked),
                    Err(_) => Err(QueueError::Panicked),
                };
                // The caller may have dropped its handle.
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        let start_runner = {
            let mut state = self.inner.state();
            state.pending.push_back(job);
            !std::mem::replace(&mut state.running, true)
        };

        if start_runner {
            tokio::spawn(Self::drain(Arc::clone(&self.inner)));
        }

        TaskHandle { rx }
    }

    async fn drain(inner: Arc<QueueInner>) {
        loop {
            let job = {
                let mut state = inner.state();
                match state.pending.pop_front() {
                    Some(job) => job,
                    None => {
                        state.running = false;
                        return;
                    }
                }
            };

            job().await;

            if !inner.delay.is_zero() {
                tokio::time::sleep(inner.delay).await;
            }
        }
    }

    /// Number of tasks waiting to start.
    pub fn pending(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// True when nothing is running or waiting.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state();
        !state.running && state.pending.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("TaskQueue")
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .field("delay", &self.inner.delay)
            .finish()
    }
}

/// Settles with the output of an enqueued task.
#[must_use = "dropping the handle discards the task's output, the task still runs"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Dropped)))
    }
}

/// Lazily created queues, one per resource key.
pub struct QueueRegistry<K> {
    queues: Mutex<HashMap<K, TaskQueue>>,
    delay: Duration,
}

impl<K> QueueRegistry<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// Registry whose queues wait `delay` between tasks.
    pub fn new(delay: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            delay,
        }
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<K, TaskQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry<'a>(&self, queues: &'a mut HashMap<K, TaskQueue>, key: K) -> &'a TaskQueue {
        let delay = self.delay;
        queues.entry(key).or_insert_with_key(|key| {
            debug!("Creating task queue for {:?}", key);
            TaskQueue::with_delay(delay)
        })
    }

    /// The queue for `key`, created on first use.
    ///
    /// The returned handle keeps the queue registered until it is dropped.
    pub fn queue(&self, key: K) -> TaskQueue {
        let mut queues = self.queues();
        self.entry(&mut queues, key).clone()
    }

    /// Enqueue `task` on the queue for `key`.
    ///
    /// Lookup and push happen under the registry lock, so a concurrent `prune`
    /// cannot split the key across two queues.
    pub fn enqueue<F, Fut, T>(&self, key: K, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut queues = self.queues();
        self.entry(&mut queues, key).enqueue(task)
    }

    /// Forget idle queues that no caller holds. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut queues = self.queues();
        let before = queues.len();
        queues.retain(|_, queue| Arc::strong_count(&queue.inner) > 1 || !queue.is_idle());
        before - queues.len()
    }

    pub fn len(&self) -> usize {
        self.queues().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{sleep, Instant};
    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tasks_settle_in_enqueue_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for (label, millis) in [("a", 50u64), ("b", 5), ("c", 20), ("d", 0)] {
            let handle = queue.enqueue(move || async move {
                sleep(Duration::from_millis(millis)).await;
                label
            });
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                let label = handle.await.unwrap();
                order.lock().unwrap().push(label);
            }));
        }

        for waiter in waiters {
            waiter.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_one_task_running() {
        let queue = TaskQueue::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                queue.enqueue(move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10 - i)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated_and_timing_is_sequential() {
        let queue = TaskQueue::new();
        let settled = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        let a = queue.enqueue(|| async {
            sleep(Duration::from_millis(30)).await;
            Ok::<&str, &str>("a")
        });
        let b = queue.enqueue(|| async { Err::<&str, &str>("b failed") });
        let c = queue.enqueue(|| async {
            sleep(Duration::from_millis(10)).await;
            Ok::<&str, &str>("c")
        });

        let mut waiters = Vec::new();
        for (label, handle) in [("a", a), ("b", b), ("c", c)] {
            let settled = Arc::clone(&settled);
            waiters.push(tokio::spawn(async move {
                let outcome = handle.await.unwrap();
                settled.lock().unwrap().push((label, outcome));
            }));
        }
        for waiter in waiters {
            waiter.await.unwrap();
        }

        let settled = settled.lock().unwrap().clone();
        assert_eq!(
            settled,
            vec![("a", Ok("a")), ("b", Err("b failed")), ("c", Ok("c"))]
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(40) && elapsed < Duration::from_millis(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_does_not_stop_queue() {
        let queue = TaskQueue::new();

        let boom = queue.enqueue(|| async {
            panic!("task exploded");
        });
        let next = queue.enqueue(|| async { 7 });

        assert_eq!(boom.await, Err::<(), _>(QueueError::Panicked));
        assert_eq!(next.await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_tasks() {
        let queue = TaskQueue::with_delay(Duration::from_millis(100));
        let started = Instant::now();

        let first = queue.enqueue(move || async move { started.elapsed() });
        let second = queue.enqueue(move || async move { started.elapsed() });

        assert_eq!(first.await.unwrap(), Duration::ZERO);
        assert!(second.await.unwrap() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_goes_idle_after_draining() {
        let queue = TaskQueue::new();
        assert!(queue.is_idle());

        let handle = queue.enqueue(|| async {
            sleep(Duration::from_millis(5)).await;
        });
        assert!(!queue.is_idle());

        handle.await.unwrap();
        // Let the runner observe the empty list.
        tokio::task::yield_now().await;

        assert!(queue.is_idle());
        assert_eq!(queue.pending(), 0);

        // A drained queue restarts on the next enqueue.
        assert_eq!(queue.enqueue(|| async { "again" }).await, Ok("again"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_pending_while_earlier_task_runs() {
        let queue = TaskQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = queue.enqueue(|| async move {
            let _ = release_rx.await;
        });
        let mut waiting = tokio_test::task::spawn(queue.enqueue(|| async { 1 }));

        tokio::task::yield_now().await;
        assert_pending!(waiting.poll());
        assert_eq!(queue.pending(), 1);

        release_tx.send(()).unwrap();
        blocker.await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(assert_ready!(waiting.poll()), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys_run_concurrently() {
        let registry = QueueRegistry::new(Duration::ZERO);
        let started = Instant::now();

        let one = registry.enqueue(1u64, || async {
            sleep(Duration::from_millis(30)).await;
        });
        let two = registry.enqueue(2u64, || async {
            sleep(Duration::from_millis(30)).await;
        });
        let (one, two) = tokio::join!(one, two);
        one.unwrap();
        two.unwrap();

        assert!(started.elapsed() < Duration::from_millis(35));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_serializes_and_prunes() {
        let registry = QueueRegistry::new(Duration::ZERO);
        let started = Instant::now();

        let one = registry.enqueue("guild", || async {
            sleep(Duration::from_millis(30)).await;
        });
        let two = registry.enqueue("guild", || async {
            sleep(Duration::from_millis(30)).await;
        });
        let (one, two) = tokio::join!(one, two);
        one.unwrap();
        two.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(registry.len(), 1);

        tokio::task::yield_now().await;
        assert_eq!(registry.prune(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_keeps_queue_still_held() {
        let registry = QueueRegistry::new(Duration::ZERO);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let task = |active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| {
            move || async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(30)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        };

        let held = registry.queue(1u64);
        assert_eq!(registry.prune(), 0);
        assert_eq!(registry.len(), 1);

        let first = held.enqueue(task(Arc::clone(&active), Arc::clone(&peak)));
        let second = registry.enqueue(1u64, task(Arc::clone(&active), Arc::clone(&peak)));
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        drop(held);
        tokio::task::yield_now().await;
        assert_eq!(registry.prune(), 1);
        assert!(registry.is_empty());
    }
}
