//! Deduplication of concurrent work by key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Inflight<T, E> {
    future: SharedResult<T, E>,
    abort: AbortHandle,
    id: u64,
}

/// Runs at most one operation per key at a time.
///
/// Callers arriving while an operation for their key is in flight await the
/// same result instead of starting their own. The operation runs on its own
/// task, so it completes even if every caller stops waiting. Once it finishes
/// the key is released and the next call starts fresh.
pub struct Coalescer<K, T, E> {
    inflight: Arc<Mutex<HashMap<K, Inflight<T, E>>>>,
    next_id: AtomicU64,
}

impl<K, T, E> Default for Coalescer<K, T, E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, T, E> Coalescer<K, T, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the operation for `key`, or start it with `start`.
    ///
    /// If the operation is cancelled every waiter receives `cancelled`.
    /// Must be called within a tokio runtime.
    pub async fn run<F, Fut>(&self, key: K, cancelled: E, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let future = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(existing) => {
                    debug!("joining in-flight operation");
                    existing.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let (abort, registration) = AbortHandle::new_pair();
                    let work = Abortable::new(start(), registration);

                    let map = Arc::clone(&self.inflight);
                    let task_key = key.clone();
                    let task = tokio::spawn(async move {
                        let result = work.await;
                        let mut inflight = map.lock();
                        if inflight.get(&task_key).is_some_and(|entry| entry.id == id) {
                            inflight.remove(&task_key);
                        }
                        result
                    });

                    let future = async move {
                        match task.await {
                            Ok(Ok(result)) => result,
                            Ok(Err(_aborted)) => Err(cancelled),
                            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                            Err(_) => Err(cancelled),
                        }
                    }
                    .boxed()
                    .shared();

                    inflight.insert(
                        key,
                        Inflight {
                            future: future.clone(),
                            abort,
                            id,
                        },
                    );
                    future
                }
            }
        };
        future.await
    }

    /// Abort the operation for `key`. Its waiters receive the cancellation
    /// error and the key is released immediately.
    pub fn cancel(&self, key: &K) -> bool {
        match self.inflight.lock().remove(key) {
            Some(entry) => {
                entry.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every operation whose key satisfies `matches`.
    pub fn cancel_matching(&self, mut matches: impl FnMut(&K) -> bool) -> usize {
        let mut inflight = self.inflight.lock();
        let keys: Vec<K> = inflight.keys().filter(|&key| matches(key)).cloned().collect();
        for key in &keys {
            if let Some(entry) = inflight.remove(key) {
                entry.abort.abort();
            }
        }
        keys.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let coalescer: Arc<Coalescer<&str, u32, String>> = Arc::new(Coalescer::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let runs = runs.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .run("k", "cancelled".into(), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(7)
                    })
                    .await
            }));
        }

        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_and_not_sticky() {
        let coalescer: Coalescer<u8, u8, String> = Coalescer::new();
        let first = coalescer.run(1, "cancelled".into(), || async { Err("boom".to_string()) });
        assert_eq!(first.await, Err("boom".to_string()));
        let second = coalescer.run(1, "cancelled".into(), || async { Ok(2) });
        assert_eq!(second.await, Ok(2));
    }

    #[tokio::test]
    async fn cancel_releases_waiters_and_key() {
        let coalescer: Arc<Coalescer<u8, u8, String>> = Arc::new(Coalescer::new());

        let waiter = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                coalescer
                    .run(1, "cancelled".into(), || async {
                        std::future::pending::<()>().await;
                        Ok(0)
                    })
                    .await
            })
        };
        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(coalescer.cancel(&1));
        assert!(!coalescer.cancel(&1));
        assert_eq!(waiter.await.unwrap(), Err("cancelled".to_string()));

        let again = coalescer.run(1, "cancelled".into(), || async { Ok(3) });
        assert_eq!(again.await, Ok(3));
    }
}
