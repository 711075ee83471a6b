//! Stale-while-revalidate fetching
//!
//! Each `fetch` call is a small state machine driven as a stream:
//!
//! ```text
//! Start --skip_cache--------------------------> Fetching --> Done
//! Start --cache hit--> (emit cached) ---------> Fetching --> Done
//! Start --cache miss--------------------------> Fetching --> Done
//! ```
//!
//! `Fetching` always emits exactly one item: the network value (after it has
//! been written back to the cache) or the network error. A cached emission,
//! when there is one, is always yielded first.
//!
//! Network fetches run on their own tasks: dropping a stream stops delivery
//! to that caller, never the fetch or its cache write.

use crate::store::CacheStore;
use futures::future::{self, join_all, BoxFuture, FutureExt, Shared};
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

pub struct FetchOrchestrator {
    store: Arc<CacheStore>,
    inflight: Option<Arc<InflightRegistry>>,
}

enum Step<F> {
    Start(F),
    Fetching(F),
    Done,
}

struct Invocation {
    store: Arc<CacheStore>,
    inflight: Option<Arc<InflightRegistry>>,
    key: String,
    skip_cache: bool,
}

impl FetchOrchestrator {
    /// With `coalesce`, concurrent calls for the same key share one network
    /// fetch and one cache write. Without it every call fetches on its own
    /// and the last write wins.
    pub fn new(store: Arc<CacheStore>, coalesce: bool) -> Self {
        Self {
            store,
            inflight: coalesce.then(|| Arc::new(InflightRegistry::default())),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Number of keys with a shared fetch currently running
    pub fn in_flight(&self) -> usize {
        self.inflight
            .as_ref()
            .map_or(0, |registry| registry.slots.lock().len())
    }

    /// Yield the cached value (if fresh and `skip_cache` is false), then the
    /// network result. Nothing runs until the stream is polled.
    pub fn fetch<T, E, F, Fut>(
        &self,
        key: impl Into<String>,
        skip_cache: bool,
        network_fetch: F,
    ) -> impl Stream<Item = Result<T, E>> + Send + 'static
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let invocation = Arc::new(Invocation {
            store: Arc::clone(&self.store),
            inflight: self.inflight.clone(),
            key: key.into(),
            skip_cache,
        });

        stream::unfold(Step::Start(network_fetch), move |step| {
            let invocation = Arc::clone(&invocation);
            async move {
                match step {
                    Step::Start(fetch) => {
                        if !invocation.skip_cache {
                            match invocation.store.load::<T>(&invocation.key).await {
                                Ok(entry) => {
                                    return Some((Ok(entry.payload), Step::Fetching(fetch)));
                                }
                                Err(e) => {
                                    debug!(key = %invocation.key, reason = %e, "Nothing cached, fetching")
                                }
                            }
                        }
                        Some((invocation.revalidate(fetch).await, Step::Done))
                    }
                    Step::Fetching(fetch) => Some((invocation.revalidate(fetch).await, Step::Done)),
                    Step::Done => None,
                }
            }
        })
    }
}

impl Invocation {
    async fn revalidate<T, E, F, Fut>(&self, fetch: F) -> Result<T, E>
    where
        T: Serialize + Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        match &self.inflight {
            Some(registry) => {
                registry
                    .join_or_start(&self.key, Arc::clone(&self.store), fetch)
                    .await
            }
            None => {
                spawn_fetch(Arc::clone(&self.store), self.key.clone(), fetch, || {}).await
            }
        }
    }
}

/// Run the network fetch and its cache write on its own task.
///
/// The fetch completes and writes back even if every caller waiting on the
/// returned future goes away; `on_done` runs on that task after the write.
fn spawn_fetch<T, E, F, Fut>(
    store: Arc<CacheStore>,
    key: String,
    fetch: F,
    on_done: impl FnOnce() + Send + 'static,
) -> BoxFuture<'static, Result<T, E>>
where
    T: Serialize + Clone + Send + Sync + 'static,
    E: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let result = fetch().await;
        write_back(&store, &key, &result);
        on_done();
        result
    });

    async move {
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Cancelled only by runtime shutdown; nothing is left to wake us
            Err(_) => future::pending().await,
        }
    }
    .boxed()
}

fn write_back<T, E>(store: &CacheStore, key: &str, result: &Result<T, E>)
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    match result {
        Ok(value) => store.save(key, value.clone(), None),
        Err(_) => debug!(key = %key, "Network fetch failed"),
    }
}

struct Slot {
    id: u64,
    fetch: Box<dyn Any + Send + Sync>,
}

/// Network fetches currently running, by cache key
#[derive(Default)]
struct InflightRegistry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<String, Slot>>,
}

impl InflightRegistry {
    fn join_or_start<T, E, F, Fut>(
        self: &Arc<Self>,
        key: &str,
        store: Arc<CacheStore>,
        fetch: F,
    ) -> SharedFetch<T, E>
    where
        T: Serialize + Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        if let Some(running) = slots
            .get(key)
            .and_then(|slot| slot.fetch.downcast_ref::<SharedFetch<T, E>>())
        {
            debug!(key = %key, "Joining in-flight fetch");
            return running.clone();
        }

        // A slot holding another payload type for this key is simply replaced;
        // its own release won't match the new id.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(self);
        let owned_key = key.to_string();
        let release_key = owned_key.clone();
        let shared = spawn_fetch(store, owned_key, fetch, move || {
            registry.release(&release_key, id);
        })
        .shared();

        slots.insert(
            key.to_string(),
            Slot {
                id,
                fetch: Box::new(shared.clone()),
            },
        );
        shared
    }

    fn release(&self, key: &str, id: u64) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| slot.id == id) {
            slots.remove(key);
        }
    }
}

/// Fan-out/fan-in over a list of ids.
///
/// Duplicate ids are fetched once (first occurrence keeps its position).
/// Resolves only after every individual fetch has finished; if any failed,
/// the first failure in id order is returned.
pub async fn fan_in<T, E, F, Fut>(
    ids: impl IntoIterator<Item = String>,
    fetch_one: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut seen = HashSet::new();
    let unique: Vec<String> = ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    join_all(unique.into_iter().map(fetch_one))
        .await
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::error::CacheError;
    use crate::guard::DiskSpaceGuard;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    async fn orchestrator(coalesce: bool) -> (TempDir, FetchOrchestrator) {
        let dir = tempdir().unwrap();
        let config = CacheConfig::default().with_cache_dir(dir.path().join("cache"));
        let guard = DiskSpaceGuard::new(config.cache_dir.clone(), 0);
        let store =
            CacheStore::open_with_guard(&config, Arc::new(ManualClock::default()), guard).await;
        (dir, FetchOrchestrator::new(Arc::new(store), coalesce))
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        result: Result<String, String>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, String>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_miss_yields_only_network_value() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let items: Vec<Result<String, String>> = orch
            .fetch("profile", false, counting_fetch(&calls, Ok("net".into())))
            .collect()
            .await;

        assert_eq!(items, vec![Ok("net".to_string())]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_value_is_written_back_with_default_ttl() {
        let (_dir, orch) = orchestrator(false).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let _: Vec<_> = orch
            .fetch("profile", false, counting_fetch(&calls, Ok("net".into())))
            .collect()
            .await;

        let entry = orch.store().load::<String>("profile").await.unwrap();
        assert_eq!(entry.payload, "net");
        assert_eq!(entry.ttl, None);
    }

    #[tokio::test]
    async fn test_hit_yields_cached_then_network() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));
        orch.store().save("profile", "cached".to_string(), None);

        let items: Vec<Result<String, String>> = orch
            .fetch("profile", false, counting_fetch(&calls, Ok("net".into())))
            .collect()
            .await;

        assert_eq!(items, vec![Ok("cached".to_string()), Ok("net".to_string())]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            orch.store().load::<String>("profile").await.unwrap().payload,
            "net"
        );
    }

    #[tokio::test]
    async fn test_cached_emission_arrives_before_network_runs() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));
        orch.store().save("k", "cached".to_string(), None);

        let mut stream = Box::pin(orch.fetch("k", false, counting_fetch(&calls, Ok("net".into()))));

        assert_eq!(stream.next().await, Some(Ok("cached".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.next().await, Some(Ok("net".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_skip_cache_never_yields_cached_value() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));
        orch.store().save("k", "cached".to_string(), None);

        let items: Vec<Result<String, String>> = orch
            .fetch("k", true, counting_fetch(&calls, Ok("net".into())))
            .collect()
            .await;

        assert_eq!(items, vec![Ok("net".to_string())]);
    }

    #[tokio::test]
    async fn test_network_error_after_hit_is_a_second_emission() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));
        orch.store().save("k", "cached".to_string(), None);

        let items: Vec<Result<String, String>> = orch
            .fetch("k", false, counting_fetch(&calls, Err("offline".into())))
            .collect()
            .await;

        assert_eq!(
            items,
            vec![Ok("cached".to_string()), Err("offline".to_string())]
        );
        // The cached value is not invalidated by the failure
        assert_eq!(
            orch.store().load::<String>("k").await.unwrap().payload,
            "cached"
        );
    }

    #[tokio::test]
    async fn test_network_error_on_miss_is_the_only_emission() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let items: Vec<Result<String, String>> = orch
            .fetch("k", false, counting_fetch(&calls, Err("boom".into())))
            .collect()
            .await;

        assert_eq!(items, vec![Err("boom".to_string())]);
        assert_eq!(
            orch.store().load::<String>("k").await,
            Err(CacheError::EmptyOrStale)
        );
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let stream = orch.fetch("k", true, counting_fetch(&calls, Ok("net".into())));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(stream);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_network_call() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let a = orch.fetch("k", true, counting_fetch(&calls, Ok("one".into())));
        let b = orch.fetch("k", true, counting_fetch(&calls, Ok("two".into())));
        let (a, b): (Vec<Result<String, String>>, Vec<Result<String, String>>) =
            tokio::join!(a.collect(), b.collect());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, vec![Ok("one".to_string())]);
        assert_eq!(b, vec![Ok("one".to_string())]);
        assert_eq!(orch.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_coalesced_callers_share_the_error() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let a = orch.fetch("k", true, counting_fetch(&calls, Err("down".into())));
        let b = orch.fetch("k", true, counting_fetch(&calls, Ok("never".into())));
        let (a, b): (Vec<Result<String, String>>, Vec<Result<String, String>>) =
            tokio::join!(a.collect(), b.collect());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, vec![Err("down".to_string())]);
        assert_eq!(b, vec![Err("down".to_string())]);
    }

    #[tokio::test]
    async fn test_sequential_fetches_are_not_coalesced() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let _: Vec<_> = orch
            .fetch("k", true, counting_fetch(&calls, Ok("one".into())))
            .collect()
            .await;
        let second: Vec<Result<String, String>> = orch
            .fetch("k", true, counting_fetch(&calls, Ok("two".into())))
            .collect()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(second, vec![Ok("two".to_string())]);
    }

    #[tokio::test]
    async fn test_without_coalescing_each_caller_fetches() {
        let (_dir, orch) = orchestrator(false).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let a = orch.fetch("k", true, counting_fetch(&calls, Ok("one".into())));
        let b = orch.fetch("k", true, counting_fetch(&calls, Ok("two".into())));
        let (a, b): (Vec<Result<String, String>>, Vec<Result<String, String>>) =
            tokio::join!(a.collect(), b.collect());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(a, vec![Ok("one".to_string())]);
        assert_eq!(b, vec![Ok("two".to_string())]);
    }

    #[tokio::test]
    async fn test_dropped_shared_fetch_still_completes_and_frees_its_key() {
        let (_dir, orch) = orchestrator(true).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let mut abandoned =
            Box::pin(orch.fetch("k", true, counting_fetch(&calls, Ok("old".into()))));
        let polled = tokio::time::timeout(Duration::from_millis(5), abandoned.next()).await;
        assert!(polled.is_err());
        drop(abandoned);

        for _ in 0..100 {
            if orch.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(orch.in_flight(), 0);
        orch.store().flush().await;
        assert_eq!(orch.store().load::<String>("k").await.unwrap().payload, "old");

        let next: Vec<Result<String, String>> = orch
            .fetch("k", true, counting_fetch(&calls, Ok("new".into())))
            .collect()
            .await;
        assert_eq!(next, vec![Ok("new".to_string())]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_uncoalesced_fetch_still_writes_back() {
        let (_dir, orch) = orchestrator(false).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let mut abandoned =
            Box::pin(orch.fetch("k", true, counting_fetch(&calls, Ok("late".into()))));
        let polled = tokio::time::timeout(Duration::from_millis(5), abandoned.next()).await;
        assert!(polled.is_err());
        drop(abandoned);

        let mut cached = Err(CacheError::EmptyOrStale);
        for _ in 0..100 {
            cached = orch.store().load::<String>("k").await;
            if cached.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cached.unwrap().payload, "late");
    }

    #[tokio::test]
    async fn test_fan_in_dedupes_and_keeps_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ids = ["3", "1", "3", "2", "1"].map(String::from);

        let result: Result<Vec<String>, String> = fan_in(ids, |id| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("nft-{id}"))
            }
        })
        .await;

        assert_eq!(
            result.unwrap(),
            vec!["nft-3".to_string(), "nft-1".to_string(), "nft-2".to_string()]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fan_in_waits_for_every_call_before_failing() {
        let finished = Arc::new(AtomicUsize::new(0));
        let ids = ["bad", "slow"].map(String::from);

        let result: Result<Vec<String>, String> = fan_in(ids, |id| {
            let finished = Arc::clone(&finished);
            async move {
                if id == "slow" {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                finished.fetch_add(1, Ordering::SeqCst);
                if id == "bad" {
                    Err(format!("failed {id}"))
                } else {
                    Ok(id)
                }
            }
        })
        .await;

        assert_eq!(result, Err("failed bad".to_string()));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fan_in_of_nothing() {
        let result: Result<Vec<u8>, String> =
            fan_in(Vec::<String>::new(), |_| async { Ok(0u8) }).await;
        assert_eq!(result, Ok(vec![]));
    }
}
