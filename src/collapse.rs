//! Request-Collapsing Loader
//!
//! At most one load runs per key at a time. Callers arriving while a load is
//! in flight await that same load and receive a clone of its result, error
//! included.
//!
//! The load is a `futures::Shared`, so it keeps making progress as long as
//! any waiter polls it: a cancelled caller never cancels the load for the
//! others. The in-flight entry is removed by the load itself on completion.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type InFlight<T> = (u64, Shared<BoxFuture<'static, T>>);

pub struct RequestCollapser<T>
where
    T: Clone + Send + Sync + 'static,
{
    in_flight: Arc<DashMap<String, InFlight<T>>>,
    next_generation: AtomicU64,
}

impl<T> RequestCollapser<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Run `loader` for `key`, or join the load already in flight for it.
    ///
    /// `loader` is only invoked when no load for `key` is in flight.
    pub async fn run<F, Fut>(&self, key: &str, loader: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(e) => {
                tracing::trace!(key, "joining in-flight load");
                e.get().1.clone()
            }
            Entry::Vacant(e) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let in_flight = Arc::clone(&self.in_flight);
                let owned_key = e.key().clone();
                let load = loader();

                let shared = async move {
                    let result = load.await;
                    in_flight.remove_if(&owned_key, |_, (g, _)| *g == generation);
                    result
                }
                .boxed()
                .shared();

                e.insert((generation, shared.clone()));
                shared
            }
        };

        shared.await
    }

    /// Number of keys with a load in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<T> Default for RequestCollapser<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
