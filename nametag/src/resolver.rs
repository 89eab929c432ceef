//! Batch orchestration: cache lookup, chunked RPC, cache write-back.
//!
//! [`Resolver::resolve`] takes any number of addresses and returns the names
//! that could be resolved. Cached results (positive or negative) are served
//! without a network call; the rest are split into chunks of at most
//! `max_batch_size`, each sent as one `aggregate3` call after waiting out the
//! shared [`Cooldown`]. Chunks run one after another.
//!
//! Failures are contained per chunk: a transport error, an undecodable payload
//! or a result count that does not match the chunk leaves that chunk
//! unresolved and uncached while the remaining chunks proceed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, error, warn};

use crate::abi::{decode_batch, encode_batch};
use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::cooldown::Cooldown;
use crate::error::{Error, Result};
use crate::name::Name;
use crate::store::KeyValueStore;
use crate::transport::Transport;
use crate::util::dedup_ordered;

/// What happened to one address during a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Served from a fresh cache entry; `None` is a cached negative.
    Cached(Option<Name>),
    /// Looked up on-chain in this pass; `None` means no name.
    Resolved(Option<Name>),
    /// Its chunk failed; nothing was learned or cached.
    Failed,
}

impl Outcome {
    /// The name carried by this outcome, if any.
    #[must_use]
    pub const fn name(&self) -> Option<&Name> {
        match self {
            Self::Cached(name) | Self::Resolved(name) => name.as_ref(),
            Self::Failed => None,
        }
    }

    /// Whether the address was part of a failed chunk.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Detailed result of [`Resolver::resolve_detailed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// One outcome per distinct input address, in first-seen order.
    pub outcomes: Vec<(Address, Outcome)>,
    /// Number of transport calls issued.
    pub transport_calls: usize,
}

impl Resolution {
    /// Outcome for `address`, if it was part of the request.
    #[must_use]
    pub fn outcome(&self, address: &Address) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, outcome)| outcome)
    }

    /// Every address that has a name.
    #[must_use]
    pub fn names(&self) -> HashMap<Address, Name> {
        self.outcomes
            .iter()
            .filter_map(|(address, outcome)| outcome.name().map(|n| (*address, n.clone())))
            .collect()
    }

    /// Consume into the address to name mapping.
    #[must_use]
    pub fn into_names(self) -> HashMap<Address, Name> {
        self.outcomes
            .into_iter()
            .filter_map(|(address, outcome)| match outcome {
                Outcome::Cached(Some(name)) | Outcome::Resolved(Some(name)) => Some((address, name)),
                _ => None,
            })
            .collect()
    }

    /// Addresses whose chunk failed.
    pub fn failed(&self) -> impl Iterator<Item = Address> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(address, _)| *address)
    }
}

/// Resolves addresses to names through a cache, a transport and a cooldown.
pub struct Resolver {
    config: Config,
    cache: ResolutionCache,
    transport: Arc<dyn Transport>,
    cooldown: Arc<Cooldown>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("endpoint", &self.config.rpc_endpoint)
            .field("cache", &self.cache)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Build a resolver with its own cooldown.
    ///
    /// The cooldown is private to this resolver. Resolvers that hit the same
    /// endpoint only space their calls against each other when they share one
    /// [`Cooldown`] through [`Resolver::with_cooldown`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_batch_size` or the cooldown is out
    /// of range. Values are never clamped.
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.check_resolver_bounds()?;
        let cache = ResolutionCache::from_config(store, &config);
        let cooldown = Arc::new(Cooldown::new(config.cooldown()));
        Ok(Self {
            config,
            cache,
            transport,
            cooldown,
        })
    }

    /// Share `cooldown` with other resolvers hitting the same endpoint.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Arc<Cooldown>) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// The configuration this resolver was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The rate limiter in use.
    #[must_use]
    pub const fn cooldown(&self) -> &Arc<Cooldown> {
        &self.cooldown
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolve `addresses`, returning only those that have a name.
    ///
    /// Never fails: addresses that could not be resolved are simply absent.
    pub async fn resolve(&self, addresses: &[Address]) -> HashMap<Address, Name> {
        self.resolve_detailed(addresses).await.into_names()
    }

    /// Resolve `addresses` and report what happened to each one.
    pub async fn resolve_detailed(&self, addresses: &[Address]) -> Resolution {
        let unique = dedup_ordered(addresses.iter().copied());
        if unique.is_empty() {
            return Resolution::default();
        }

        let mut outcomes: HashMap<Address, Outcome> = HashMap::with_capacity(unique.len());
        if self.config.cache_enabled {
            match self.cache.get_many(&unique).await {
                Ok(hits) => outcomes.extend(
                    hits.into_iter()
                        .map(|(address, entry)| (address, Outcome::Cached(entry.name))),
                ),
                Err(e) => warn!(error = %e, "cache read failed, treating all as misses"),
            }
        }

        let misses: Vec<Address> = unique
            .iter()
            .copied()
            .filter(|a| !outcomes.contains_key(a))
            .collect();
        debug!(
            total = unique.len(),
            cached = unique.len() - misses.len(),
            misses = misses.len(),
            "partitioned addresses"
        );

        let mut transport_calls = 0;
        for chunk in misses.chunks(self.config.max_batch_size) {
            self.cooldown.wait().await;
            transport_calls += 1;

            match self.resolve_chunk(chunk).await {
                Ok(names) => {
                    let results: Vec<(Address, Option<Name>)> =
                        chunk.iter().copied().zip(names).collect();
                    if self.config.cache_enabled
                        && let Err(e) = self.cache.set_many(&results).await
                    {
                        warn!(error = %e, "cache write failed");
                    }
                    outcomes.extend(
                        results
                            .into_iter()
                            .map(|(address, name)| (address, Outcome::Resolved(name))),
                    );
                }
                Err(e) => {
                    if e.is_network() {
                        warn!(error = %e, size = chunk.len(), "chunk failed");
                    } else {
                        error!(error = %e, size = chunk.len(), "chunk response rejected");
                    }
                    outcomes.extend(chunk.iter().map(|a| (*a, Outcome::Failed)));
                }
            }
        }

        Resolution {
            outcomes: unique
                .into_iter()
                .map(|a| (a, outcomes.remove(&a).unwrap_or(Outcome::Failed)))
                .collect(),
            transport_calls,
        }
    }

    async fn resolve_chunk(&self, chunk: &[Address]) -> Result<Vec<Option<Name>>> {
        let payload = encode_batch(chunk)?;
        let response = self
            .transport
            .call(&self.config.rpc_endpoint, &payload, &self.config.custom_headers)
            .await?;

        let slots = decode_batch(&response);
        if slots.len() != chunk.len() {
            return Err(Error::abi(format!(
                "expected {} results, got {}",
                chunk.len(),
                slots.len()
            )));
        }

        Ok(chunk
            .iter()
            .zip(slots)
            .map(|(address, slot)| {
                slot.unwrap_or_else(|e| {
                    debug!(%address, error = %e, "undecodable slot");
                    None
                })
            })
            .collect())
    }

    /// Remove every cached result; returns how many entries were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear_cache(&self) -> Result<usize> {
        self.cache.clear().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use alloy::primitives::Bytes;
    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::abi::{decode_batch_request, encode_batch_return};
    use crate::store::InMemoryStore;

    /// Answers from a fixed name table and records every call.
    #[derive(Default)]
    struct ScriptedTransport {
        names: HashMap<Address, String>,
        fail_calls: Vec<usize>,
        calls: Mutex<Vec<(Instant, usize)>>,
        last_headers: Mutex<BTreeMap<String, String>>,
    }

    impl ScriptedTransport {
        fn with_names(names: &[(Address, &str)]) -> Self {
            Self {
                names: names.iter().map(|(a, n)| (*a, (*n).to_owned())).collect(),
                ..Self::default()
            }
        }

        fn failing_on(mut self, call_index: usize) -> Self {
            self.fail_calls.push(call_index);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn chunk_sizes(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(|(_, n)| *n).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn call(
            &self,
            _endpoint: &str,
            payload: &Bytes,
            headers: &BTreeMap<String, String>,
        ) -> Result<Bytes> {
            let addresses = decode_batch_request(payload)?;
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((Instant::now(), addresses.len()));
                calls.len() - 1
            };
            *self.last_headers.lock().unwrap() = headers.clone();
            if self.fail_calls.contains(&index) {
                return Err(Error::transport("connection reset"));
            }
            let answers: Vec<Option<&str>> = addresses
                .iter()
                .map(|a| self.names.get(a).map(String::as_str))
                .collect();
            Ok(encode_batch_return(&answers))
        }
    }

    /// Returns a fixed payload regardless of the request.
    struct FixedTransport(Bytes);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn call(
            &self,
            _endpoint: &str,
            _payload: &Bytes,
            _headers: &BTreeMap<String, String>,
        ) -> Result<Bytes> {
            Ok(self.0.clone())
        }
    }

    /// Formatted log output captured on the current thread.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn lines_with(&self, message: &str) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .filter(|line| line.contains(message))
                .map(str::to_owned)
                .collect()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn addresses(n: usize) -> Vec<Address> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 20];
                bytes[0] = 0x5a;
                bytes[12..].copy_from_slice(&(i as u64 + 1).to_be_bytes());
                Address::from(bytes)
            })
            .collect()
    }

    fn fast_config() -> Config {
        Config::default().with_cooldown(Duration::ZERO)
    }

    fn resolver(config: Config, transport: &Arc<ScriptedTransport>) -> (Resolver, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let resolver = Resolver::new(
            config,
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::clone(transport) as Arc<dyn Transport>,
        )
        .unwrap();
        (resolver, store)
    }

    mod construction {
        use super::*;

        #[test]
        fn rejects_out_of_range_batch_size() {
            let transport = Arc::new(ScriptedTransport::default());
            for size in [0, 501] {
                let err = Resolver::new(
                    Config::default().with_max_batch_size(size),
                    Arc::new(InMemoryStore::new()),
                    Arc::clone(&transport) as Arc<dyn Transport>,
                )
                .unwrap_err();
                assert!(matches!(err, Error::Config(_)), "{size}");
            }
        }

        #[test]
        fn rejects_excessive_cooldown() {
            let err = Resolver::new(
                Config::default().with_cooldown(Duration::from_millis(30_001)),
                Arc::new(InMemoryStore::new()),
                Arc::new(ScriptedTransport::default()),
            )
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }

        #[test]
        fn accepts_bounds() {
            for (size, ms) in [(1, 0), (500, 30_000)] {
                let config = Config::default()
                    .with_max_batch_size(size)
                    .with_cooldown(Duration::from_millis(ms));
                assert!(
                    Resolver::new(
                        config,
                        Arc::new(InMemoryStore::new()),
                        Arc::new(ScriptedTransport::default()),
                    )
                    .is_ok()
                );
            }
        }
    }

    mod resolve {
        use super::*;

        #[tokio::test]
        async fn empty_input_makes_no_call() {
            let transport = Arc::new(ScriptedTransport::default());
            let (resolver, _) = resolver(fast_config(), &transport);
            assert!(resolver.resolve(&[]).await.is_empty());
            assert_eq!(transport.call_count(), 0);
        }

        #[tokio::test]
        async fn positives_only_in_result() {
            let a = addresses(3);
            let transport = Arc::new(ScriptedTransport::with_names(&[(a[0], "alice.wei")]));
            let (resolver, _) = resolver(fast_config(), &transport);

            let names = resolver.resolve(&a).await;
            assert_eq!(names.len(), 1);
            assert_eq!(names[&a[0]], "alice.wei");
        }

        #[tokio::test]
        async fn duplicates_are_resolved_once() {
            let a = addresses(2);
            let transport = Arc::new(ScriptedTransport::with_names(&[(a[1], "bob.wei")]));
            let (resolver, _) = resolver(fast_config(), &transport);

            let detailed = resolver
                .resolve_detailed(&[a[1], a[0], a[1], a[1]])
                .await;
            assert_eq!(transport.chunk_sizes(), vec![2]);
            let order: Vec<Address> = detailed.outcomes.iter().map(|(x, _)| *x).collect();
            assert_eq!(order, vec![a[1], a[0]]);
        }

        #[tokio::test]
        async fn second_call_is_served_from_cache() {
            let a = addresses(2);
            let transport = Arc::new(ScriptedTransport::with_names(&[(a[0], "alice.wei")]));
            let (resolver, _) = resolver(fast_config(), &transport);

            let first = resolver.resolve(&a).await;
            let second = resolver.resolve_detailed(&a).await;

            assert_eq!(transport.call_count(), 1);
            assert_eq!(second.transport_calls, 0);
            assert_eq!(first, second.names());
            assert_eq!(
                second.outcome(&a[0]),
                Some(&Outcome::Cached(Name::sanitize("alice.wei")))
            );
        }

        #[tokio::test]
        async fn negative_results_are_cached() {
            let a = addresses(1);
            let transport = Arc::new(ScriptedTransport::default());
            let (resolver, store) = resolver(fast_config(), &transport);

            assert!(resolver.resolve(&a).await.is_empty());
            assert!(resolver.resolve(&a).await.is_empty());
            assert_eq!(transport.call_count(), 1);
            assert_eq!(store.len().await, 1);
            assert_eq!(
                resolver.resolve_detailed(&a).await.outcome(&a[0]),
                Some(&Outcome::Cached(None))
            );
        }

        #[tokio::test]
        async fn custom_headers_reach_transport() {
            let transport = Arc::new(ScriptedTransport::default());
            let config = fast_config().with_header("x-api-key", "secret");
            let (resolver, _) = resolver(config, &transport);

            resolver.resolve(&addresses(1)).await;
            let headers = transport.last_headers.lock().unwrap().clone();
            assert_eq!(headers.get("x-api-key").map(String::as_str), Some("secret"));
        }

        #[tokio::test]
        async fn disabled_cache_always_calls() {
            let a = addresses(2);
            let transport = Arc::new(ScriptedTransport::with_names(&[(a[0], "alice.wei")]));
            let (resolver, store) = resolver(fast_config().with_cache_enabled(false), &transport);

            resolver.resolve(&a).await;
            let names = resolver.resolve(&a).await;
            assert_eq!(names.len(), 1);
            assert_eq!(transport.call_count(), 2);
            assert!(store.is_empty().await);
        }
    }

    mod chunking {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn misses_are_split_into_spaced_chunks() {
            let a = addresses(120);
            let transport = Arc::new(ScriptedTransport::with_names(&[(a[119], "last.wei")]));
            let config = Config::default()
                .with_max_batch_size(50)
                .with_cooldown(Duration::from_millis(1000));
            let (resolver, _) = resolver(config, &transport);

            let detailed = resolver.resolve_detailed(&a).await;

            assert_eq!(detailed.transport_calls, 3);
            assert_eq!(transport.chunk_sizes(), vec![50, 50, 20]);
            let times = transport.call_times();
            for pair in times.windows(2) {
                assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
            }
            assert_eq!(detailed.names().len(), 1);
        }

        #[tokio::test]
        async fn failed_chunk_is_not_cached_and_others_proceed() {
            let a = addresses(4);
            let transport = Arc::new(
                ScriptedTransport::with_names(&[(a[0], "a.wei"), (a[3], "d.wei")]).failing_on(0),
            );
            let config = fast_config().with_max_batch_size(2);
            let (resolver, store) = resolver(config, &transport);

            let detailed = resolver.resolve_detailed(&a).await;
            assert_eq!(detailed.transport_calls, 2);
            assert_eq!(detailed.failed().collect::<Vec<_>>(), vec![a[0], a[1]]);
            assert_eq!(detailed.names().len(), 1);
            assert_eq!(store.len().await, 2);

            // The failed chunk is retried next time; the good one is cached.
            let again = resolver.resolve_detailed(&a).await;
            assert_eq!(again.transport_calls, 1);
            assert_eq!(again.names().len(), 2);
        }

        #[tokio::test]
        async fn count_mismatch_fails_the_chunk() {
            let a = addresses(2);
            let store = Arc::new(InMemoryStore::new());
            let transport = Arc::new(FixedTransport(encode_batch_return(&[Some("only.wei")])));
            let resolver = Resolver::new(
                fast_config(),
                Arc::clone(&store) as Arc<dyn KeyValueStore>,
                transport,
            )
            .unwrap();

            let detailed = resolver.resolve_detailed(&a).await;
            assert_eq!(detailed.failed().count(), 2);
            assert!(store.is_empty().await);
        }

        #[tokio::test]
        async fn network_failure_logs_warning() {
            let logs = LogBuffer::default();
            let _guard = logs.install();
            let transport = Arc::new(ScriptedTransport::default().failing_on(0));
            let (resolver, _) = resolver(fast_config(), &transport);

            resolver.resolve(&addresses(2)).await;

            let failed = logs.lines_with("chunk failed");
            assert_eq!(failed.len(), 1);
            assert!(failed[0].contains("WARN"), "{failed:?}");
            assert!(logs.lines_with("chunk response rejected").is_empty());
        }

        #[tokio::test]
        async fn count_mismatch_logs_error() {
            let logs = LogBuffer::default();
            let _guard = logs.install();
            let resolver = Resolver::new(
                fast_config(),
                Arc::new(InMemoryStore::new()),
                Arc::new(FixedTransport(encode_batch_return(&[Some("only.wei")]))),
            )
            .unwrap();

            resolver.resolve(&addresses(2)).await;

            let rejected = logs.lines_with("chunk response rejected");
            assert_eq!(rejected.len(), 1);
            assert!(rejected[0].contains("ERROR"), "{rejected:?}");
            assert!(rejected[0].contains("expected 2 results, got 1"), "{rejected:?}");
            assert!(logs.lines_with("chunk failed").is_empty());
        }

        #[tokio::test]
        async fn garbage_payload_fails_the_chunk() {
            let resolver = Resolver::new(
                fast_config(),
                Arc::new(InMemoryStore::new()),
                Arc::new(FixedTransport(Bytes::from_static(b"nope"))),
            )
            .unwrap();
            assert!(resolver.resolve(&addresses(3)).await.is_empty());
        }
    }

    mod cooldown {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn back_to_back_resolves_are_spaced() {
            let a = addresses(2);
            let transport = Arc::new(ScriptedTransport::default());
            let config = Config::default().with_cooldown(Duration::from_millis(2000));
            let (resolver, _) = resolver(config, &transport);

            resolver.resolve(&a[..1]).await;
            resolver.resolve(&a[1..]).await;

            let times = transport.call_times();
            assert_eq!(times.len(), 2);
            assert!(times[1] - times[0] >= Duration::from_millis(2000));
        }

        #[tokio::test(start_paused = true)]
        async fn shared_cooldown_spans_resolvers() {
            let a = addresses(2);
            let transport = Arc::new(ScriptedTransport::default());
            let config = Config::default().with_cooldown(Duration::from_millis(1500));
            let shared = Arc::new(Cooldown::new(config.cooldown()));

            let (first, _) = resolver(config.clone(), &transport);
            let (second, _) = resolver(config, &transport);
            let first = first.with_cooldown(Arc::clone(&shared));
            let second = second.with_cooldown(Arc::clone(&shared));

            first.resolve(&a[..1]).await;
            second.resolve(&a[1..]).await;

            let times = transport.call_times();
            assert!(times[1] - times[0] >= Duration::from_millis(1500));
        }

        #[tokio::test(start_paused = true)]
        async fn separately_built_resolvers_do_not_share_cooldown() {
            let a = addresses(2);
            let transport = Arc::new(ScriptedTransport::default());
            let config = Config::default().with_cooldown(Duration::from_millis(1500));

            let (first, _) = resolver(config.clone(), &transport);
            let (second, _) = resolver(config, &transport);
            assert!(!Arc::ptr_eq(first.cooldown(), second.cooldown()));

            first.resolve(&a[..1]).await;
            second.resolve(&a[1..]).await;

            let times = transport.call_times();
            assert!(times[1] - times[0] < Duration::from_millis(1500));
        }
    }

    #[tokio::test]
    async fn clear_cache_forces_lookup() {
        let a = addresses(3);
        let transport = Arc::new(ScriptedTransport::default());
        let (resolver, _) = resolver(fast_config(), &transport);

        resolver.resolve(&a).await;
        assert_eq!(resolver.clear_cache().await.unwrap(), 3);
        resolver.resolve(&a).await;
        assert_eq!(transport.call_count(), 2);
    }
}
