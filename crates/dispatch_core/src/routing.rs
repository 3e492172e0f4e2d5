//! Route Path Provider: turns an ordered list of points into a drivable path.
//!
//! The provider wraps any [`RouteResolver`] backend with:
//!
//! - **Cache**: keyed by the input points quantized to a fixed precision. When
//!   full, the *first inserted* entry is dropped; reads do not refresh an entry
//!   (`LruCache::peek`), so eviction follows insertion order only.
//! - **Gate**: at most `max_concurrent` resolver calls in flight, excess requests
//!   wait in FIFO order ([`RequestGate`]).
//! - **Retry**: transient failures are retried with linear backoff and a
//!   per-attempt timeout ([`RetryPolicy`]).
//! - **Fallback**: when every attempt fails the input points themselves are
//!   returned. [`PathProvider::resolve`] never fails.
//!
//! Backends: [`StraightLineResolver`] (always available) and
//! `osrm::OsrmResolver` (feature `osrm`).

pub mod gate;
pub mod retry;

#[cfg(feature = "osrm")]
pub mod osrm;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lru::LruCache;
use tracing::{debug, warn};

use crate::config::RoutingConfig;
use crate::error::RouteError;
use crate::geo::{quantized_key, Coordinate};

pub use gate::{GatePermit, RequestGate};
pub use retry::RetryPolicy;

/// One resolver call = one attempt. Retries, caching and fallback live in [`PathProvider`].
#[async_trait]
pub trait RouteResolver: Send + Sync {
    async fn resolve(&self, points: &[Coordinate]) -> Result<Vec<Coordinate>, RouteError>;
}

/// Resolves to the input points unchanged. Useful offline and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct StraightLineResolver;

#[async_trait]
impl RouteResolver for StraightLineResolver {
    async fn resolve(&self, points: &[Coordinate]) -> Result<Vec<Coordinate>, RouteError> {
        Ok(points.to_vec())
    }
}

/// Both legs of a trip, resolved together.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPaths {
    pub pickup: Vec<Coordinate>,
    pub dropoff: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub resolver_successes: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    resolver_successes: AtomicU64,
    fallbacks: AtomicU64,
}

pub struct PathProvider {
    resolver: Arc<dyn RouteResolver>,
    cache: Mutex<LruCache<String, Vec<Coordinate>>>,
    gate: RequestGate,
    retry: RetryPolicy,
    max_points: usize,
    key_precision: usize,
    stats: StatCounters,
}

impl PathProvider {
    pub fn new(resolver: Arc<dyn RouteResolver>, config: &RoutingConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolver,
            cache: Mutex::new(LruCache::new(capacity)),
            gate: RequestGate::new(config.max_concurrent),
            retry: RetryPolicy::from_config(config),
            max_points: config.max_points.max(2),
            key_precision: config.key_precision,
            stats: StatCounters::default(),
        }
    }

    /// Provider over [`StraightLineResolver`] with default limits.
    pub fn straight_line() -> Self {
        Self::new(Arc::new(StraightLineResolver), &RoutingConfig::default())
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<String, Vec<Coordinate>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `points` into a path. Fewer than two points yields an empty path.
    pub async fn resolve(&self, points: &[Coordinate]) -> Vec<Coordinate> {
        if points.len() < 2 {
            return Vec::new();
        }
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let key = quantized_key(points, self.key_precision);
        if let Some(cached) = self.cache().peek(&key).cloned() {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        let Some(_permit) = self.gate.acquire().await else {
            warn!("route gate closed, using straight line");
            self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
            return points.to_vec();
        };

        let bounded = &points[..points.len().min(self.max_points)];
        let outcome = self
            .retry
            .run(|_attempt| self.resolver.resolve(bounded))
            .await;

        match outcome {
            Ok(path) if !path.is_empty() => {
                debug!(points = bounded.len(), waypoints = path.len(), "route resolved");
                self.stats.resolver_successes.fetch_add(1, Ordering::Relaxed);
                self.cache().put(key, path.clone());
                path
            }
            Ok(_) => {
                warn!("resolver returned an empty path, using straight line");
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                points.to_vec()
            }
            Err(error) => {
                warn!(%error, "all route attempts failed, using straight line");
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                points.to_vec()
            }
        }
    }

    pub async fn resolve_leg(&self, from: Coordinate, to: Coordinate) -> Vec<Coordinate> {
        self.resolve(&[from, to]).await
    }

    /// Resolve the pickup leg (bus → origin) and drop-off leg (origin → destination) concurrently.
    pub async fn resolve_trip(
        &self,
        bus_location: Coordinate,
        origin: Coordinate,
        destination: Coordinate,
    ) -> TripPaths {
        let (pickup, dropoff) = tokio::join!(
            self.resolve_leg(bus_location, origin),
            self.resolve_leg(origin, destination)
        );
        debug!(
            pickup = pickup.len(),
            dropoff = dropoff.len(),
            "trip paths resolved"
        );
        TripPaths { pickup, dropoff }
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn cache_len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_cached(&self, points: &[Coordinate]) -> bool {
        self.cache()
            .contains(&quantized_key(points, self.key_precision))
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            requests: self.stats.requests.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            resolver_successes: self.stats.resolver_successes.load(Ordering::Relaxed),
            fallbacks: self.stats.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Build a provider for the configured backend.
///
/// With the `osrm` feature the resolver calls `config.endpoint`; without it the
/// straight-line resolver is used.
pub fn build_path_provider(config: &RoutingConfig) -> PathProvider {
    #[cfg(feature = "osrm")]
    let resolver: Arc<dyn RouteResolver> = Arc::new(osrm::OsrmResolver::new(&config.endpoint));
    #[cfg(not(feature = "osrm"))]
    let resolver: Arc<dyn RouteResolver> = Arc::new(StraightLineResolver);

    PathProvider::new(resolver, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fewer_than_two_points_resolve_to_nothing() {
        let provider = PathProvider::straight_line();
        assert!(provider.resolve(&[Coordinate::new(1.0, 1.0)]).await.is_empty());
        assert_eq!(provider.stats().requests, 0);
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let provider = PathProvider::straight_line();
        let a = Coordinate::new(-28.2635, -52.4075);
        let b = Coordinate::new(-28.2325, -52.3815);

        provider.resolve_leg(a, b).await;
        provider
            .resolve_leg(Coordinate::new(-28.26351, -52.40749), b)
            .await;

        let stats = provider.stats();
        assert_eq!(stats.resolver_successes, 1);
        assert_eq!(stats.cache_hits, 1);
    }
}
