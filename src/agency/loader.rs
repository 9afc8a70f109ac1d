//! State loader pipeline
//!
//! A loader holds the last decoded agency snapshot and knows how to refresh
//! it from the leader. The base [`AgencyLoader`] does the actual fetch; the
//! other loaders wrap an inner loader and change *when* it refreshes:
//!
//! ```text
//! RefreshLoader -> DelayLoader -> InvalidateOnErrorLoader -> RetryLoader -> TimeoutLoader -> AgencyLoader
//! ```
//!
//! Layers are built once per cache by [`new_loader`] from an
//! [`AgencyCacheConfig`]; disabled layers are left out of the chain.

use super::connection::decode_read_response;
use super::discovery::LeaderDiscovery;
use super::state::AgencyPayload;
use crate::common::config::AgencyCacheConfig;
use crate::common::utils::retry_with_backoff;
use crate::common::{Error, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// First backoff step of [`RetryLoader`]
pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// A decoded agency payload together with the commit index it was read at
#[derive(Debug)]
pub struct Snapshot<T> {
    pub data: Arc<T>,
    pub commit_index: u64,
    /// False once the loader was invalidated; the data is then stale
    pub valid: bool,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            commit_index: self.commit_index,
            valid: self.valid,
        }
    }
}

/// Shared contract of every pipeline layer
#[async_trait]
pub trait StateLoader<T>: Send + Sync {
    /// Last loaded snapshot, `None` until the first successful refresh
    fn state(&self) -> Option<Snapshot<T>>;

    /// Mark the snapshot stale; the next refresh fetches the full tree
    fn invalidate(&self);

    fn valid(&self) -> bool;

    /// Time of the last successful refresh
    fn update_time(&self) -> Option<Instant>;

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()>;
}

pub type SharedLoader<T> = Arc<dyn StateLoader<T>>;

/// Wraps a loader into another one
pub type LoaderLayer<T> = Box<dyn FnOnce(SharedLoader<T>) -> SharedLoader<T> + Send>;

struct LoadedState<T> {
    data: Option<Arc<T>>,
    commit_index: u64,
    valid: bool,
    updated: Option<Instant>,
}

/// Fetches the payload from the agency leader
pub struct AgencyLoader<T> {
    refresh_lock: tokio::sync::Mutex<()>,
    state: Mutex<LoadedState<T>>,
}

impl<T: AgencyPayload> AgencyLoader<T> {
    pub fn new() -> Self {
        Self {
            refresh_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(LoadedState {
                data: None,
                commit_index: 0,
                valid: false,
                updated: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoadedState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: AgencyPayload> Default for AgencyLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: AgencyPayload> StateLoader<T> for AgencyLoader<T> {
    fn state(&self) -> Option<Snapshot<T>> {
        let state = self.lock();
        state.data.as_ref().map(|data| Snapshot {
            data: data.clone(),
            commit_index: state.commit_index,
            valid: state.valid,
        })
    }

    fn invalidate(&self) {
        self.lock().valid = false;
    }

    fn valid(&self) -> bool {
        self.lock().valid
    }

    fn update_time(&self) -> Option<Instant> {
        self.lock().updated
    }

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let leader = discovery.discover().await?;
        let config = leader
            .config()
            .await
            .map_err(|e| Error::for_agent(leader.endpoint(), e))?;

        {
            let mut state = self.lock();
            if state.valid && state.data.is_some() && state.commit_index == config.commit_index {
                state.updated = Some(Instant::now());
                return Ok(());
            }
        }

        let body = leader
            .read(&T::read_request())
            .await
            .map_err(|e| Error::for_agent(leader.endpoint(), e))?;
        let data: T =
            decode_read_response(&body).map_err(|e| Error::for_agent(leader.endpoint(), e))?;

        let mut state = self.lock();
        state.data = Some(Arc::new(data));
        state.commit_index = config.commit_index;
        state.valid = true;
        state.updated = Some(Instant::now());

        tracing::debug!(
            "Loaded agency state at commit index {} from {}",
            config.commit_index,
            leader.endpoint()
        );

        Ok(())
    }
}

macro_rules! delegate_reads {
    () => {
        fn state(&self) -> Option<Snapshot<T>> {
            self.inner.state()
        }

        fn invalidate(&self) {
            self.inner.invalidate()
        }

        fn valid(&self) -> bool {
            self.inner.valid()
        }

        fn update_time(&self) -> Option<Instant> {
            self.inner.update_time()
        }
    };
}

/// Invalidates the inner loader whenever its refresh fails or panics.
///
/// Panics are re-raised after invalidation.
pub struct InvalidateOnErrorLoader<T> {
    inner: SharedLoader<T>,
}

impl<T: AgencyPayload> InvalidateOnErrorLoader<T> {
    pub fn new(inner: SharedLoader<T>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: AgencyPayload> StateLoader<T> for InvalidateOnErrorLoader<T> {
    delegate_reads!();

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()> {
        match AssertUnwindSafe(self.inner.refresh(discovery))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.inner.invalidate();
                Err(e)
            }
            Err(panic) => {
                self.inner.invalidate();
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Skips refreshes while the inner loader is valid and was refreshed less than `delay` ago
pub struct DelayLoader<T> {
    inner: SharedLoader<T>,
    delay: Duration,
    lock: tokio::sync::Mutex<()>,
}

impl<T: AgencyPayload> DelayLoader<T> {
    pub fn new(inner: SharedLoader<T>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl<T: AgencyPayload> StateLoader<T> for DelayLoader<T> {
    delegate_reads!();

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()> {
        let _guard = self.lock.lock().await;

        if self.inner.valid() {
            if let Some(updated) = self.inner.update_time() {
                if updated.elapsed() < self.delay {
                    return Ok(());
                }
            }
        }

        self.inner.refresh(discovery).await
    }
}

/// Invalidates the inner loader once per `interval` before refreshing it
pub struct RefreshLoader<T> {
    inner: SharedLoader<T>,
    interval: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl<T: AgencyPayload> RefreshLoader<T> {
    pub fn new(inner: SharedLoader<T>, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: AgencyPayload> StateLoader<T> for RefreshLoader<T> {
    delegate_reads!();

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()> {
        let mut last = self.last.lock().await;

        let now = Instant::now();
        if last.map_or(true, |at| now.duration_since(at) >= self.interval) {
            self.inner.invalidate();
            *last = Some(now);
        }

        self.inner.refresh(discovery).await
    }
}

/// Retries failed refreshes with exponential backoff, retryable errors only
pub struct RetryLoader<T> {
    inner: SharedLoader<T>,
    retries: usize,
}

impl<T: AgencyPayload> RetryLoader<T> {
    pub fn new(inner: SharedLoader<T>, retries: usize) -> Self {
        Self { inner, retries }
    }
}

#[async_trait]
impl<T: AgencyPayload> StateLoader<T> for RetryLoader<T> {
    delegate_reads!();

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()> {
        let inner = &self.inner;
        retry_with_backoff(
            || inner.refresh(discovery),
            self.retries,
            RETRY_INITIAL_DELAY,
        )
        .await
    }
}

/// Bounds a single refresh of the inner loader
pub struct TimeoutLoader<T> {
    inner: SharedLoader<T>,
    timeout: Duration,
}

impl<T: AgencyPayload> TimeoutLoader<T> {
    pub fn new(inner: SharedLoader<T>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: AgencyPayload> StateLoader<T> for TimeoutLoader<T> {
    delegate_reads!();

    async fn refresh(&self, discovery: &dyn LeaderDiscovery) -> Result<()> {
        tokio::time::timeout(self.timeout, self.inner.refresh(discovery))
            .await
            .map_err(|_| Error::Timeout(format!("agency refresh exceeded {:?}", self.timeout)))?
    }
}

fn layer<T, F>(wrap: F) -> LoaderLayer<T>
where
    T: AgencyPayload,
    F: FnOnce(SharedLoader<T>) -> SharedLoader<T> + Send + 'static,
{
    Box::new(wrap)
}

/// Layers enabled by `config`, outermost first
pub fn layers<T: AgencyPayload>(config: &AgencyCacheConfig) -> Vec<LoaderLayer<T>> {
    let mut layers: Vec<LoaderLayer<T>> = Vec::new();

    let interval = config.refresh_interval();
    if !interval.is_zero() {
        layers.push(layer(move |inner| Arc::new(RefreshLoader::new(inner, interval))));
    }

    let delay = config.refresh_delay();
    if !delay.is_zero() {
        layers.push(layer(move |inner| Arc::new(DelayLoader::new(inner, delay))));
    }

    layers.push(layer(|inner| Arc::new(InvalidateOnErrorLoader::new(inner))));

    if config.fetch_retries > 0 {
        let retries = config.fetch_retries;
        layers.push(layer(move |inner| Arc::new(RetryLoader::new(inner, retries))));
    }

    let timeout = config.fetch_timeout();
    if !timeout.is_zero() {
        layers.push(layer(move |inner| Arc::new(TimeoutLoader::new(inner, timeout))));
    }

    layers
}

/// Apply `layers` (outermost first) around `base`
pub fn build_loader<T: AgencyPayload>(
    base: SharedLoader<T>,
    layers: Vec<LoaderLayer<T>>,
) -> SharedLoader<T> {
    layers
        .into_iter()
        .rev()
        .fold(base, |inner, layer| layer(inner))
}

/// Full pipeline for payload `T`
pub fn new_loader<T: AgencyPayload>(config: &AgencyCacheConfig) -> SharedLoader<T> {
    build_loader(Arc::new(AgencyLoader::<T>::new()), layers(config))
}
