//! The Engine: the single owned value that replaces the original's
//! module-level singletons (spec §9). It owns the locator cache, one
//! [`SessionPool`] per worker, and the work-load table; collaborators
//! receive it by reference (or, for streaming, by `Arc`).

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use bytes::Bytes;
use futures::Stream;
use msgstore_client::{BackendTransport, FileLocator, SessionPool};

use crate::cache::FileLocatorCache;
use crate::error::Error;
use crate::range::RangePlan;
use crate::worker::{WorkLoadGuard, WorkerLoadTable};

/// The home datacenter and authorization key for one pre-authenticated
/// worker client.
#[derive(Clone)]
pub struct WorkerCredentials {
    pub home_dc_id: i32,
    pub home_auth_key: Vec<u8>,
}

/// Tunables from configuration (spec §6, "Consumed from collaborators").
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub store_channel_id: i64,
    pub clean_interval: Duration,
    pub chunk_size_bytes: i64,
    pub auth_retry_limit: u32,
    pub auth_settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_channel_id: 0,
            clean_interval: Duration::from_secs(1800),
            chunk_size_bytes: 1_048_576,
            auth_retry_limit: 3,
            auth_settle_delay: Duration::from_millis(1000),
        }
    }
}

pub struct Engine {
    transport: Arc<dyn BackendTransport>,
    cache: Arc<FileLocatorCache>,
    pools: Vec<SessionPool>,
    work_loads: Arc<WorkerLoadTable>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        transport: Arc<dyn BackendTransport>,
        workers: Vec<WorkerCredentials>,
        config: EngineConfig,
    ) -> Self {
        let pools: Vec<SessionPool> = workers
            .into_iter()
            .map(|w| {
                SessionPool::new(
                    transport.clone(),
                    w.home_dc_id,
                    w.home_auth_key,
                    config.auth_retry_limit,
                    config.auth_settle_delay,
                )
            })
            .collect();
        let work_loads = Arc::new(WorkerLoadTable::new(pools.len()));

        Self {
            transport,
            cache: Arc::new(FileLocatorCache::new()),
            pools,
            work_loads,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<FileLocatorCache> {
        &self.cache
    }

    pub fn clean_interval(&self) -> Duration {
        self.config.clean_interval
    }

    pub fn worker_count(&self) -> usize {
        self.pools.len()
    }

    /// Maps a message id to a `FileLocator`, consulting the cache first.
    pub async fn resolve(&self, message_id: i64) -> Result<FileLocator, Error> {
        if let Some(locator) = self.cache.get(message_id).await {
            return Ok(locator);
        }

        match self
            .transport
            .get_file_ids(self.config.store_channel_id, message_id)
            .await
        {
            Ok(Some(locator)) => {
                self.cache.insert(message_id, locator.clone()).await;
                Ok(locator)
            }
            Ok(None) => Err(Error::NotFound),
            Err(e) => Err(Error::BackendUnavailable(Arc::new(e))),
        }
    }

    /// Picks the worker with the minimum in-flight count.
    pub fn select_worker(&self) -> usize {
        self.work_loads.select_worker()
    }

    /// Streams bytes `[range_start, range_end]` (inclusive) of `locator`,
    /// using the session pool of `worker_index`. `worker_index` must already
    /// have been produced by [`Self::select_worker`] — this method only
    /// ever decrements the load it incremented.
    pub fn stream(
        self: Arc<Self>,
        locator: FileLocator,
        worker_index: usize,
        range_start: i64,
        range_end: i64,
    ) -> impl Stream<Item = Result<Bytes, Error>> {
        // Constructed here, before the generator body, so the load is
        // released even if the returned stream is dropped without ever
        // being polled (e.g. the caller selects a worker and then the HTTP
        // response never gets built). A guard created as the first
        // statement inside `try_stream!` would not exist until first poll,
        // leaving the eager increment in `select_worker` unmatched.
        let guard = WorkLoadGuard::new(self.work_loads.clone(), worker_index);

        try_stream! {
            let _guard = guard;
            let plan = RangePlan::compute(range_start, range_end, self.config.chunk_size_bytes);

            let pool = &self.pools[worker_index];
            let session = pool.session_for(&locator).await?;

            let mut current = 1u64;
            while current <= plan.part_count {
                let offset = plan.offset_for_part(current);

                let chunk = loop {
                    match session
                        .get_file(&locator, offset, plan.chunk_size as i32)
                        .await
                    {
                        Ok(chunk) => break chunk,
                        Err(msgstore_client::Error::FloodWait(d)) => {
                            tracing::warn!(?d, offset, "flood wait fetching chunk");
                            tokio::time::sleep(d + Duration::from_secs(1)).await;
                        }
                        Err(e) => {
                            Err::<(), _>(Error::BackendUnavailable(Arc::new(e)))?;
                            unreachable!();
                        }
                    }
                };

                if chunk.is_eof() {
                    tracing::debug!(
                        current,
                        part_count = plan.part_count,
                        "backend returned eof before part_count was reached"
                    );
                    return;
                }

                yield Bytes::copy_from_slice(plan.trim(current, &chunk.bytes));
                current += 1;
            }
        }
    }
}
