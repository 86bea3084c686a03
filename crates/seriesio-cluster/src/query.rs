//! Query-side reader bookkeeping
//!
//! A remote requester opens a reader (or a group-by executor) here, pulls
//! batches by reader id, and finally releases everything it opened under
//! one query id. Reader ids are process-local; id 0 is never issued so a
//! zeroed request can never alias a live reader, and id -1 signals "no
//! data here" to the requester without a registration.

use crate::group_by::GroupByExecutor;
use crate::rpc::{GroupByRequest, SingleSeriesQueryRequest};
use dashmap::DashMap;
use parking_lot::Mutex;
use seriesio_common::response::READER_NOT_HOSTED;
use seriesio_common::{Error, Node, Result, TimeValuePair, TsValue};
use seriesio_storage::{Filter, StorageEngine};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

struct SeriesReader {
    pending: Mutex<VecDeque<TimeValuePair>>,
}

struct ByTimestampReader {
    points: std::collections::BTreeMap<i64, TsValue>,
}

/// Registry of open readers and group-by executors for remote queries.
pub struct QueryRouter {
    storage: Arc<dyn StorageEngine>,
    next_id: AtomicI64,
    readers: DashMap<i64, SeriesReader>,
    by_timestamp: DashMap<i64, ByTimestampReader>,
    executors: DashMap<i64, GroupByExecutor>,
    /// (requester node id, query id) -> reader/executor ids to release
    by_query: DashMap<(i32, i64), Vec<i64>>,
}

impl QueryRouter {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self {
            storage,
            next_id: AtomicI64::new(1),
            readers: DashMap::new(),
            by_timestamp: DashMap::new(),
            executors: DashMap::new(),
            by_query: DashMap::new(),
        }
    }

    fn issue_id(&self, requester: &Node, query_id: i64) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.by_query
            .entry((requester.node_id, query_id))
            .or_default()
            .push(id);
        id
    }

    /// Open a batch reader over one series. Returns [`READER_NOT_HOSTED`] when no
    /// local point matches, so the requester skips further round trips.
    pub fn open_reader(&self, request: &SingleSeriesQueryRequest) -> Result<i64> {
        let filter = combine(request.time_filter.clone(), request.value_filter.clone());
        let points = match self.storage.query(&request.path, filter.as_ref()) {
            Ok(points) => points,
            // a storage group this node never hosted simply has no data
            Err(Error::StorageGroupNotSet(_)) => return Ok(READER_NOT_HOSTED),
            Err(e) => return Err(e),
        };
        if points.is_empty() {
            return Ok(READER_NOT_HOSTED);
        }
        let id = self.issue_id(&request.requester, request.query_id);
        self.readers.insert(
            id,
            SeriesReader {
                pending: Mutex::new(points.into()),
            },
        );
        debug!(reader = id, path = %request.path, "reader opened");
        Ok(id)
    }

    /// Pull the next batch from a reader. An empty batch means the reader
    /// is exhausted.
    pub fn fetch(&self, reader_id: i64, fetch_size: usize) -> Result<Vec<TimeValuePair>> {
        let reader = self
            .readers
            .get(&reader_id)
            .ok_or(Error::ReaderNotFound(reader_id))?;
        let mut pending = reader.pending.lock();
        let take = fetch_size.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    /// Open a random-access reader over one series, honoring the value
    /// filter only. Returns [`READER_NOT_HOSTED`] when no local point
    /// matches.
    pub fn open_reader_by_timestamp(&self, request: &SingleSeriesQueryRequest) -> Result<i64> {
        let points = match self
            .storage
            .query(&request.path, request.value_filter.as_ref())
        {
            Ok(points) => points,
            Err(Error::StorageGroupNotSet(_)) => return Ok(READER_NOT_HOSTED),
            Err(e) => return Err(e),
        };
        if points.is_empty() {
            return Ok(READER_NOT_HOSTED);
        }
        let id = self.issue_id(&request.requester, request.query_id);
        self.by_timestamp.insert(
            id,
            ByTimestampReader {
                points: points
                    .into_iter()
                    .map(|p| (p.timestamp, p.value))
                    .collect(),
            },
        );
        debug!(reader = id, path = %request.path, "by-timestamp reader opened");
        Ok(id)
    }

    /// Values at exactly the requested timestamps, position-parallel to
    /// the input. A timestamp without a point yields `None`.
    pub fn fetch_by_timestamp(
        &self,
        reader_id: i64,
        timestamps: &[i64],
    ) -> Result<Vec<Option<TsValue>>> {
        let reader = self
            .by_timestamp
            .get(&reader_id)
            .ok_or(Error::ReaderNotFound(reader_id))?;
        Ok(timestamps
            .iter()
            .map(|t| reader.points.get(t).cloned())
            .collect())
    }

    /// Register a group-by executor over one series. Returns [`READER_NOT_HOSTED`]
    /// when no local point matches the base filter.
    pub fn open_group_by(&self, request: &GroupByRequest) -> Result<i64> {
        let points = match self.storage.query(&request.path, request.time_filter.as_ref()) {
            Ok(points) => points,
            Err(Error::StorageGroupNotSet(_)) => return Ok(READER_NOT_HOSTED),
            Err(e) => return Err(e),
        };
        if points.is_empty() {
            return Ok(READER_NOT_HOSTED);
        }
        let id = self.issue_id(&request.requester, request.query_id);
        self.executors
            .insert(id, GroupByExecutor::new(points, request.aggregations.clone()));
        Ok(id)
    }

    /// Aggregate one window on a registered executor.
    pub fn calculate_group_by(
        &self,
        executor_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<crate::rpc::AggregateResult>> {
        let executor = self
            .executors
            .get(&executor_id)
            .ok_or(Error::ReaderNotFound(executor_id))?;
        Ok(executor.calculate(start, end))
    }

    /// Release every reader and executor the requester opened under one
    /// query id. Unknown query ids are a no-op.
    pub fn end_query(&self, requester: &Node, query_id: i64) {
        if let Some((_, ids)) = self.by_query.remove(&(requester.node_id, query_id)) {
            for id in ids {
                self.readers.remove(&id);
                self.by_timestamp.remove(&id);
                self.executors.remove(&id);
            }
            debug!(requester = %requester, query_id, "query resources released");
        }
    }
}

fn combine(time: Option<Filter>, value: Option<Filter>) -> Option<Filter> {
    match (time, value) {
        (Some(t), Some(v)) => Some(Filter::and(t, v)),
        (t, v) => t.or(v),
    }
}
