//! Lookup collaborators and the per-query caches in front of them.
//!
//! Ownership model:
//! - `LookupService` is the network-facing collaborator (primary dictionary or
//!   secondary reference). It is never called twice for the same query in one
//!   run, and never called for a query already in the store.
//! - `LookupCache` owns the cache-then-fetch policy on top of an
//!   `ArtifactStore`, so an interrupted run resumes at query granularity.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::lookup::{PRIMARY_KEY_PREFIX, SECONDARY_KEY_PREFIX};
use crate::data::{CandidateEntry, SecondaryResult};
use crate::errors::{FetchError, PipelineError};
use crate::groups::QueryGroups;
use crate::store::{ArtifactStore, load_record, save_record};
use crate::types::{ProviderName, Query};

/// Network-bound source that answers one query at a time.
pub trait LookupService: Send + Sync {
    /// Parsed answer for one query.
    type Record;

    /// Provider name recorded on cached results.
    fn name(&self) -> &str;

    /// Fetch the answer for `query`.
    ///
    /// `Ok(None)` means the source has no result; it is cached and never
    /// retried. `Err` means the attempt failed and may be retried next run.
    fn fetch(&self, query: &str) -> Result<Option<Self::Record>, FetchError>;
}

/// Primary source returning the candidate list for a query.
pub type PrimaryService = dyn LookupService<Record = Vec<CandidateEntry>>;
/// Secondary source returning one reference result for a query.
pub type SecondaryService = dyn LookupService<Record = SecondaryResult>;

/// Record type that can live in a lookup cache.
pub trait CacheRecord: bitcode::Encode + bitcode::DecodeOwned + Clone {
    /// Store-side prefix for records of this type.
    const KEY_PREFIX: &'static str;

    /// Record cached when `provider` reports no result for `query`.
    fn not_found(query: &str, provider: &str) -> Self;
}

impl CacheRecord for Vec<CandidateEntry> {
    const KEY_PREFIX: &'static str = PRIMARY_KEY_PREFIX;

    fn not_found(_query: &str, _provider: &str) -> Self {
        Vec::new()
    }
}

impl CacheRecord for SecondaryResult {
    const KEY_PREFIX: &'static str = SECONDARY_KEY_PREFIX;

    fn not_found(query: &str, provider: &str) -> Self {
        SecondaryResult::empty(query, provider)
    }
}

impl<T: LookupService + ?Sized> LookupService for Arc<T> {
    type Record = T::Record;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, query: &str) -> Result<Option<Self::Record>, FetchError> {
        (**self).fetch(query)
    }
}

/// Lookup service answering from a fixed table.
///
/// Queries outside the table answer "no result". Queries marked unavailable
/// fail transiently until `restore` is called. Every fetch is recorded.
pub struct InMemoryLookup<R> {
    name: ProviderName,
    records: HashMap<Query, R>,
    unavailable: RwLock<HashSet<Query>>,
    calls: Mutex<Vec<Query>>,
}

impl<R: Clone + Send + Sync> InMemoryLookup<R> {
    /// Empty table for provider `name`.
    pub fn new(name: impl Into<ProviderName>) -> Self {
        Self {
            name: name.into(),
            records: HashMap::new(),
            unavailable: RwLock::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `query` with `record`.
    pub fn with_record(mut self, query: impl Into<Query>, record: R) -> Self {
        self.records.insert(query.into(), record);
        self
    }

    /// Fail `query` transiently until restored.
    pub fn with_unavailable(self, query: impl Into<Query>) -> Self {
        if let Ok(mut unavailable) = self.unavailable.write() {
            unavailable.insert(query.into());
        }
        self
    }

    /// Let a previously unavailable query answer normally.
    pub fn restore(&self, query: &str) {
        if let Ok(mut unavailable) = self.unavailable.write() {
            unavailable.remove(query);
        }
    }

    /// Queries fetched so far, in call order.
    pub fn calls(&self) -> Vec<Query> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of fetches so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl<R: Clone + Send + Sync> LookupService for InMemoryLookup<R> {
    type Record = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, query: &str) -> Result<Option<R>, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.to_string());
        }
        let unavailable = self
            .unavailable
            .read()
            .map(|set| set.contains(query))
            .unwrap_or(false);
        if unavailable {
            return Err(FetchError::transient(query, format!("{} unavailable", self.name)));
        }
        Ok(self.records.get(query).cloned())
    }
}

/// Store key of the cached record for `query`.
pub fn cache_key<R: CacheRecord>(query: &str) -> String {
    format!("{}{}", R::KEY_PREFIX, query)
}

/// Read a cached record without ever fetching.
pub fn read_cached<R: CacheRecord>(
    store: &dyn ArtifactStore,
    query: &str,
) -> Result<Option<R>, PipelineError> {
    load_record(store, &cache_key::<R>(query))
}

/// Fetch counters for one cache over one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Queries answered from the store.
    pub cache_hits: usize,
    /// Queries sent to the service.
    pub fetched: usize,
    /// Fetched queries the service had no result for.
    pub not_found: usize,
    /// Fetched queries that failed and were left uncached.
    pub failed: usize,
}

/// Cache-then-fetch front for one `LookupService`.
pub struct LookupCache<'a, R: CacheRecord> {
    store: &'a dyn ArtifactStore,
    service: &'a dyn LookupService<Record = R>,
    memo: HashMap<Query, Option<R>>,
    stats: FetchStats,
}

impl<'a, R: CacheRecord> LookupCache<'a, R> {
    /// Cache over `store` in front of `service`, with an empty memo.
    pub fn new(store: &'a dyn ArtifactStore, service: &'a dyn LookupService<Record = R>) -> Self {
        Self {
            store,
            service,
            memo: HashMap::new(),
            stats: FetchStats::default(),
        }
    }

    /// Return the record for `query`, fetching and caching it when absent.
    ///
    /// `Ok(None)` means the fetch failed transiently; the query stays uncached
    /// and is not retried again within this cache's lifetime.
    pub fn ensure(&mut self, query: &str) -> Result<Option<R>, PipelineError> {
        if let Some(known) = self.memo.get(query) {
            return Ok(known.clone());
        }
        let key = cache_key::<R>(query);
        let record = if let Some(cached) = load_record::<R>(self.store, &key)? {
            debug!("[vocab:lookup] cache hit '{}' ({})", query, self.service.name());
            self.stats.cache_hits += 1;
            Some(cached)
        } else {
            self.stats.fetched += 1;
            match self.service.fetch(query) {
                Ok(Some(record)) => {
                    save_record(self.store, &key, &record, false)?;
                    Some(record)
                }
                Ok(None) => {
                    self.stats.not_found += 1;
                    let record = R::not_found(query, self.service.name());
                    save_record(self.store, &key, &record, false)?;
                    Some(record)
                }
                Err(err) => {
                    warn!("[vocab:lookup] {} skipped: {}", self.service.name(), err);
                    self.stats.failed += 1;
                    None
                }
            }
        };
        self.memo.insert(query.to_string(), record.clone());
        Ok(record)
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> FetchStats {
        self.stats
    }
}

/// One cached primary query and how many candidates it returned.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct ManifestEntry {
    /// Group query.
    pub query: Query,
    /// Candidates in the cached record; zero for "no result".
    pub candidates: u32,
}

/// Output of the primary lookup stage: every query whose candidates are cached.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct LookupManifest {
    /// Cached queries in group order.
    pub entries: Vec<ManifestEntry>,
}

/// Make sure every query group has a cached primary result.
///
/// Queries that fail transiently are left out of the manifest; the returned
/// stats report them as `failed`.
pub fn populate_primary_cache(
    store: &dyn ArtifactStore,
    service: &PrimaryService,
    groups: &QueryGroups,
) -> Result<(LookupManifest, FetchStats), PipelineError> {
    let mut cache = LookupCache::new(store, service);
    let mut manifest = LookupManifest::default();
    for group in &groups.groups {
        if let Some(candidates) = cache.ensure(&group.query)? {
            manifest.entries.push(ManifestEntry {
                query: group.query.clone(),
                candidates: candidates.len() as u32,
            });
        }
    }
    Ok((manifest, cache.stats()))
}
