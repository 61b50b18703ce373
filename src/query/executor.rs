// src/query/executor.rs
// Cache-Aware Query Executor (C7): given a table id, filter, sort, and
// paging, decides cache validity, runs the compiled query, and returns
// rows plus warnings and counts.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::cache::{CacheStore, InvalidateRequest, RecordsLookup};
use crate::coerce;
use crate::config::{Config, TableTtlOverrides};
use crate::entities::{FieldDescriptor, Record};
use crate::error::{GridError, Result};
use crate::filter::compiler::{self, FieldTypeLookup};
use crate::filter::{FilterNode, ValidationWarning, WarningCollector};
use crate::query::table_lock::TableLocks;
use crate::registry::{self};
use crate::sort::SortKey;
use crate::upstream::UpstreamCollaborator;

pub enum Source {
    Cache,
    Upstream,
}

pub struct ListOutcome {
    pub rows: Vec<Record>,
    pub total_count: u64,
    pub filtered_count: u64,
    pub warnings: Vec<ValidationWarning>,
    pub source: Source,
}

/// Adapts a table's cached field list to the compiler's lookup contract.
struct SchemaLookup<'a>(&'a [FieldDescriptor]);

impl FieldTypeLookup for SchemaLookup<'_> {
    fn field_type(&self, slug: &str) -> Option<crate::registry::FieldType> {
        self.0.iter().find(|f| f.slug == slug).map(|f| f.field_type)
    }
}

pub struct QueryExecutor {
    store: Arc<CacheStore>,
    upstream: Arc<dyn UpstreamCollaborator>,
    config: Arc<Config>,
    ttl_overrides: Arc<TableTtlOverrides>,
    table_locks: Arc<TableLocks>,
}

impl QueryExecutor {
    pub fn new(
        store: Arc<CacheStore>,
        upstream: Arc<dyn UpstreamCollaborator>,
        config: Arc<Config>,
        ttl_overrides: Arc<TableTtlOverrides>,
    ) -> Self {
        QueryExecutor { store, upstream, config, ttl_overrides, table_locks: Arc::new(TableLocks::default()) }
    }

    fn effective_ttl(&self, table_id: &str) -> i64 {
        self.ttl_overrides
            .get(table_id)
            .unwrap_or_else(|| self.config.ttl_for_table(table_id))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The table's cached field list, for callers (e.g. the response
    /// shaper) that need field types outside of a `list`/`get` call.
    pub async fn table_schema(&self, table_id: &str) -> Result<Vec<FieldDescriptor>> {
        match self.store.get_table_schema(table_id).await? {
            crate::cache::SchemaLookup::Valid(s) | crate::cache::SchemaLookup::Expired(s) => Ok(s),
            crate::cache::SchemaLookup::NotFound => Ok(Vec::new()),
        }
    }

    pub async fn list(
        &self,
        table_id: &str,
        filter: Option<&FilterNode>,
        sort: &[SortKey],
        limit: Option<u32>,
        offset: Option<u32>,
        bypass_cache: bool,
    ) -> Result<ListOutcome> {
        let mut just_populated = bypass_cache || !self.cache_is_valid(table_id).await?;

        if just_populated {
            self.populate(table_id).await?;
        }

        let outcome = match self.query_cache(table_id, filter, sort, limit, offset).await {
            Ok(outcome) => Ok(outcome),
            // Cache degraded mid-flight: fall through to upstream directly
            // rather than failing the request.
            Err(e) if e.is_cache_unavailable() => {
                tracing::warn!("cache unavailable for {table_id}, falling back to upstream: {e}");
                self.populate(table_id).await?;
                just_populated = true;
                self.query_cache(table_id, filter, sort, limit, offset).await
            }
            Err(e) => Err(e),
        };

        outcome.map(|mut outcome| {
            if just_populated {
                outcome.source = Source::Upstream;
            }
            outcome
        })
    }

    async fn cache_is_valid(&self, table_id: &str) -> Result<bool> {
        match self.store.get_records(table_id, &compiler::compile(
            &FilterNode::and(vec![]),
            &SchemaLookup(&[]),
            self.config.strict_filter_validation,
            today(),
            &mut WarningCollector::enter(),
        ), &[], Some(0), Some(0)).await {
            Ok(RecordsLookup::CacheInvalid) => Ok(false),
            Ok(RecordsLookup::Rows { .. }) => Ok(true),
            Err(e) if e.is_cache_unavailable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetches the whole table from upstream, normalises it through C9,
    /// and stores it (with schema) through C6. Holds the table's lock for
    /// the whole clear-and-reinsert so a concurrent write-through either
    /// lands before this starts or waits and applies after it commits.
    async fn populate(&self, table_id: &str) -> Result<()> {
        let _guard = self.table_locks.acquire(table_id).await;
        let fetch = self.upstream.fetch_table_records(table_id).await?;

        let schema = match fetch.schema {
            Some(schema) => schema,
            None => match self.store.get_table_schema(table_id).await? {
                crate::cache::SchemaLookup::Valid(s) | crate::cache::SchemaLookup::Expired(s) => s,
                crate::cache::SchemaLookup::NotFound => Vec::new(),
            },
        };

        let normalised: Vec<Record> = fetch
            .items
            .into_iter()
            .map(|mut record| {
                for field in &schema {
                    if let Some(value) = record.data.remove(&field.slug) {
                        record.data.insert(field.slug.clone(), coerce::coerce(field.field_type, value));
                    }
                }
                record
            })
            .collect();

        if !schema.is_empty() {
            self.store
                .put_table_schema(table_id, &schema, registry::TtlCategory::Long.seconds())
                .await?;
        }

        self.store
            .put_records(table_id, &schema, &normalised, self.effective_ttl(table_id))
            .await
    }

    /// Compiles and executes `filter`/`sort`/paging directly against the
    /// (now presumed valid) cache.
    async fn query_cache(
        &self,
        table_id: &str,
        filter: Option<&FilterNode>,
        sort: &[SortKey],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<ListOutcome> {
        let schema = match self.store.get_table_schema(table_id).await? {
            crate::cache::SchemaLookup::Valid(s) | crate::cache::SchemaLookup::Expired(s) => s,
            crate::cache::SchemaLookup::NotFound => Vec::new(),
        };
        let lookup = SchemaLookup(&schema);

        let mut collector = WarningCollector::enter();
        let node = filter.cloned().unwrap_or_else(|| FilterNode::and(vec![]));
        let compiled = compiler::compile(&node, &lookup, self.config.strict_filter_validation, today(), &mut collector);
        let warnings = collector.into_warnings();

        if self.config.strict_filter_validation && compiled.sql == "0" && !warnings.is_empty() {
            return Err(GridError::Validation("filter contains an operator invalid for its field type".to_string()));
        }

        match self.store.get_records(table_id, &compiled, sort, limit, offset).await? {
            RecordsLookup::CacheInvalid => Err(GridError::CacheUnavailable(format!("table {table_id} cache is not valid"))),
            RecordsLookup::Rows { rows, total_count, filtered_count } => Ok(ListOutcome {
                rows,
                total_count,
                filtered_count,
                warnings,
                source: Source::Cache,
            }),
        }
    }

    /// Single-record fetch: same cache-first pattern, no filter.
    pub async fn get(&self, table_id: &str, record_id: &str, bypass_cache: bool) -> Result<Option<Record>> {
        if !bypass_cache {
            if let Some(record) = self.store.get_record(table_id, record_id).await? {
                return Ok(Some(record));
            }
        }
        self.populate(table_id).await?;
        self.store.get_record(table_id, record_id).await
    }

    /// Mutation write-through: applies a remote mutation and reflects its
    /// result into the cache without a refetch. Serialised against a
    /// concurrent `populate` for the same table via `table_locks` so the
    /// write-through always lands after a populate's clear, never before.
    pub async fn mutate(&self, table_id: &str, record_id: &str, patch: serde_json::Value) -> Result<Record> {
        let record = self.upstream.mutate_record(table_id, record_id, patch).await?;
        let _guard = self.table_locks.acquire(table_id).await;
        if let Err(e) = self.store.put_record(table_id, &record, self.effective_ttl(table_id)).await {
            tracing::warn!("write-through for {table_id}/{record_id} failed (will self-heal on next populate): {e}");
        }
        Ok(record)
    }

    pub async fn invalidate(&self, req: InvalidateRequest) -> Result<()> {
        self.store.invalidate(req).await
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}
