// src/upstream.rs
// The external-collaborator boundary: the remote-API fetch path the
// query executor falls through to on a cache miss. This crate only
// declares the trait; an HTTP-backed implementation, the JSON-RPC
// framing layer, and the remote collaborator itself live outside the
// core.

use async_trait::async_trait;
use serde_json::Value;

use crate::entities::{EntityKind, FieldDescriptor, Record};
use crate::error::Result;

/// Everything a table-records fetch returns: the rows, the authoritative
/// total, and — when the upstream has one ready — the table's current
/// field schema.
#[derive(Debug, Clone)]
pub struct TableRecordsFetch {
    pub items: Vec<Record>,
    pub total_count: u64,
    pub schema: Option<Vec<FieldDescriptor>>,
}

/// The remote record-management back end, reached only through this
/// trait. The core treats every response as authoritative input to the
/// field-value coercer (C9).
#[async_trait]
pub trait UpstreamCollaborator: Send + Sync {
    /// Fetch every record of a table (the upstream handles its own
    /// pagination internally; the core always receives the full set).
    async fn fetch_table_records(&self, table_id: &str) -> Result<TableRecordsFetch>;

    /// Fetch a single typed entity (solution, table, member, team, view,
    /// deleted-record tombstone) by id.
    async fn fetch_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Value>>;

    /// Fetch a list of entities of one kind, optionally filtered
    /// (workspace/solution listings, member directories, …).
    async fn fetch_list(&self, kind: EntityKind, filters: Option<Value>) -> Result<Vec<Value>>;

    /// Apply a remote mutation and return the resulting record, so the
    /// caller can write it through to the cache without a refetch.
    async fn mutate_record(&self, table_id: &str, record_id: &str, patch: Value) -> Result<Record>;
}
