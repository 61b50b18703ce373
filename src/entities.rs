// src/entities.rs
// Data model: solutions, tables, fields, records, members, teams, views,
// deleted-record tombstones, and the cache envelope that wraps them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::FieldType;

/// Wraps every cached entity with freshness bookkeeping.
/// Invariant: `expires_at > cached_at`; a row is valid iff `now < expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub payload: T,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source_hash: Option<String>,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T, cached_at: DateTime<Utc>, ttl_seconds: i64) -> Self {
        Self {
            payload,
            cached_at,
            expires_at: cached_at + chrono::Duration::seconds(ttl_seconds.max(1)),
            source_hash: None,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SolutionPermissions {
    #[serde(default)]
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo_color: Option<String>,
    #[serde(default)]
    pub logo_icon: Option<String>,
    #[serde(default)]
    pub activity: Option<serde_json::Value>,
    #[serde(default)]
    pub permissions: Option<SolutionPermissions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub solution_id: String,
    pub name: String,
    #[serde(default)]
    pub structure: Option<Vec<FieldDescriptor>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldParams {
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub linked_table_id: Option<String>,
}

impl Default for FieldParams {
    fn default() -> Self {
        FieldParams {
            choices: Vec::new(),
            min: None,
            max: None,
            linked_table_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Stable identifier within the table; keys `Record::data`.
    pub slug: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub params: FieldParams,
}

/// A record row. `data` is semi-structured: the concrete shape of each
/// value is determined by the field's `field_type` (see `coerce.rs`).
/// Stored as opaque JSON — no schema migration is required when the
/// table's field list changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub table_id: String,
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub team_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub table_id: String,
    pub name: String,
    pub filter: Option<serde_json::Value>,
    pub sort: Option<serde_json::Value>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// A deleted-record snapshot plus deletion metadata, enumerable per
/// solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub record: Record,
    pub solution_id: String,
    pub deleted_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_by: Option<String>,
}

/// The kind tag used by `CacheStore::{put,get}_entity`. Kept as a
/// string-backed enum so new entity classes are a localised change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Solution,
    Table,
    Member,
    Team,
    View,
    DeletedRecord,
}
