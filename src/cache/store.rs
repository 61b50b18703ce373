// src/cache/store.rs
// Cache Store (C6): persistent storage of entities and table schemas,
// TTL bookkeeping, cascading invalidation, schema-version handling.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::pool::DbPool;
use crate::entities::{EntityKind, FieldDescriptor, Record};
use crate::error::{GridError, Result};
use crate::filter::CompiledFilter;
use crate::sort::{order_by_clause, SortKey};

/// Outcome of `get_entity`.
pub enum EntityLookup {
    Valid(Value),
    Expired(Value),
    NotFound,
}

/// Outcome of `get_table_schema`.
pub enum SchemaLookup {
    Valid(Vec<FieldDescriptor>),
    Expired(Vec<FieldDescriptor>),
    NotFound,
}

/// Outcome of `get_records`.
pub enum RecordsLookup {
    CacheInvalid,
    Rows {
        rows: Vec<Record>,
        total_count: u64,
        filtered_count: u64,
    },
}

/// One row of `status()`.
#[derive(Debug, Clone)]
pub struct EntityClassStatus {
    pub kind: EntityKind,
    pub count: u64,
    pub next_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TableRecordStatus {
    pub table_id: String,
    pub count: u64,
    pub next_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStatus {
    pub entities: Vec<EntityClassStatus>,
    pub tables: Vec<TableRecordStatus>,
}

/// Scope for `invalidate`, including cascading rules.
#[derive(Debug, Clone)]
pub struct InvalidateRequest {
    pub kind: EntityKind,
    /// A specific entity id of `kind`. `None` means "every entity of this
    /// kind" (subject to `solution_id` scoping for tables).
    pub id: Option<String>,
    /// Scopes a `Table` invalidation to one solution's tables.
    pub solution_id: Option<String>,
    pub structure_changed: bool,
}

pub struct CacheStore {
    pool: DbPool,
}

impl CacheStore {
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(CacheStore { pool: DbPool::open(path).await? })
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(CacheStore { pool: DbPool::open_in_memory().await? })
    }

    // -- entities -----------------------------------------------------

    pub async fn put_entity(&self, kind: EntityKind, id: &str, payload: &Value, ttl_seconds: i64) -> Result<()> {
        let kind_str = kind.to_string();
        let id = id.to_string();
        let payload = payload.clone();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds.max(1));
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO entities (kind, id, payload, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (kind, id) DO UPDATE SET
                        payload = excluded.payload,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![kind_str, id, payload.to_string(), now.to_rfc3339(), expires_at.to_rfc3339()],
                )
                .map_err(GridError::from)?;
                Ok(())
            })
            .await
    }

    pub async fn get_entity(&self, kind: EntityKind, id: &str) -> Result<EntityLookup> {
        let kind_str = kind.to_string();
        let id = id.to_string();
        self.pool
            .run(move |conn| {
                let row: Option<(String, String)> = conn
                    .query_row(
                        "SELECT payload, expires_at FROM entities WHERE kind = ?1 AND id = ?2",
                        params![kind_str, id],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()
                    .map_err(GridError::from)?;

                let Some((payload, expires_at)) = row else {
                    return Ok(EntityLookup::NotFound);
                };
                let payload: Value = serde_json::from_str(&payload).map_err(GridError::from)?;
                let expires_at: DateTime<Utc> = expires_at
                    .parse()
                    .map_err(|e: chrono::ParseError| GridError::Other(e.to_string()))?;
                if Utc::now() < expires_at {
                    Ok(EntityLookup::Valid(payload))
                } else {
                    Ok(EntityLookup::Expired(payload))
                }
            })
            .await
    }

    // -- table schema ---------------------------------------------------

    pub async fn put_table_schema(&self, table_id: &str, fields: &[FieldDescriptor], ttl_seconds: i64) -> Result<()> {
        let table_id = table_id.to_string();
        let structure = serde_json::to_string(fields).map_err(GridError::from)?;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds.max(1));
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO table_schemas (table_id, structure, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (table_id) DO UPDATE SET
                        structure = excluded.structure,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![table_id, structure, now.to_rfc3339(), expires_at.to_rfc3339()],
                )
                .map_err(GridError::from)?;
                Ok(())
            })
            .await
    }

    pub async fn get_table_schema(&self, table_id: &str) -> Result<SchemaLookup> {
        let table_id = table_id.to_string();
        self.pool
            .run(move |conn| {
                let row: Option<(String, String)> = conn
                    .query_row(
                        "SELECT structure, expires_at FROM table_schemas WHERE table_id = ?1",
                        params![table_id],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()
                    .map_err(GridError::from)?;
                let Some((structure, expires_at)) = row else {
                    return Ok(SchemaLookup::NotFound);
                };
                let fields: Vec<FieldDescriptor> = serde_json::from_str(&structure).map_err(GridError::from)?;
                let expires_at: DateTime<Utc> = expires_at
                    .parse()
                    .map_err(|e: chrono::ParseError| GridError::Other(e.to_string()))?;
                if Utc::now() < expires_at {
                    Ok(SchemaLookup::Valid(fields))
                } else {
                    Ok(SchemaLookup::Expired(fields))
                }
            })
            .await
    }

    // -- records ----------------------------------------------------------

    /// Bulk upsert. If the incoming schema differs structurally (any field
    /// added, removed, or re-typed — not merely reordered) from the schema
    /// the last populate recorded, all existing rows for the table are
    /// atomically cleared before the new rows land.
    pub async fn put_records(
        &self,
        table_id: &str,
        schema: &[FieldDescriptor],
        records: &[Record],
        ttl_seconds: i64,
    ) -> Result<()> {
        let table_id = table_id.to_string();
        let schema_hash = schema_fingerprint(schema);
        let rows: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.id.clone(), serde_json::to_string(&r.data).unwrap_or_default()))
            .collect();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds.max(1));

        self.pool
            .run_with_retry(move |conn| {
                let tx = conn.unchecked_transaction().map_err(GridError::from)?;

                let previous_hash: Option<String> = tx
                    .query_row(
                        "SELECT schema_hash FROM record_cache_state WHERE table_id = ?1",
                        params![table_id],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(GridError::from)?;

                if previous_hash.as_deref() != Some(schema_hash.as_str()) {
                    tx.execute("DELETE FROM records WHERE table_id = ?1", params![table_id])
                        .map_err(GridError::from)?;
                }

                tx.execute(
                    "INSERT INTO record_cache_state (table_id, schema_hash, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (table_id) DO UPDATE SET
                        schema_hash = excluded.schema_hash,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![table_id, schema_hash, now.to_rfc3339(), expires_at.to_rfc3339()],
                )
                .map_err(GridError::from)?;

                for (record_id, data) in &rows {
                    tx.execute(
                        "INSERT INTO records (table_id, record_id, data, cached_at, expires_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT (table_id, record_id) DO UPDATE SET
                            data = excluded.data,
                            cached_at = excluded.cached_at,
                            expires_at = excluded.expires_at",
                        params![table_id, record_id, data, now.to_rfc3339(), expires_at.to_rfc3339()],
                    )
                    .map_err(GridError::from)?;
                }

                tx.commit().map_err(GridError::from)?;
                Ok(())
            })
            .await
    }

    /// Single-record upsert that does not compare schemas — used to
    /// reflect mutation responses (write-through).
    pub async fn put_record(&self, table_id: &str, record: &Record, ttl_seconds: i64) -> Result<()> {
        let table_id = table_id.to_string();
        let record_id = record.id.clone();
        let data = serde_json::to_string(&record.data).map_err(GridError::from)?;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds.max(1));
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO records (table_id, record_id, data, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (table_id, record_id) DO UPDATE SET
                        data = excluded.data,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![table_id, record_id, data, now.to_rfc3339(), expires_at.to_rfc3339()],
                )
                .map_err(GridError::from)?;
                Ok(())
            })
            .await
    }

    /// Single-record lookup, independent of the table's overall filter
    /// path — used by the executor's single-record fetch.
    pub async fn get_record(&self, table_id: &str, record_id: &str) -> Result<Option<Record>> {
        let table_id = table_id.to_string();
        let record_id = record_id.to_string();
        self.pool
            .run(move |conn| {
                let data: Option<String> = conn
                    .query_row(
                        "SELECT data FROM records WHERE table_id = ?1 AND record_id = ?2",
                        params![table_id, record_id],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(GridError::from)?;
                match data {
                    Some(data) => {
                        let data = serde_json::from_str(&data).map_err(GridError::from)?;
                        Ok(Some(Record { id: record_id, table_id, data }))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn get_records(
        &self,
        table_id: &str,
        filter: &CompiledFilter,
        sort: &[SortKey],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<RecordsLookup> {
        let table_id = table_id.to_string();
        let where_sql = filter.sql.clone();
        let params_vec = filter.params.clone();
        let order_sql = order_by_clause(sort);
        let limit = limit.unwrap_or(u32::MAX) as i64;
        let offset = offset.unwrap_or(0) as i64;

        self.pool
            .run(move |conn| {
                let valid: Option<String> = conn
                    .query_row(
                        "SELECT expires_at FROM record_cache_state WHERE table_id = ?1",
                        params![table_id],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(GridError::from)?;
                let Some(expires_at) = valid else {
                    return Ok(RecordsLookup::CacheInvalid);
                };
                let expires_at: DateTime<Utc> = expires_at
                    .parse()
                    .map_err(|e: chrono::ParseError| GridError::Other(e.to_string()))?;
                if Utc::now() >= expires_at {
                    return Ok(RecordsLookup::CacheInvalid);
                }

                let total_count: i64 = conn
                    .query_row(
                        "SELECT count(*) FROM records WHERE table_id = ?1",
                        params![table_id],
                        |r| r.get(0),
                    )
                    .map_err(GridError::from)?;

                let count_sql = format!(
                    "SELECT count(*) FROM records WHERE table_id = ? AND ({})",
                    where_sql
                );
                let mut count_stmt = conn.prepare(&count_sql).map_err(GridError::from)?;
                let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&table_id];
                for p in &params_vec {
                    bind.push(p);
                }
                let filtered_count: i64 = count_stmt
                    .query_row(bind.as_slice(), |r| r.get(0))
                    .map_err(GridError::from)?;

                let select_sql = format!(
                    "SELECT record_id, data FROM records WHERE table_id = ? AND ({}) {} LIMIT ? OFFSET ?",
                    where_sql,
                    order_sql,
                );
                let mut stmt = conn.prepare(&select_sql).map_err(GridError::from)?;
                let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&table_id];
                for p in &params_vec {
                    bind.push(p);
                }
                bind.push(&limit);
                bind.push(&offset);

                let rows = stmt
                    .query_map(bind.as_slice(), |r| {
                        let record_id: String = r.get(0)?;
                        let data: String = r.get(1)?;
                        Ok((record_id, data))
                    })
                    .map_err(GridError::from)?;

                let mut out = Vec::new();
                for row in rows {
                    let (record_id, data) = row.map_err(GridError::from)?;
                    let data = serde_json::from_str(&data).map_err(GridError::from)?;
                    out.push(Record { id: record_id, table_id: table_id.clone(), data });
                }

                Ok(RecordsLookup::Rows {
                    rows: out,
                    total_count: total_count.max(0) as u64,
                    filtered_count: filtered_count.max(0) as u64,
                })
            })
            .await
    }

    // -- invalidation -------------------------------------------------

    pub async fn invalidate(&self, req: InvalidateRequest) -> Result<()> {
        self.pool
            .run(move |conn| {
                let tx = conn.unchecked_transaction().map_err(GridError::from)?;
                apply_invalidation(&tx, &req)?;
                tx.commit().map_err(GridError::from)?;
                Ok(())
            })
            .await
    }

    pub async fn status(&self) -> Result<CacheStatus> {
        self.pool
            .run(|conn| {
                let mut entities = Vec::new();
                let mut stmt = conn
                    .prepare("SELECT kind, count(*), min(expires_at) FROM entities GROUP BY kind")
                    .map_err(GridError::from)?;
                let rows = stmt
                    .query_map([], |r| {
                        let kind: String = r.get(0)?;
                        let count: i64 = r.get(1)?;
                        let next: Option<String> = r.get(2)?;
                        Ok((kind, count, next))
                    })
                    .map_err(GridError::from)?;
                for row in rows {
                    let (kind, count, next) = row.map_err(GridError::from)?;
                    let Ok(kind) = kind.parse::<EntityKind>() else { continue };
                    let next_expiry = next.and_then(|n| n.parse().ok());
                    entities.push(EntityClassStatus { kind, count: count.max(0) as u64, next_expiry });
                }

                let mut tables = Vec::new();
                let mut stmt = conn
                    .prepare("SELECT table_id, count(*), min(expires_at) FROM records GROUP BY table_id")
                    .map_err(GridError::from)?;
                let rows = stmt
                    .query_map([], |r| {
                        let table_id: String = r.get(0)?;
                        let count: i64 = r.get(1)?;
                        let next: Option<String> = r.get(2)?;
                        Ok((table_id, count, next))
                    })
                    .map_err(GridError::from)?;
                for row in rows {
                    let (table_id, count, next) = row.map_err(GridError::from)?;
                    let next_expiry = next.and_then(|n| n.parse().ok());
                    tables.push(TableRecordStatus { table_id, count: count.max(0) as u64, next_expiry });
                }

                Ok(CacheStatus { entities, tables })
            })
            .await
    }
}

/// Schema structurally fingerprinted by its `(slug, field_type)` set,
/// independent of declaration order — reordering fields is not a
/// structural change.
fn schema_fingerprint(schema: &[FieldDescriptor]) -> String {
    let mut pairs: Vec<String> = schema
        .iter()
        .map(|f| format!("{}:{}", f.slug, f.field_type))
        .collect();
    pairs.sort();
    let mut hasher = Sha256::new();
    hasher.update(pairs.join("|").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn apply_invalidation(conn: &rusqlite::Connection, req: &InvalidateRequest) -> Result<()> {
    match req.kind {
        EntityKind::Solution => {
            match &req.id {
                Some(id) => {
                    conn.execute(
                        "DELETE FROM entities WHERE kind = 'solution' AND id = ?1",
                        params![id],
                    )
                    .map_err(GridError::from)?;
                }
                None => {
                    conn.execute("DELETE FROM entities WHERE kind = 'solution'", [])
                        .map_err(GridError::from)?;
                }
            }
            conn.execute("DELETE FROM entities WHERE kind = 'table'", [])
                .map_err(GridError::from)?;
            conn.execute("DELETE FROM table_schemas", []).map_err(GridError::from)?;
            conn.execute("DELETE FROM record_cache_state", []).map_err(GridError::from)?;
            conn.execute("DELETE FROM records", []).map_err(GridError::from)?;
        }
        EntityKind::Table => {
            if let Some(table_id) = &req.id {
                invalidate_one_table(conn, table_id, req.structure_changed)?;
                conn.execute(
                    "DELETE FROM entities WHERE kind = 'table' AND id = ?1",
                    params![table_id],
                )
                .map_err(GridError::from)?;
            } else if let Some(solution_id) = &req.solution_id {
                let table_ids = tables_for_solution(conn, solution_id)?;
                for table_id in table_ids {
                    invalidate_one_table(conn, &table_id, req.structure_changed)?;
                    conn.execute(
                        "DELETE FROM entities WHERE kind = 'table' AND id = ?1",
                        params![table_id],
                    )
                    .map_err(GridError::from)?;
                }
            } else {
                conn.execute("DELETE FROM entities WHERE kind = 'table'", [])
                    .map_err(GridError::from)?;
                conn.execute("DELETE FROM table_schemas", []).map_err(GridError::from)?;
                conn.execute("DELETE FROM record_cache_state", []).map_err(GridError::from)?;
                conn.execute("DELETE FROM records", []).map_err(GridError::from)?;
            }
        }
        EntityKind::DeletedRecord => {
            match &req.id {
                Some(id) => {
                    conn.execute(
                        "DELETE FROM entities WHERE kind = 'deleted_record' AND id = ?1",
                        params![id],
                    )
                    .map_err(GridError::from)?;
                }
                None => {
                    conn.execute("DELETE FROM entities WHERE kind = 'deleted_record'", [])
                        .map_err(GridError::from)?;
                }
            }
        }
        // Members/teams never touch record data.
        EntityKind::Member | EntityKind::Team | EntityKind::View => {
            let kind_str = req.kind.to_string();
            match &req.id {
                Some(id) => {
                    conn.execute(
                        "DELETE FROM entities WHERE kind = ?1 AND id = ?2",
                        params![kind_str, id],
                    )
                    .map_err(GridError::from)?;
                }
                None => {
                    conn.execute("DELETE FROM entities WHERE kind = ?1", params![kind_str])
                        .map_err(GridError::from)?;
                }
            }
        }
    }
    Ok(())
}

fn tables_for_solution(conn: &rusqlite::Connection, solution_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM entities WHERE kind = 'table' AND json_extract(payload, '$.solution_id') = ?1")
        .map_err(GridError::from)?;
    let rows = stmt
        .query_map(params![solution_id], |r| r.get::<_, String>(0))
        .map_err(GridError::from)?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.map_err(GridError::from)?);
    }
    Ok(ids)
}

/// `structure_changed = true` deletes rows outright (*absent* state);
/// `false` only expires the record-cache-state row so the next read
/// refetches without losing the other table metadata.
fn invalidate_one_table(conn: &rusqlite::Connection, table_id: &str, structure_changed: bool) -> Result<()> {
    if structure_changed {
        conn.execute("DELETE FROM records WHERE table_id = ?1", params![table_id])
            .map_err(GridError::from)?;
        conn.execute("DELETE FROM record_cache_state WHERE table_id = ?1", params![table_id])
            .map_err(GridError::from)?;
        conn.execute("DELETE FROM table_schemas WHERE table_id = ?1", params![table_id])
            .map_err(GridError::from)?;
    } else {
        conn.execute(
            "UPDATE record_cache_state SET expires_at = ?1 WHERE table_id = ?2",
            params![Utc::now().to_rfc3339(), table_id],
        )
        .map_err(GridError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterNode;
    use crate::registry::FieldType;

    fn field(slug: &str, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor {
            slug: slug.to_string(),
            label: slug.to_string(),
            field_type,
            params: Default::default(),
        }
    }

    fn record(id: &str, table_id: &str, data: Vec<(&str, Value)>) -> Record {
        Record {
            id: id.to_string(),
            table_id: table_id.to_string(),
            data: data.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn match_all() -> CompiledFilter {
        CompiledFilter { sql: "1".to_string(), params: Vec::new() }
    }

    #[tokio::test]
    async fn put_entity_then_get_entity_round_trips() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let payload = serde_json::json!({"id": "sol-1", "name": "Acme"});
        store.put_entity(EntityKind::Solution, "sol-1", &payload, 60).await.unwrap();
        match store.get_entity(EntityKind::Solution, "sol-1").await.unwrap() {
            EntityLookup::Valid(p) => assert_eq!(p, payload),
            _ => panic!("expected valid entity"),
        }
    }

    #[tokio::test]
    async fn get_entity_missing_is_not_found() {
        let store = CacheStore::open_in_memory().await.unwrap();
        matches!(
            store.get_entity(EntityKind::Solution, "missing").await.unwrap(),
            EntityLookup::NotFound
        );
    }

    #[tokio::test]
    async fn schema_change_clears_records_atomically() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let old_schema = vec![field("a", FieldType::Text), field("b", FieldType::Number)];
        let records: Vec<Record> = (0..5)
            .map(|i| record(&format!("r{i}"), "t1", vec![("a", Value::from("x")), ("b", Value::from(i))]))
            .collect();
        store.put_records("t1", &old_schema, &records, 60).await.unwrap();

        let new_schema = vec![field("a", FieldType::Text), field("c", FieldType::YesNo)];
        store.put_records("t1", &new_schema, &[], 60).await.unwrap();

        match store.get_records("t1", &match_all(), &[], None, None).await.unwrap() {
            RecordsLookup::Rows { rows, .. } => assert!(rows.is_empty()),
            RecordsLookup::CacheInvalid => panic!("cache should still be valid, just empty"),
        }

        let new_record = record("r-new", "t1", vec![("a", Value::from("y")), ("c", Value::from(1))]);
        store.put_records("t1", &new_schema, std::slice::from_ref(&new_record), 60).await.unwrap();
        match store.get_records("t1", &match_all(), &[], None, None).await.unwrap() {
            RecordsLookup::Rows { rows, .. } => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].data.get("c"), Some(&Value::from(1)));
            }
            RecordsLookup::CacheInvalid => panic!("expected one row"),
        }
    }

    #[tokio::test]
    async fn reordered_schema_is_not_a_structural_change() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let schema_a = vec![field("a", FieldType::Text), field("b", FieldType::Number)];
        let schema_b = vec![field("b", FieldType::Number), field("a", FieldType::Text)];
        let r = record("r1", "t1", vec![("a", Value::from("x")), ("b", Value::from(1))]);
        store.put_records("t1", &schema_a, std::slice::from_ref(&r), 60).await.unwrap();
        store.put_records("t1", &schema_b, &[], 60).await.unwrap();
        match store.get_records("t1", &match_all(), &[], None, None).await.unwrap() {
            RecordsLookup::Rows { rows, .. } => assert_eq!(rows.len(), 1, "reordering must not clear records"),
            RecordsLookup::CacheInvalid => panic!("expected valid cache"),
        }
    }

    #[tokio::test]
    async fn get_records_on_never_populated_table_is_cache_invalid() {
        let store = CacheStore::open_in_memory().await.unwrap();
        matches!(
            store.get_records("never-seen", &match_all(), &[], None, None).await.unwrap(),
            RecordsLookup::CacheInvalid
        );
    }

    #[tokio::test]
    async fn invalidate_solutions_clears_everything() {
        let store = CacheStore::open_in_memory().await.unwrap();
        for sol in ["s1", "s2"] {
            store
                .put_entity(EntityKind::Solution, sol, &serde_json::json!({"id": sol}), 60)
                .await
                .unwrap();
        }
        for (table, sol) in [("t1", "s1"), ("t2", "s1"), ("t3", "s2"), ("t4", "s2")] {
            store
                .put_entity(EntityKind::Table, table, &serde_json::json!({"id": table, "solution_id": sol}), 60)
                .await
                .unwrap();
            let schema = vec![field("a", FieldType::Text)];
            let records: Vec<Record> = (0..25)
                .map(|i| record(&format!("{table}-r{i}"), table, vec![("a", Value::from("x"))]))
                .collect();
            store.put_records(table, &schema, &records, 60).await.unwrap();
        }

        store
            .invalidate(InvalidateRequest {
                kind: EntityKind::Solution,
                id: None,
                solution_id: None,
                structure_changed: true,
            })
            .await
            .unwrap();

        let status = store.status().await.unwrap();
        assert!(status.entities.is_empty());
        assert!(status.tables.is_empty());
    }

    #[tokio::test]
    async fn invalidate_tables_scoped_to_one_solution_leaves_the_other() {
        let store = CacheStore::open_in_memory().await.unwrap();
        for (table, sol) in [("t1", "s1"), ("t2", "s2")] {
            store
                .put_entity(EntityKind::Table, table, &serde_json::json!({"id": table, "solution_id": sol}), 60)
                .await
                .unwrap();
            let schema = vec![field("a", FieldType::Text)];
            let r = record(&format!("{table}-r0"), table, vec![("a", Value::from("x"))]);
            store.put_records(table, &schema, std::slice::from_ref(&r), 60).await.unwrap();
        }

        store
            .invalidate(InvalidateRequest {
                kind: EntityKind::Table,
                id: None,
                solution_id: Some("s1".to_string()),
                structure_changed: true,
            })
            .await
            .unwrap();

        matches!(
            store.get_records("t1", &match_all(), &[], None, None).await.unwrap(),
            RecordsLookup::CacheInvalid
        );
        match store.get_records("t2", &match_all(), &[], None, None).await.unwrap() {
            RecordsLookup::Rows { rows, .. } => assert_eq!(rows.len(), 1),
            RecordsLookup::CacheInvalid => panic!("t2 must be unaffected"),
        }
    }

    #[tokio::test]
    async fn invalidate_without_structure_change_expires_rather_than_deletes() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let schema = vec![field("a", FieldType::Text)];
        let r = record("r1", "t1", vec![("a", Value::from("x"))]);
        store.put_records("t1", &schema, std::slice::from_ref(&r), 60).await.unwrap();

        store
            .invalidate(InvalidateRequest {
                kind: EntityKind::Table,
                id: Some("t1".to_string()),
                solution_id: None,
                structure_changed: false,
            })
            .await
            .unwrap();

        matches!(
            store.get_records("t1", &match_all(), &[], None, None).await.unwrap(),
            RecordsLookup::CacheInvalid
        );
    }

    #[tokio::test]
    async fn filter_and_group_returns_matching_rows() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let schema = vec![
            field("status", FieldType::Status),
            field("priority", FieldType::SingleSelect),
            field("tags", FieldType::MultiSelect),
        ];
        let rows = vec![
            record(
                "r1",
                "t1",
                vec![
                    ("status", serde_json::json!({"value": "active"})),
                    ("priority", Value::from("high")),
                    ("tags", serde_json::json!(["urgent", "bug"])),
                ],
            ),
            record(
                "r2",
                "t1",
                vec![
                    ("status", serde_json::json!({"value": "inactive"})),
                    ("priority", Value::from("low")),
                    ("tags", serde_json::json!(["docs"])),
                ],
            ),
            record(
                "r3",
                "t1",
                vec![
                    ("status", serde_json::json!({"value": "active"})),
                    ("priority", Value::from("low")),
                    ("tags", serde_json::json!(["urgent"])),
                ],
            ),
        ];
        store.put_records("t1", &schema, &rows, 60).await.unwrap();

        struct Lookup;
        impl crate::filter::FieldTypeLookup for Lookup {
            fn field_type(&self, slug: &str) -> Option<FieldType> {
                match slug {
                    "status" => Some(FieldType::Status),
                    "tags" => Some(FieldType::MultiSelect),
                    _ => None,
                }
            }
        }
        let node = FilterNode::and(vec![
            FilterNode::predicate("status", crate::filter::Operator::Is, Value::from("active")),
            FilterNode::predicate("tags", crate::filter::Operator::HasAnyOf, serde_json::json!(["urgent"])),
        ]);
        let mut collector = crate::filter::WarningCollector::enter();
        let today = chrono::NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let compiled = crate::filter::compiler::compile(&node, &Lookup, false, today, &mut collector);

        match store.get_records("t1", &compiled, &[], None, None).await.unwrap() {
            RecordsLookup::Rows { rows, total_count, filtered_count } => {
                assert_eq!(total_count, 3);
                assert_eq!(filtered_count, 2);
                let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
                assert!(ids.contains(&"r1"));
                assert!(ids.contains(&"r3"));
                assert!(!ids.contains(&"r2"));
            }
            RecordsLookup::CacheInvalid => panic!("expected valid cache"),
        }
    }
}
