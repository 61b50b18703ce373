// src/cache/mod.rs
// Cache Store (C6): persistent entity/table-schema/record storage over
// SQLite via deadpool-sqlite.

pub mod pool;
pub mod schema;
pub mod store;

pub use store::{
    CacheStatus, CacheStore, EntityClassStatus, EntityLookup, InvalidateRequest, RecordsLookup,
    SchemaLookup, TableRecordStatus,
};
