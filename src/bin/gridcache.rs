// src/bin/gridcache.rs
// Thin CLI entry point: wires Config, CacheStore, and QueryExecutor
// together and runs either the JSON-RPC-over-stdio serve loop or one of
// the cache-status control commands.
//
// Subcommand layout grounded in `cli/mod.rs`; stdio framing grounded in
// `mcp/protocol.rs` and `mcp/transport.rs`.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use gridcache::cache::InvalidateRequest;
use gridcache::config::{Config, TableTtlOverrides};
use gridcache::entities::EntityKind;
use gridcache::error::GridError;
use gridcache::filter::{FilterNode, ValidationWarning};
use gridcache::response::{self, OutputFormat, ShapeRequest};
use gridcache::sort::SortKey;
use gridcache::upstream::{TableRecordsFetch, UpstreamCollaborator};
use gridcache::{CacheStore, QueryExecutor};

#[derive(Parser)]
#[command(name = "gridcache")]
#[command(about = "Cache and filter engine for a remote record-management backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the JSON-RPC-over-stdio server loop (default production mode).
    Serve {
        #[arg(long, env = "GRIDCACHE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print cache occupancy: per-entity-kind and per-table counts and
    /// next-expiry timestamps.
    Status {
        #[arg(long, env = "GRIDCACHE_CACHE_PATH", default_value = "gridcache.sqlite3")]
        db: PathBuf,
    },

    /// Force-invalidate a slice of the cache.
    Invalidate {
        #[arg(long, env = "GRIDCACHE_CACHE_PATH", default_value = "gridcache.sqlite3")]
        db: PathBuf,

        /// solution | table | member | team | view | deleted_record
        #[arg(long)]
        kind: String,

        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        solution_id: Option<String>,

        #[arg(long)]
        structure_changed: bool,
    },

    /// Set a per-table TTL override and exit (demonstrates the control
    /// surface; a running `serve` process would carry this as a live
    /// JSON-RPC request instead).
    SetTtl {
        #[arg(long)]
        table_id: String,

        #[arg(long)]
        seconds: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => run_serve(config).await,
        Commands::Status { db } => run_status(db).await,
        Commands::Invalidate { db, kind, id, solution_id, structure_changed } => {
            run_invalidate(db, kind, id, solution_id, structure_changed).await
        }
        Commands::SetTtl { table_id, seconds } => {
            let overrides = TableTtlOverrides::default();
            overrides.set(table_id.clone(), seconds);
            println!("table {table_id} ttl override set to {seconds}s for this process only");
            Ok(())
        }
    }
}

async fn run_status(db: PathBuf) -> Result<()> {
    let store = CacheStore::open(&db).await?;
    let status = store.status().await?;
    println!("{}", serde_json::to_string_pretty(&json!({
        "entities": status.entities.iter().map(|e| json!({
            "kind": e.kind.to_string(),
            "count": e.count,
            "next_expiry": e.next_expiry,
        })).collect::<Vec<_>>(),
        "tables": status.tables.iter().map(|t| json!({
            "table_id": t.table_id,
            "count": t.count,
            "next_expiry": t.next_expiry,
        })).collect::<Vec<_>>(),
    }))?);
    Ok(())
}

async fn run_invalidate(
    db: PathBuf,
    kind: String,
    id: Option<String>,
    solution_id: Option<String>,
    structure_changed: bool,
) -> Result<()> {
    let kind: EntityKind = kind.parse().map_err(|_| anyhow::anyhow!("unknown entity kind: {kind}"))?;
    let store = CacheStore::open(&db).await?;
    store
        .invalidate(InvalidateRequest { kind, id, solution_id, structure_changed })
        .await?;
    println!("invalidated");
    Ok(())
}

/// No remote record-management backend ships with this crate; `serve`
/// runs against this stand-in until a real `UpstreamCollaborator` is
/// wired in by an embedder.
struct UnconfiguredUpstream;

#[async_trait::async_trait]
impl UpstreamCollaborator for UnconfiguredUpstream {
    async fn fetch_table_records(&self, table_id: &str) -> gridcache::error::Result<TableRecordsFetch> {
        Err(GridError::Upstream(format!("no upstream collaborator configured (table {table_id})")))
    }

    async fn fetch_entity(&self, _kind: EntityKind, id: &str) -> gridcache::error::Result<Option<Value>> {
        Err(GridError::Upstream(format!("no upstream collaborator configured (entity {id})")))
    }

    async fn fetch_list(&self, _kind: EntityKind, _filters: Option<Value>) -> gridcache::error::Result<Vec<Value>> {
        Err(GridError::Upstream("no upstream collaborator configured".to_string()))
    }

    async fn mutate_record(&self, table_id: &str, record_id: &str, _patch: Value) -> gridcache::error::Result<gridcache::entities::Record> {
        Err(GridError::Upstream(format!("no upstream collaborator configured ({table_id}/{record_id})")))
    }
}

async fn run_serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = Arc::new(Config::load(config_path.as_deref())?);
    let store = Arc::new(CacheStore::open(&config.cache_path).await?);
    let ttl_overrides = Arc::new(TableTtlOverrides::default());
    let upstream: Arc<dyn UpstreamCollaborator> = Arc::new(UnconfiguredUpstream);
    let executor = QueryExecutor::new(store, upstream, config, ttl_overrides);

    tracing::info!("gridcache serving JSON-RPC requests over stdio");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_request(&executor, &line).await;
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

async fn handle_request(executor: &QueryExecutor, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return rpc_error(Value::Null, -32700, format!("parse error: {e}")),
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "list_records" => dispatch_list(executor, &params).await,
        "get_record" => dispatch_get(executor, &params).await,
        _ => Err(GridError::Validation(format!("unknown method: {method}"))),
    };

    match result {
        Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
        Err(e) => rpc_error(id, -32000, e.to_string()),
    }
}

async fn dispatch_list(executor: &QueryExecutor, params: &Value) -> gridcache::error::Result<Value> {
    let table_id = params.get("table_id").and_then(Value::as_str).unwrap_or_default();
    let filter: Option<FilterNode> = params
        .get("filter")
        .and_then(|f| serde_json::from_value(f.clone()).ok());
    let sort: Vec<SortKey> = params
        .get("sort")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or_default();
    let limit = params.get("limit").and_then(Value::as_u64).map(|v| v as u32);
    let offset = params.get("offset").and_then(Value::as_u64).map(|v| v as u32);
    let bypass_cache = params.get("bypass_cache").and_then(Value::as_bool).unwrap_or(false);
    let fields: Vec<String> = params
        .get("fields")
        .and_then(|f| serde_json::from_value(f.clone()).ok())
        .unwrap_or_default();
    let format = match params.get("format").and_then(Value::as_str) {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Tabular,
    };

    let outcome = executor.list(table_id, filter.as_ref(), &sort, limit, offset, bypass_cache).await?;
    let schema = executor.table_schema(table_id).await?;

    let mut warnings = outcome.warnings;
    warnings.extend(response::large_content_warnings(&fields, &schema).into_iter().map(|message| ValidationWarning {
        field: String::new(),
        message,
        suggestion: None,
    }));

    let shape_request = ShapeRequest {
        fields: &fields,
        timezone: &executor.config().timezone,
        format,
        total_count: outcome.total_count,
        filtered_count: outcome.filtered_count,
    };
    let shaped = response::shape(&outcome.rows, &schema, &warnings, &shape_request);

    Ok(json!({ "shaped": shaped }))
}

async fn dispatch_get(executor: &QueryExecutor, params: &Value) -> gridcache::error::Result<Value> {
    let table_id = params.get("table_id").and_then(Value::as_str).unwrap_or_default();
    let record_id = params.get("record_id").and_then(Value::as_str).unwrap_or_default();
    let bypass_cache = params.get("bypass_cache").and_then(Value::as_bool).unwrap_or(false);
    let record = executor.get(table_id, record_id, bypass_cache).await?;
    Ok(json!({ "record": record }))
}

fn rpc_error(id: Value, code: i32, message: String) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}
