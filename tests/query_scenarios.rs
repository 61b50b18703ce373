// tests/query_scenarios.rs
// End-to-end scenarios against the cache + filter compiler that don't
// fit naturally as unit tests of a single module.

use std::collections::HashMap;

use chrono::NaiveDate;
use gridcache::cache::CacheStore;
use gridcache::entities::{FieldDescriptor, Record};
use gridcache::filter::compiler::{self, FieldTypeLookup};
use gridcache::filter::tree::{FilterNode, GroupOperator, Operator, Predicate};
use gridcache::filter::WarningCollector;
use gridcache::registry::FieldType;
use gridcache::sort::SortKey;
use serde_json::json;

struct Lookup(Vec<(&'static str, FieldType)>);

impl FieldTypeLookup for Lookup {
    fn field_type(&self, slug: &str) -> Option<FieldType> {
        self.0.iter().find(|(s, _)| *s == slug).map(|(_, t)| *t)
    }
}

fn field(slug: &str, field_type: FieldType) -> FieldDescriptor {
    FieldDescriptor { slug: slug.to_string(), label: slug.to_string(), field_type, params: Default::default() }
}

fn record(id: &str, table_id: &str, data: serde_json::Value) -> Record {
    let data: HashMap<String, serde_json::Value> = serde_json::from_value(data).unwrap();
    Record { id: id.to_string(), table_id: table_id.to_string(), data }
}

/// S2: `due_date is_before {date_mode: today}` excludes records whose
/// due date is absent, and excludes dates on or after the pivot.
#[tokio::test]
async fn due_date_is_before_today_excludes_absent_and_future_dates() {
    let store = CacheStore::open_in_memory().await.unwrap();
    let schema = vec![field("due_date", FieldType::DueDate)];

    let records = vec![
        record("r1", "tasks", json!({ "due_date": { "to_date": { "date": "2024-06-15" } } })),
        record("r2", "tasks", json!({ "due_date": { "to_date": { "date": "2025-01-01" } } })),
        record("r3", "tasks", json!({})),
    ];
    store.put_records("tasks", &schema, &records, 3600).await.unwrap();

    let lookup = Lookup(vec![("due_date", FieldType::DueDate)]);
    let today = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    let node = FilterNode::Predicate(Predicate {
        field: "due_date".to_string(),
        comparison: Operator::IsBefore,
        value: json!({ "date_mode": "today" }),
    });
    let compiled = compiler::compile(&node, &lookup, false, today, &mut WarningCollector::enter());

    let outcome = store.get_records("tasks", &compiled, &[], None, None).await.unwrap();
    let rows = match outcome {
        gridcache::cache::RecordsLookup::Rows { rows, total_count, filtered_count } => {
            assert_eq!(total_count, 3);
            assert_eq!(filtered_count, 1);
            rows
        }
        gridcache::cache::RecordsLookup::CacheInvalid => panic!("cache should be valid"),
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "r1");
}

/// Boundary behaviour: zero-row, single-row, and over-the-paging-limit
/// tables all report accurate counts.
#[tokio::test]
async fn paging_counts_are_accurate_at_every_table_size() {
    let store = CacheStore::open_in_memory().await.unwrap();
    let schema = vec![field("name", FieldType::Text)];
    let lookup = Lookup(vec![("name", FieldType::Text)]);
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let match_all = compiler::compile(
        &FilterNode::Group { operator: GroupOperator::And, fields: vec![] },
        &lookup,
        false,
        today,
        &mut WarningCollector::enter(),
    );

    // Zero rows.
    store.put_records("empty_table", &schema, &[], 3600).await.unwrap();
    match store.get_records("empty_table", &match_all, &[], Some(10), Some(0)).await.unwrap() {
        gridcache::cache::RecordsLookup::Rows { rows, total_count, filtered_count } => {
            assert_eq!(rows.len(), 0);
            assert_eq!(total_count, 0);
            assert_eq!(filtered_count, 0);
        }
        gridcache::cache::RecordsLookup::CacheInvalid => panic!("should be valid even with zero rows"),
    }

    // Single row.
    store
        .put_records("one_table", &schema, &[record("r1", "one_table", json!({"name": "a"}))], 3600)
        .await
        .unwrap();
    match store.get_records("one_table", &match_all, &[], Some(10), Some(0)).await.unwrap() {
        gridcache::cache::RecordsLookup::Rows { rows, total_count, filtered_count } => {
            assert_eq!(rows.len(), 1);
            assert_eq!(total_count, 1);
            assert_eq!(filtered_count, 1);
        }
        gridcache::cache::RecordsLookup::CacheInvalid => panic!("should be valid"),
    }

    // More rows than the page limit.
    let many: Vec<Record> = (0..25)
        .map(|i| record(&format!("r{i}"), "big_table", json!({"name": format!("n{i}")})))
        .collect();
    store.put_records("big_table", &schema, &many, 3600).await.unwrap();
    let sort = vec![SortKey { field: "name".to_string(), direction: gridcache::sort::SortDirection::Asc }];
    match store.get_records("big_table", &match_all, &sort, Some(10), Some(0)).await.unwrap() {
        gridcache::cache::RecordsLookup::Rows { rows, total_count, filtered_count } => {
            assert_eq!(rows.len(), 10);
            assert_eq!(total_count, 25);
            assert_eq!(filtered_count, 25);
        }
        gridcache::cache::RecordsLookup::CacheInvalid => panic!("should be valid"),
    }
}

/// Two successive invalidate(X) calls are equivalent to one.
#[tokio::test]
async fn repeated_invalidate_is_idempotent() {
    let store = CacheStore::open_in_memory().await.unwrap();
    let schema = vec![field("name", FieldType::Text)];
    store
        .put_records("t1", &schema, &[record("r1", "t1", json!({"name": "a"}))], 3600)
        .await
        .unwrap();

    let req = gridcache::cache::InvalidateRequest {
        kind: gridcache::entities::EntityKind::Table,
        id: Some("t1".to_string()),
        solution_id: None,
        structure_changed: true,
    };
    store.invalidate(req.clone()).await.unwrap();
    store.invalidate(req).await.unwrap();

    let status = store.status().await.unwrap();
    assert!(status.tables.is_empty());
}
