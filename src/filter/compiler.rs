// src/filter/compiler.rs
// Filter Compiler (C5): walks the filter tree and emits a parameterised
// SQL condition plus bound parameters, targeting the cache store's
// JSON-valued `data` column. Runs inside C4 validation and C2 date
// resolution.

use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;

use crate::date_mode::{self, DateValue};
use crate::filter::tree::{FilterNode, GroupOperator, Operator, Predicate};
use crate::filter::validator::{self, ValidationOutcome, WarningCollector};
use crate::registry::{self, FieldType, StorageCategory};

/// A column `data -> '$.slug'` expression plus the bound parameters
/// needed to evaluate it, ready to splice into a `WHERE` clause.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl CompiledFilter {
    fn literal(sql: impl Into<String>) -> Self {
        CompiledFilter {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn is_false_literal(&self) -> bool {
        self.sql == "0"
    }
}

/// Compile-time lookup for one field: its declared type, used to route
/// compilation into the right family and to validate the operator.
pub trait FieldTypeLookup {
    fn field_type(&self, slug: &str) -> Option<FieldType>;
}

/// Field names are sanitised to alphanumerics+underscore before splicing
/// into the `json_extract` path; only values are parameterised.
fn sanitize_field(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn json_path(field: &str, suffix: &str) -> String {
    let clean = sanitize_field(field);
    if suffix.is_empty() {
        format!("json_extract(data, '$.{}')", clean)
    } else {
        format!("json_extract(data, '$.{}.{}')", clean, suffix)
    }
}

fn json_value_to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        JsonValue::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Compile a full filter tree. Returns `None` for an absent filter
/// (no predicate at all — caller should treat this as "match everything").
pub fn compile(
    node: &FilterNode,
    lookup: &dyn FieldTypeLookup,
    strict: bool,
    today: NaiveDate,
    collector: &mut WarningCollector,
) -> CompiledFilter {
    match node {
        FilterNode::Group { operator, fields } => {
            if fields.is_empty() {
                return match operator {
                    GroupOperator::And => CompiledFilter::literal("1"),
                    GroupOperator::Or => CompiledFilter::literal("0"),
                };
            }
            let joiner = match operator {
                GroupOperator::And => " AND ",
                GroupOperator::Or => " OR ",
            };
            let mut sql_parts = Vec::with_capacity(fields.len());
            let mut params = Vec::new();
            for child in fields {
                let compiled = compile(child, lookup, strict, today, collector);
                sql_parts.push(format!("({})", compiled.sql));
                params.extend(compiled.params);
            }
            CompiledFilter {
                sql: sql_parts.join(joiner),
                params,
            }
        }
        FilterNode::Predicate(pred) => compile_predicate(pred, lookup, strict, today, collector),
    }
}

fn compile_predicate(
    pred: &Predicate,
    lookup: &dyn FieldTypeLookup,
    strict: bool,
    today: NaiveDate,
    collector: &mut WarningCollector,
) -> CompiledFilter {
    let field_type = lookup.field_type(&pred.field);

    let outcome = validator::validate(&pred.field, pred.comparison, field_type, strict, collector);
    if outcome == ValidationOutcome::Fail {
        // Strict mode: caller (executor) turns this into a hard
        // `GridError::Validation`; compiling a literal-false keeps this
        // function infallible so validation stays the single source of
        // truth for the failure.
        return CompiledFilter::literal("0");
    }

    let Some(field_type) = field_type else {
        // Unknown/formula field type: cannot compile meaningfully, treat
        // as non-matching rather than guessing.
        return CompiledFilter::literal("0");
    };

    if field_type == FieldType::File {
        return compile_file(pred);
    }

    let info = registry::lookup(field_type);
    match info.storage {
        StorageCategory::ScalarText | StorageCategory::SystemReadonly | StorageCategory::NestedDocument => {
            compile_text(pred)
        }
        StorageCategory::ScalarNumeric => compile_numeric(pred),
        StorageCategory::ScalarBoolean => compile_yes_no(pred),
        StorageCategory::NestedDate | StorageCategory::NestedDateRange => compile_date(pred, today),
        StorageCategory::NestedDueDate => compile_due_date(pred, today),
        StorageCategory::NestedStatus => compile_status(pred),
        StorageCategory::ArrayOfScalars | StorageCategory::ArrayOfObjects => compile_array(pred),
    }
}

fn is_empty_clause(field: &str, array_aware: bool) -> String {
    let base = json_path(field, "");
    if array_aware {
        format!(
            "({base} IS NULL OR {base} = '' OR {base} = '[]' OR {base} = '{{}}')",
            base = base
        )
    } else {
        format!("({base} IS NULL OR {base} = '' OR {base} = '[]')", base = base)
    }
}

fn compile_text(pred: &Predicate) -> CompiledFilter {
    let path = json_path(&pred.field, "");
    match pred.comparison {
        Operator::IsEmpty => CompiledFilter::literal(is_empty_clause(&pred.field, false)),
        Operator::IsNotEmpty => {
            CompiledFilter::literal(format!("NOT {}", is_empty_clause(&pred.field, false)))
        }
        Operator::Contains => CompiledFilter {
            sql: format!("instr(lower({}), lower(?)) > 0", path),
            params: vec![json_value_to_sql(&pred.value)],
        },
        Operator::NotContains => CompiledFilter {
            sql: format!(
                "({path} IS NULL OR instr(lower({path}), lower(?)) = 0)",
                path = path
            ),
            params: vec![json_value_to_sql(&pred.value)],
        },
        Operator::Is => CompiledFilter {
            sql: format!("{} = ?", path),
            params: vec![json_value_to_sql(&pred.value)],
        },
        Operator::IsNot => CompiledFilter {
            sql: format!("({path} IS NULL OR {path} != ?)", path = path),
            params: vec![json_value_to_sql(&pred.value)],
        },
        _ => CompiledFilter::literal("0"),
    }
}

fn compile_numeric(pred: &Predicate) -> CompiledFilter {
    let path = json_path(&pred.field, "");
    let cast = format!("CAST({} AS REAL)", path);

    if matches!(pred.comparison, Operator::IsEmpty) {
        return CompiledFilter::literal(is_empty_clause(&pred.field, false));
    }
    if matches!(pred.comparison, Operator::IsNotEmpty) {
        return CompiledFilter::literal(format!("NOT {}", is_empty_clause(&pred.field, false)));
    }

    // A validator warning (non-strict mode) lets an operator foreign to
    // this family through; `contains` on a numeric field still has to
    // compile to *something* rather than silently dropping the clause, so
    // it falls back to a text search over the stringified column.
    if matches!(pred.comparison, Operator::Contains | Operator::NotContains) {
        let text = format!("CAST({} AS TEXT)", path);
        let hit = format!("instr(lower({}), lower(?)) > 0", text);
        let sql = if pred.comparison == Operator::Contains {
            hit
        } else {
            format!("({path} IS NULL OR NOT {hit})", path = path, hit = hit)
        };
        return CompiledFilter {
            sql,
            params: vec![json_value_to_sql(&pred.value)],
        };
    }

    let op = match pred.comparison {
        Operator::Is | Operator::IsEqualTo => "=",
        Operator::IsNot | Operator::IsNotEqualTo => "!=",
        Operator::IsGreaterThan => ">",
        Operator::IsLessThan => "<",
        Operator::IsEqualOrGreaterThan => ">=",
        Operator::IsEqualOrLessThan => "<=",
        _ => return CompiledFilter::literal("0"),
    };
    CompiledFilter {
        sql: format!("{path} IS NOT NULL AND {cast} {op} CAST(? AS REAL)", path = path, cast = cast, op = op),
        params: vec![json_value_to_sql(&pred.value)],
    }
}

fn compile_yes_no(pred: &Predicate) -> CompiledFilter {
    let path = json_path(&pred.field, "");
    CompiledFilter {
        sql: format!("CAST({} AS TEXT) = CAST(? AS TEXT)", path),
        params: vec![json_value_to_sql(&pred.value)],
    }
}

/// Extracts a `YYYY-MM-DD` prefix trying, in order, the nested
/// `field.to_date.date` path, then the field itself (only if it matches
/// the ISO calendar shape).
fn date_expr(field: &str) -> String {
    let nested = json_path(field, "to_date.date");
    let bare = json_path(field, "");
    format!(
        "COALESCE(NULLIF({nested}, ''), CASE WHEN {bare} GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]*' THEN substr({bare}, 1, 10) ELSE NULL END)",
        nested = nested,
        bare = bare,
    )
}

fn compile_date(pred: &Predicate, today: NaiveDate) -> CompiledFilter {
    let expr = date_expr(&pred.field);

    match pred.comparison {
        Operator::IsEmpty => CompiledFilter::literal(format!("{} IS NULL", expr)),
        Operator::IsNotEmpty => CompiledFilter::literal(format!("{} IS NOT NULL", expr)),
        _ => {
            let resolved = resolve_date_value(&pred.value, today);
            let op = match pred.comparison {
                Operator::Is => "=",
                Operator::IsNot => "!=",
                Operator::IsBefore => "<",
                Operator::IsAfter => ">",
                Operator::IsOnOrBefore => "<=",
                Operator::IsOnOrAfter => ">=",
                _ => return CompiledFilter::literal("0"),
            };
            CompiledFilter {
                sql: format!("{expr} IS NOT NULL AND {expr} {op} ?", expr = expr, op = op),
                params: vec![SqlValue::Text(resolved)],
            }
        }
    }
}

fn compile_due_date(pred: &Predicate, today: NaiveDate) -> CompiledFilter {
    if matches!(pred.comparison, Operator::IsOverdue | Operator::IsNotOverdue) {
        let expr = date_expr(&pred.field);
        let completed = json_path(&pred.field, "completed");
        let today_str = today.format("%Y-%m-%d").to_string();
        let overdue = format!(
            "({expr} IS NOT NULL AND {expr} < ? AND ({completed} IS NULL OR {completed} = 0 OR {completed} = 'false'))",
            expr = expr,
            completed = completed,
        );
        let sql = if pred.comparison == Operator::IsOverdue {
            overdue
        } else {
            format!("NOT {}", overdue)
        };
        return CompiledFilter {
            sql,
            params: vec![SqlValue::Text(today_str)],
        };
    }
    compile_date(pred, today)
}

fn resolve_date_value(value: &JsonValue, today: NaiveDate) -> String {
    let date_value: DateValue = serde_json::from_value(value.clone())
        .unwrap_or_else(|_| DateValue::Plain(value.as_str().unwrap_or_default().to_string()));
    date_mode::resolve(&date_value, today)
}

/// Coalesces between a nested `value` attribute and a bare scalar
/// (single-select sometimes stores as plain string, status always as
/// object).
fn status_expr(field: &str) -> String {
    format!(
        "COALESCE({nested}, {bare})",
        nested = json_path(field, "value"),
        bare = json_path(field, ""),
    )
}

fn compile_status(pred: &Predicate) -> CompiledFilter {
    let expr = status_expr(&pred.field);
    match pred.comparison {
        Operator::IsEmpty => CompiledFilter::literal(format!("({expr} IS NULL OR {expr} = '')", expr = expr)),
        Operator::IsNotEmpty => {
            CompiledFilter::literal(format!("({expr} IS NOT NULL AND {expr} != '')", expr = expr))
        }
        Operator::Is => CompiledFilter {
            sql: format!("{} = ?", expr),
            params: vec![json_value_to_sql(&pred.value)],
        },
        Operator::IsNot => CompiledFilter {
            sql: format!("({expr} IS NULL OR {expr} != ?)", expr = expr),
            params: vec![json_value_to_sql(&pred.value)],
        },
        Operator::IsAnyOf | Operator::IsNoneOf => {
            let values = pred.value.as_array().cloned().unwrap_or_default();
            if values.is_empty() {
                // Deliberate: empty list short-circuits rather than matching
                // empty-string; callers must use `is_empty`.
                return CompiledFilter::literal(if pred.comparison == Operator::IsAnyOf {
                    "0"
                } else {
                    "1"
                });
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            let membership = format!("{} IN ({})", expr, placeholders);
            let sql = if pred.comparison == Operator::IsAnyOf {
                membership
            } else {
                format!("({expr} IS NULL OR NOT {membership})", expr = expr, membership = membership)
            };
            CompiledFilter {
                sql,
                params: values.iter().map(json_value_to_sql).collect(),
            }
        }
        _ => CompiledFilter::literal("0"),
    }
}

/// Single-element containment check against a JSON array field, matching
/// on the raw element or its nested `id`/`value` (covers multi-select
/// scalars, linked-record/user object arrays).
fn contains_clause(field: &str, value: &JsonValue) -> (String, Vec<SqlValue>) {
    let array = json_path(field, "");
    let sql = format!(
        "EXISTS (SELECT 1 FROM json_each({array}) je WHERE je.value = ? OR json_extract(je.value, '$.id') = ? OR json_extract(je.value, '$.value') = ?)",
        array = array,
    );
    let param = json_value_to_sql(value);
    (sql, vec![param.clone(), param.clone(), param])
}

fn compile_array(pred: &Predicate) -> CompiledFilter {
    let array = json_path(&pred.field, "");

    match pred.comparison {
        Operator::IsEmpty => CompiledFilter::literal(is_empty_clause(&pred.field, true)),
        Operator::IsNotEmpty => {
            CompiledFilter::literal(format!("NOT {}", is_empty_clause(&pred.field, true)))
        }
        Operator::Contains => {
            let (sql, params) = contains_clause(&pred.field, &pred.value);
            CompiledFilter { sql, params }
        }
        Operator::NotContains => {
            let (sql, params) = contains_clause(&pred.field, &pred.value);
            CompiledFilter {
                sql: format!("NOT ({})", sql),
                params,
            }
        }
        Operator::HasAnyOf => combine_array_values(&pred.value, &array, Join::Or, false, "0"),
        Operator::HasAllOf => combine_array_values(&pred.value, &array, Join::And, false, "1"),
        Operator::HasNoneOf => combine_array_values(&pred.value, &array, Join::And, true, "1"),
        Operator::IsExactly => compile_is_exactly(&pred.value, &array),
        _ => CompiledFilter::literal("0"),
    }
}

enum Join {
    And,
    Or,
}

/// Empty-list short-circuits: `has_any_of []` matches nothing;
/// `has_all_of []` and `has_none_of []` match everything.
fn combine_array_values(
    value: &JsonValue,
    array_expr: &str,
    join: Join,
    negate_each: bool,
    empty_result: &str,
) -> CompiledFilter {
    let values = value.as_array().cloned().unwrap_or_default();
    if values.is_empty() {
        return CompiledFilter::literal(empty_result);
    }

    let mut sql_parts = Vec::with_capacity(values.len());
    let mut params = Vec::new();
    for v in &values {
        let (exists_sql, exists_params) = contains_clause_raw(array_expr, v);
        let clause = if negate_each {
            format!("NOT ({})", exists_sql)
        } else {
            exists_sql
        };
        sql_parts.push(clause);
        params.extend(exists_params);
    }
    let joiner = match join {
        Join::And => " AND ",
        Join::Or => " OR ",
    };
    CompiledFilter {
        sql: sql_parts.join(joiner),
        params,
    }
}

fn contains_clause_raw(array_expr: &str, value: &JsonValue) -> (String, Vec<SqlValue>) {
    let sql = format!(
        "EXISTS (SELECT 1 FROM json_each({array}) je WHERE je.value = ? OR json_extract(je.value, '$.id') = ? OR json_extract(je.value, '$.value') = ?)",
        array = array_expr,
    );
    let param = json_value_to_sql(value);
    (sql, vec![param.clone(), param.clone(), param])
}

fn compile_is_exactly(value: &JsonValue, array_expr: &str) -> CompiledFilter {
    let values = value.as_array().cloned().unwrap_or_default();
    // Exact set match: same cardinality, and every requested value present.
    let count_clause = format!(
        "(SELECT COUNT(*) FROM json_each({array})) = {n}",
        array = array_expr,
        n = values.len()
    );
    if values.is_empty() {
        return CompiledFilter::literal(count_clause);
    }
    let membership = combine_array_values(value, array_expr, Join::And, false, "1");
    CompiledFilter {
        sql: format!("({count_clause}) AND ({membership})", count_clause = count_clause, membership = membership.sql),
        params: membership.params,
    }
}

fn compile_file(pred: &Predicate) -> CompiledFilter {
    let array = json_path(&pred.field, "");
    match pred.comparison {
        Operator::IsEmpty => CompiledFilter::literal(is_empty_clause(&pred.field, false)),
        Operator::IsNotEmpty => {
            CompiledFilter::literal(format!("NOT {}", is_empty_clause(&pred.field, false)))
        }
        Operator::FileNameContains => CompiledFilter {
            sql: format!(
                "EXISTS (SELECT 1 FROM json_each({array}) je WHERE instr(lower(json_extract(je.value, '$.name')), lower(?)) > 0)",
                array = array
            ),
            params: vec![json_value_to_sql(&pred.value)],
        },
        Operator::FileTypeIs => CompiledFilter {
            sql: format!(
                "EXISTS (SELECT 1 FROM json_each({array}) je WHERE json_extract(je.value, '$.type') = ?)",
                array = array
            ),
            params: vec![json_value_to_sql(&pred.value)],
        },
        _ => CompiledFilter::literal("0"),
    }
}
