// src/response/shaper.rs
// Response Shaper (C8): projects rows to requested fields, normalises
// timestamps, substitutes rich-document renderings, and emits compact
// tabular text or JSON.
//
// Helper-function style grounded in `tools/response.rs`; the typed
// wrapper shape borrows from `mcp/responses.rs`.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::entities::{FieldDescriptor, Record};
use crate::filter::ValidationWarning;
use crate::registry::{self, FieldType};

const FIELD_DELIMITER: &str = "\t";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tabular,
    Json,
}

#[derive(Debug, Serialize)]
pub struct JsonResponse {
    pub items: Vec<Value>,
    pub total_count: u64,
    pub count: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct ShapeRequest<'a> {
    pub fields: &'a [String],
    pub timezone: &'a str,
    pub format: OutputFormat,
    pub total_count: u64,
    pub filtered_count: u64,
}

/// Shape rows into either compact tabular text or a JSON envelope,
/// depending on `request.format` and row-shape regularity.
pub fn shape(rows: &[Record], schema: &[FieldDescriptor], warnings: &[ValidationWarning], request: &ShapeRequest) -> String {
    let projected: Vec<(String, Vec<(String, Value)>)> = rows
        .iter()
        .map(|r| (r.id.clone(), project_row(r, schema, request.fields, request.timezone)))
        .collect();

    let use_tabular = request.format == OutputFormat::Tabular && rows_are_uniform(&projected);

    if use_tabular {
        render_tabular(&projected, warnings, request)
    } else {
        render_json(&projected, warnings, request)
    }
}

/// Field-type-aware warnings for requested large-content fields: flags
/// when a field whose rendering may be large (rich documents) is
/// explicitly requested.
pub fn large_content_warnings(fields: &[String], schema: &[FieldDescriptor]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|slug| {
            let descriptor = schema.iter().find(|f| &f.slug == slug)?;
            registry::lookup(descriptor.field_type)
                .large_content
                .then(|| format!("field '{slug}' is large-content; consider excluding it from bulk requests"))
        })
        .collect()
}

fn project_row(record: &Record, schema: &[FieldDescriptor], fields: &[String], timezone: &str) -> Vec<(String, Value)> {
    let mut slugs: Vec<&str> = Vec::with_capacity(fields.len() + 2);
    slugs.push("id");
    slugs.push("title");
    for f in fields {
        if !slugs.contains(&f.as_str()) {
            slugs.push(f.as_str());
        }
    }

    slugs
        .into_iter()
        .map(|slug| {
            let value = if slug == "id" {
                Value::String(record.id.clone())
            } else {
                record.data.get(slug).cloned().unwrap_or(Value::Null)
            };
            let field_type = schema.iter().find(|f| f.slug == slug).map(|f| f.field_type);
            let shaped = shape_value(value, field_type, timezone);
            (slug.to_string(), shaped)
        })
        .collect()
}

/// Normalises timestamp strings to the configured timezone and, for
/// rich-document fields, substitutes the rendered HTML (or a plain-text
/// preview) — the cache entry itself is untouched.
fn shape_value(value: Value, field_type: Option<FieldType>, timezone: &str) -> Value {
    match field_type {
        Some(FieldType::RichDocument) => rich_document_preview(value),
        _ => normalise_timestamp(value, timezone),
    }
}

fn rich_document_preview(value: Value) -> Value {
    match &value {
        Value::Object(map) => {
            if let Some(html) = map.get("html").filter(|v| !v.is_null()) {
                html.clone()
            } else if let Some(preview) = map.get("preview").filter(|v| !v.is_null()) {
                preview.clone()
            } else {
                value
            }
        }
        other => other.clone(),
    }
}

fn normalise_timestamp(value: Value, timezone: &str) -> Value {
    match &value {
        Value::String(s) => match s.parse::<DateTime<Utc>>() {
            Ok(dt) => Value::String(format_in_timezone(dt, timezone)),
            Err(_) => value,
        },
        _ => value,
    }
}

/// Supports `"UTC"` and fixed-offset strings (`"+05:30"`, `"-08:00"`);
/// anything else is left in UTC. No `chrono-tz` dependency is carried —
/// named IANA zones beyond UTC are out of scope for this core (see
/// DESIGN.md).
fn format_in_timezone(dt: DateTime<Utc>, timezone: &str) -> String {
    if timezone.eq_ignore_ascii_case("UTC") {
        return dt.to_rfc3339();
    }
    match FixedOffset::parse_to_str_offset(timezone) {
        Some(offset) => dt.with_timezone(&offset).to_rfc3339(),
        None => dt.to_rfc3339(),
    }
}

/// Tiny helper trait so `format_in_timezone` can parse `"+05:30"` style
/// offsets without pulling in a full timezone database.
trait ParseOffset {
    fn parse_to_str_offset(s: &str) -> Option<FixedOffset>;
}

impl ParseOffset for FixedOffset {
    fn parse_to_str_offset(s: &str) -> Option<FixedOffset> {
        let (sign, rest) = s.split_at(1);
        let sign = match sign {
            "+" => 1,
            "-" => -1,
            _ => return None,
        };
        let mut parts = rest.splitn(2, ':');
        let hours: i32 = parts.next()?.parse().ok()?;
        let minutes: i32 = parts.next().unwrap_or("0").parse().ok()?;
        let seconds = sign * (hours * 3600 + minutes * 60);
        FixedOffset::east_opt(seconds)
    }
}

fn rows_are_uniform(rows: &[(String, Vec<(String, Value)>)]) -> bool {
    let Some((_, first)) = rows.first() else { return true };
    let first_keys: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
    rows.iter().all(|(_, r)| {
        r.len() == first_keys.len() && r.iter().all(|(k, _)| first_keys.contains(&k.as_str()))
    }) && rows.iter().all(|(_, r)| r.iter().all(|(_, v)| !matches!(v, Value::Object(_) | Value::Array(_))))
}

fn render_tabular(rows: &[(String, Vec<(String, Value)>)], warnings: &[ValidationWarning], request: &ShapeRequest) -> String {
    let mut out = String::new();

    if !warnings.is_empty() {
        out.push_str("\u{26A0}\u{FE0F} FILTER WARNINGS:\n");
        for w in warnings {
            out.push_str(&w.message);
            out.push('\n');
        }
    }

    out.push_str(&format!(
        "=== Showing {} of {} filtered records ({} total) ===\n",
        rows.len(),
        request.filtered_count,
        request.total_count,
    ));

    if let Some((_, first)) = rows.first() {
        let header: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
        out.push_str(&header.join(FIELD_DELIMITER));
        out.push('\n');
        for (_, row) in rows {
            let line: Vec<String> = row.iter().map(|(_, v)| scalar_to_text(v)).collect();
            out.push_str(&line.join(FIELD_DELIMITER));
            out.push('\n');
        }
    }

    out
}

fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_json(rows: &[(String, Vec<(String, Value)>)], warnings: &[ValidationWarning], request: &ShapeRequest) -> String {
    let items: Vec<Value> = rows
        .iter()
        .map(|(_, fields)| Value::Object(fields.iter().cloned().collect()))
        .collect();
    let response = JsonResponse {
        count: items.len() as u64,
        items,
        total_count: request.total_count,
        warnings: warnings.iter().map(|w| w.message.clone()).collect(),
    };
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldType;
    use std::collections::HashMap;

    fn schema() -> Vec<FieldDescriptor> {
        vec![FieldDescriptor {
            slug: "name".to_string(),
            label: "Name".to_string(),
            field_type: FieldType::Text,
            params: Default::default(),
        }]
    }

    fn record(id: &str, name: &str) -> Record {
        let mut data = HashMap::new();
        data.insert("name".to_string(), Value::String(name.to_string()));
        Record { id: id.to_string(), table_id: "t1".to_string(), data }
    }

    #[test]
    fn tabular_header_reports_counts() {
        let rows = vec![record("r1", "Alice"), record("r2", "Bob")];
        let request = ShapeRequest {
            fields: &["name".to_string()],
            timezone: "UTC",
            format: OutputFormat::Tabular,
            total_count: 10,
            filtered_count: 2,
        };
        let text = shape(&rows, &schema(), &[], &request);
        assert!(text.contains("Showing 2 of 2 filtered records (10 total)"));
        assert!(text.contains("Alice"));
    }

    #[test]
    fn warnings_prepended_with_marker() {
        let rows = vec![record("r1", "Alice")];
        let warning = ValidationWarning {
            field: "amount".to_string(),
            message: "operator contains is not valid for field type number".to_string(),
            suggestion: None,
        };
        let request = ShapeRequest {
            fields: &["name".to_string()],
            timezone: "UTC",
            format: OutputFormat::Tabular,
            total_count: 1,
            filtered_count: 1,
        };
        let text = shape(&rows, &schema(), &[warning], &request);
        assert!(text.starts_with("\u{26A0}\u{FE0F} FILTER WARNINGS:"));
    }

    #[test]
    fn json_format_used_when_requested() {
        let rows = vec![record("r1", "Alice")];
        let request = ShapeRequest {
            fields: &["name".to_string()],
            timezone: "UTC",
            format: OutputFormat::Json,
            total_count: 1,
            filtered_count: 1,
        };
        let text = shape(&rows, &schema(), &[], &request);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["count"], 1);
    }

    #[test]
    fn id_and_title_are_always_projected() {
        let mut data = HashMap::new();
        data.insert("title".to_string(), Value::String("Hello".to_string()));
        let r = Record { id: "r1".to_string(), table_id: "t1".to_string(), data };
        let request = ShapeRequest {
            fields: &[],
            timezone: "UTC",
            format: OutputFormat::Json,
            total_count: 1,
            filtered_count: 1,
        };
        let text = shape(&[r], &[], &[], &request);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["items"][0]["id"], "r1");
        assert_eq!(parsed["items"][0]["title"], "Hello");
    }

    #[test]
    fn large_content_field_triggers_warning() {
        let schema = vec![FieldDescriptor {
            slug: "attachment".to_string(),
            label: "Attachment".to_string(),
            field_type: FieldType::File,
            params: Default::default(),
        }];
        let warnings = large_content_warnings(&["attachment".to_string()], &schema);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn fixed_offset_parses() {
        let offset = FixedOffset::parse_to_str_offset("+05:30").unwrap();
        assert_eq!(offset.local_minus_utc(), 5 * 3600 + 30 * 60);
    }
}
