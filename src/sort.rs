// src/sort.rs
// Sort-key vocabulary shared between the compiler's JSON accessors, the
// cache store (C6, ORDER BY generation), and the query executor (C7).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Field names are sanitised the same way the filter compiler sanitises
/// them before splicing into `json_extract`.
fn sanitize_field(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Builds an `ORDER BY` clause over the `data` JSON column. Null sort
/// keys sort last regardless of direction.
pub fn order_by_clause(keys: &[SortKey]) -> String {
    if keys.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = keys
        .iter()
        .map(|k| {
            let accessor = format!("json_extract(data, '$.{}')", sanitize_field(&k.field));
            let dir = match k.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!(
                "(CASE WHEN {accessor} IS NULL THEN 1 ELSE 0 END) ASC, {accessor} {dir}",
                accessor = accessor,
                dir = dir
            )
        })
        .collect();
    format!("ORDER BY {}", parts.join(", "))
}
