// src/filter/tree.rs
// Filter tree types: groups recurse arbitrarily, leaves are predicates.

use serde::{Deserialize, Serialize};

/// The closed set of ~40 comparison operators spread across the ten
/// field-type families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Is,
    IsNot,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    IsEqualTo,
    IsNotEqualTo,
    IsGreaterThan,
    IsLessThan,
    IsEqualOrGreaterThan,
    IsEqualOrLessThan,
    IsBefore,
    IsAfter,
    IsOnOrBefore,
    IsOnOrAfter,
    IsOverdue,
    IsNotOverdue,
    IsAnyOf,
    IsNoneOf,
    HasAnyOf,
    HasAllOf,
    IsExactly,
    HasNoneOf,
    FileNameContains,
    FileTypeIs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    And,
    Or,
}

/// A leaf predicate: `{field, comparison, value}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub comparison: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Either an inner `{operator, fields}` group or a leaf predicate.
/// Nodes recurse arbitrarily (tested to at least 4 levels deep).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group {
        operator: GroupOperator,
        fields: Vec<FilterNode>,
    },
    Predicate(Predicate),
}

impl FilterNode {
    pub fn predicate(field: impl Into<String>, comparison: Operator, value: serde_json::Value) -> Self {
        FilterNode::Predicate(Predicate {
            field: field.into(),
            comparison,
            value,
        })
    }

    pub fn and(fields: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            operator: GroupOperator::And,
            fields,
        }
    }

    pub fn or(fields: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            operator: GroupOperator::Or,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_untagged_group_vs_predicate() {
        let json = serde_json::json!({
            "operator": "and",
            "fields": [
                {"field": "status", "comparison": "is", "value": "active"},
                {"field": "tags", "comparison": "has_any_of", "value": ["urgent"]}
            ]
        });
        let node: FilterNode = serde_json::from_value(json).unwrap();
        match node {
            FilterNode::Group { operator, fields } => {
                assert_eq!(operator, GroupOperator::And);
                assert_eq!(fields.len(), 2);
            }
            _ => panic!("expected group"),
        }
    }
}
