// src/registry.rs
// Field-Type Registry (C3): static, process-wide knowledge about each
// field-type name — storage shape, valid comparison operators, TTL
// category, indexing preference. Immutable for the life of the process.
// Adding a field type is meant to be a localised change here.

use serde::{Deserialize, Serialize};

use crate::config::{TTL_LONG, TTL_MEDIUM, TTL_SHORT, TTL_VERY_SHORT};
use crate::filter::tree::Operator;

/// The closed set of field types a Table's structure can declare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    DateRange,
    DueDate,
    SingleSelect,
    Status,
    MultiSelect,
    User,
    LinkedRecord,
    File,
    YesNo,
    RichDocument,
    System,
}

/// How a field's value is physically shaped once coerced for storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCategory {
    ScalarText,
    ScalarNumeric,
    ScalarBoolean,
    NestedStatus,
    NestedDate,
    NestedDateRange,
    NestedDueDate,
    ArrayOfScalars,
    ArrayOfObjects,
    NestedDocument,
    SystemReadonly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlCategory {
    Long,
    Medium,
    Short,
    VeryShort,
}

impl TtlCategory {
    pub fn seconds(self) -> i64 {
        match self {
            TtlCategory::Long => TTL_LONG,
            TtlCategory::Medium => TTL_MEDIUM,
            TtlCategory::Short => TTL_SHORT,
            TtlCategory::VeryShort => TTL_VERY_SHORT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPreference {
    Always,
    Conditional,
    Never,
}

/// Everything the rest of the engine needs to know about one field type.
#[derive(Debug, Clone, Copy)]
pub struct FieldTypeInfo {
    pub field_type: FieldType,
    pub storage: StorageCategory,
    pub ttl: TtlCategory,
    pub indexing: IndexPreference,
    /// Large-content types the shaper should warn about when requested
    /// wholesale.
    pub large_content: bool,
    operators: &'static [Operator],
}

impl FieldTypeInfo {
    pub fn supports(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }

    pub fn valid_operators(&self) -> &'static [Operator] {
        self.operators
    }
}

use Operator::*;

const TEXT_OPS: &[Operator] = &[Is, IsNot, Contains, NotContains, IsEmpty, IsNotEmpty];
const NUMERIC_OPS: &[Operator] = &[
    Is,
    IsNot,
    IsEqualTo,
    IsNotEqualTo,
    IsGreaterThan,
    IsLessThan,
    IsEqualOrGreaterThan,
    IsEqualOrLessThan,
    IsEmpty,
    IsNotEmpty,
];
const DATE_OPS: &[Operator] = &[
    Is,
    IsNot,
    IsBefore,
    IsAfter,
    IsOnOrBefore,
    IsOnOrAfter,
    IsEmpty,
    IsNotEmpty,
];
const DUE_DATE_OPS: &[Operator] = &[
    Is,
    IsNot,
    IsBefore,
    IsAfter,
    IsOnOrBefore,
    IsOnOrAfter,
    IsEmpty,
    IsNotEmpty,
    IsOverdue,
    IsNotOverdue,
];
const SELECT_OPS: &[Operator] = &[Is, IsNot, IsAnyOf, IsNoneOf, IsEmpty, IsNotEmpty];
const MULTI_OPS: &[Operator] = &[
    HasAnyOf,
    HasAllOf,
    IsExactly,
    HasNoneOf,
    IsEmpty,
    IsNotEmpty,
];
const LINKED_OPS: &[Operator] = &[
    Contains,
    NotContains,
    HasAnyOf,
    HasAllOf,
    IsExactly,
    HasNoneOf,
    IsEmpty,
    IsNotEmpty,
];
const USER_OPS: &[Operator] = &[HasAnyOf, HasAllOf, IsExactly, HasNoneOf, IsEmpty, IsNotEmpty];
const FILE_OPS: &[Operator] = &[FileNameContains, FileTypeIs, IsEmpty, IsNotEmpty];
const YES_NO_OPS: &[Operator] = &[Is];
const SYSTEM_OPS: &[Operator] = &[Is, IsNot, IsEmpty, IsNotEmpty];

const REGISTRY: &[FieldTypeInfo] = &[
    FieldTypeInfo {
        field_type: FieldType::Text,
        storage: StorageCategory::ScalarText,
        ttl: TtlCategory::Long,
        indexing: IndexPreference::Always,
        large_content: false,
        operators: TEXT_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::Number,
        storage: StorageCategory::ScalarNumeric,
        ttl: TtlCategory::Short,
        indexing: IndexPreference::Always,
        large_content: false,
        operators: NUMERIC_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::Date,
        storage: StorageCategory::NestedDate,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Conditional,
        large_content: false,
        operators: DATE_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::DateRange,
        storage: StorageCategory::NestedDateRange,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Conditional,
        large_content: false,
        operators: DATE_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::DueDate,
        storage: StorageCategory::NestedDueDate,
        ttl: TtlCategory::VeryShort,
        indexing: IndexPreference::Conditional,
        large_content: false,
        operators: DUE_DATE_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::SingleSelect,
        storage: StorageCategory::NestedStatus,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Always,
        large_content: false,
        operators: SELECT_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::Status,
        storage: StorageCategory::NestedStatus,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Always,
        large_content: false,
        operators: SELECT_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::MultiSelect,
        storage: StorageCategory::ArrayOfScalars,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Conditional,
        large_content: false,
        operators: MULTI_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::User,
        storage: StorageCategory::ArrayOfObjects,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Conditional,
        large_content: false,
        operators: USER_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::LinkedRecord,
        storage: StorageCategory::ArrayOfObjects,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Conditional,
        large_content: false,
        operators: LINKED_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::File,
        storage: StorageCategory::ArrayOfObjects,
        ttl: TtlCategory::Short,
        indexing: IndexPreference::Never,
        large_content: true,
        operators: FILE_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::YesNo,
        storage: StorageCategory::ScalarBoolean,
        ttl: TtlCategory::Medium,
        indexing: IndexPreference::Always,
        large_content: false,
        operators: YES_NO_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::RichDocument,
        storage: StorageCategory::NestedDocument,
        ttl: TtlCategory::Short,
        indexing: IndexPreference::Never,
        large_content: true,
        operators: TEXT_OPS,
    },
    FieldTypeInfo {
        field_type: FieldType::System,
        storage: StorageCategory::SystemReadonly,
        ttl: TtlCategory::Long,
        indexing: IndexPreference::Always,
        large_content: false,
        operators: SYSTEM_OPS,
    },
];

/// Look up the static info for a field type. Every `FieldType` variant is
/// present in `REGISTRY`; this never returns `None` for a valid variant.
pub fn lookup(field_type: FieldType) -> &'static FieldTypeInfo {
    REGISTRY
        .iter()
        .find(|info| info.field_type == field_type)
        .expect("REGISTRY covers every FieldType variant")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_is_registered() {
        for info in REGISTRY {
            assert!(!info.operators.is_empty(), "{:?} has no operators", info.field_type);
        }
    }

    #[test]
    fn multi_select_does_not_accept_is() {
        let info = lookup(FieldType::MultiSelect);
        assert!(!info.supports(Operator::Is));
        assert!(info.supports(Operator::HasAnyOf));
    }

    #[test]
    fn due_date_adds_overdue_operators_over_date() {
        let date = lookup(FieldType::Date);
        let due = lookup(FieldType::DueDate);
        assert!(!date.supports(Operator::IsOverdue));
        assert!(due.supports(Operator::IsOverdue));
    }

    #[test]
    fn large_content_types_are_flagged() {
        assert!(lookup(FieldType::RichDocument).large_content);
        assert!(lookup(FieldType::File).large_content);
        assert!(!lookup(FieldType::Text).large_content);
    }
}
