// src/filter/validator.rs
// Filter Validator (C4): checks an operator/field-type pair, collects
// warnings per call, and suggests corrections.
//
// The warning collector is per-request, never process-wide — it's a
// plain struct threaded through compile/validate, not a thread-local.

use crate::filter::tree::Operator;
use crate::registry::{self, FieldType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<Operator>,
}

/// Scoped per-call collector: `enter` to get one, push warnings into it
/// during compile/validate, then `into_warnings` at the end. Never shared
/// across concurrent calls.
#[derive(Debug, Default)]
pub struct WarningCollector {
    warnings: Vec<ValidationWarning>,
}

impl WarningCollector {
    pub fn enter() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn into_warnings(self) -> Vec<ValidationWarning> {
        self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

/// Validate one `(field, operator, field_type)` triple.
///
/// - Unknown field type (or a formula-return-type field, which this engine
///   cannot type-infer): validation is skipped (`Pass`), nothing recorded.
/// - Known type, unsupported operator, non-strict mode: `Warn`, with a
///   suggestion appended to `collector` if one of the known heuristics
///   applies.
/// - Known type, unsupported operator, strict mode: `Fail`, nothing
///   appended to `collector` (the caller turns this into a hard error).
pub fn validate(
    field: &str,
    operator: Operator,
    field_type: Option<FieldType>,
    strict: bool,
    collector: &mut WarningCollector,
) -> ValidationOutcome {
    let Some(field_type) = field_type else {
        return ValidationOutcome::Pass;
    };

    let info = registry::lookup(field_type);
    if info.supports(operator) {
        return ValidationOutcome::Pass;
    }

    if strict {
        return ValidationOutcome::Fail;
    }

    let suggestion = suggest(operator, field_type);
    let message = match suggestion {
        Some(s) => format!(
            "operator {:?} is not valid for field type {:?}; did you mean {:?}?",
            operator, field_type, s
        ),
        None => format!(
            "operator {:?} is not valid for field type {:?}",
            operator, field_type
        ),
    };
    collector.push(ValidationWarning {
        field: field.to_string(),
        message,
        suggestion,
    });
    ValidationOutcome::Warn
}

/// Suggestion heuristics.
fn suggest(operator: Operator, field_type: FieldType) -> Option<Operator> {
    use FieldType::*;
    use Operator::*;

    match (operator, field_type) {
        (Is | IsAnyOf, MultiSelect) => Some(HasAnyOf),
        (HasAnyOf, SingleSelect | Status) => Some(IsAnyOf),
        (Contains, Number) => Some(IsEqualTo),
        (IsEqualTo | IsGreaterThan | IsLessThan | IsEqualOrGreaterThan | IsEqualOrLessThan, Text) => {
            Some(Is)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_on_numeric_warns_with_suggestion_in_non_strict_mode() {
        let mut collector = WarningCollector::enter();
        let outcome = validate("amount", Operator::Contains, Some(FieldType::Number), false, &mut collector);
        assert_eq!(outcome, ValidationOutcome::Warn);
        let warnings = collector.into_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion, Some(Operator::IsEqualTo));
    }

    #[test]
    fn contains_on_numeric_fails_in_strict_mode() {
        let mut collector = WarningCollector::enter();
        let outcome = validate("amount", Operator::Contains, Some(FieldType::Number), true, &mut collector);
        assert_eq!(outcome, ValidationOutcome::Fail);
        assert!(collector.is_empty());
    }

    #[test]
    fn unknown_field_type_skips_validation() {
        let mut collector = WarningCollector::enter();
        let outcome = validate("formula_field", Operator::Contains, None, true, &mut collector);
        assert_eq!(outcome, ValidationOutcome::Pass);
        assert!(collector.is_empty());
    }

    #[test]
    fn collectors_do_not_cross_contaminate() {
        let mut a = WarningCollector::enter();
        let mut b = WarningCollector::enter();
        validate("x", Operator::Contains, Some(FieldType::Number), false, &mut a);
        assert!(!a.is_empty());
        assert!(b.is_empty());
    }
}
