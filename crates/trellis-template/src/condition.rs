//! Condition evaluation.
//!
//! Evaluation never fails: comparisons over values that cannot be coerced
//! are `false`, so a sparse record closes the branch rather than erroring
//! the run.

use serde_json::Value;
use trellis_definition::{ComparisonOperator, ConditionData, LogicOp};

use crate::context::Context;
use crate::resolve::resolve;

/// Evaluate a single comparison against the context.
///
/// A `field` containing `{{` is template-resolved; a bare field is looked up
/// as a dotted context path (missing paths read as the empty string).
pub fn evaluate(field: &str, operator: ComparisonOperator, value: &Value, ctx: &Context) -> bool {
  let lhs = field_text(field, ctx);
  let rhs = value_text(value, ctx);

  match operator {
    ComparisonOperator::Equals => lhs == rhs,
    ComparisonOperator::NotEquals => lhs != rhs,
    ComparisonOperator::Contains => lhs.contains(&rhs),
    ComparisonOperator::NotContains => !lhs.contains(&rhs),
    ComparisonOperator::StartsWith => lhs.starts_with(&rhs),
    ComparisonOperator::EndsWith => lhs.ends_with(&rhs),
    ComparisonOperator::GreaterThan => numeric(&lhs, &rhs).is_some_and(|(l, r)| l > r),
    ComparisonOperator::LessThan => numeric(&lhs, &rhs).is_some_and(|(l, r)| l < r),
    ComparisonOperator::IsEmpty => lhs.is_empty(),
    ComparisonOperator::IsNotEmpty => !lhs.is_empty(),
  }
}

/// Evaluate a condition node's clause list strictly left to right.
///
/// Each clause's `logic` tag joins it to the running result; there is no
/// operator precedence, matching how authors read a linear clause list.
pub fn evaluate_chain(data: &ConditionData, ctx: &Context) -> bool {
  let mut terms = data.terms();
  // terms() always yields the primary clause first.
  let first = match terms.next() {
    Some(term) => term,
    None => return false,
  };
  let mut result = evaluate(&first.field, first.operator, &first.value, ctx);
  for term in terms {
    let clause = evaluate(&term.field, term.operator, &term.value, ctx);
    result = match term.logic.unwrap_or(LogicOp::And) {
      LogicOp::And => result && clause,
      LogicOp::Or => result || clause,
    };
  }
  result
}

fn field_text(field: &str, ctx: &Context) -> String {
  if field.contains("{{") {
    return resolve(field, ctx);
  }
  match ctx.lookup(field) {
    Some(value) => plain_text(value),
    None => String::new(),
  }
}

fn value_text(value: &Value, ctx: &Context) -> String {
  match value {
    Value::String(s) => resolve(s, ctx),
    other => plain_text(other),
  }
}

fn plain_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn numeric(lhs: &str, rhs: &str) -> Option<(f64, f64)> {
  Some((lhs.trim().parse().ok()?, rhs.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use trellis_definition::ConditionTerm;

  use super::*;

  fn ctx() -> Context {
    Context::new(
      json!({"status": "active", "count": 7, "name": "Acme Corp", "note": ""}),
      json!({}),
    )
  }

  fn term(field: &str, op: ComparisonOperator, value: Value, logic: Option<LogicOp>) -> ConditionTerm {
    ConditionTerm {
      field: field.to_string(),
      operator: op,
      value,
      logic,
    }
  }

  #[test]
  fn bare_field_is_context_lookup() {
    let ctx = Context::new(json!({}), json!({}));
    // `status` sits at the context root here, as in a flat record payload.
    let mut flat = ctx;
    flat.set_var("status", json!("active")).unwrap();
    assert!(evaluate("status", ComparisonOperator::Equals, &json!("active"), &flat));
  }

  #[test]
  fn string_operators() {
    let ctx = ctx();
    assert!(evaluate("record.status", ComparisonOperator::Equals, &json!("active"), &ctx));
    assert!(evaluate("record.name", ComparisonOperator::Contains, &json!("Corp"), &ctx));
    assert!(evaluate("record.name", ComparisonOperator::StartsWith, &json!("Acme"), &ctx));
    assert!(evaluate("record.name", ComparisonOperator::EndsWith, &json!("Corp"), &ctx));
    assert!(evaluate("record.name", ComparisonOperator::NotEquals, &json!("acme corp"), &ctx));
  }

  #[test]
  fn numeric_comparison_coerces_both_sides() {
    let ctx = ctx();
    assert!(evaluate("record.count", ComparisonOperator::GreaterThan, &json!("5"), &ctx));
    assert!(evaluate("record.count", ComparisonOperator::LessThan, &json!(10), &ctx));
  }

  #[test]
  fn non_numeric_comparison_fails_closed() {
    let ctx = Context::new(json!({"count": "x"}), json!({}));
    assert!(!evaluate("record.count", ComparisonOperator::GreaterThan, &json!("5"), &ctx));
    assert!(!evaluate("record.count", ComparisonOperator::LessThan, &json!("5"), &ctx));
  }

  #[test]
  fn empty_checks_ignore_value() {
    let ctx = ctx();
    assert!(evaluate("record.note", ComparisonOperator::IsEmpty, &json!("ignored"), &ctx));
    assert!(evaluate("record.missing", ComparisonOperator::IsEmpty, &Value::Null, &ctx));
    assert!(evaluate("record.status", ComparisonOperator::IsNotEmpty, &Value::Null, &ctx));
  }

  #[test]
  fn templated_field_and_value() {
    let ctx = ctx();
    assert!(evaluate(
      "{{record.status}}",
      ComparisonOperator::Equals,
      &json!("{{record.status}}"),
      &ctx
    ));
  }

  #[test]
  fn chain_is_strictly_sequential() {
    let ctx = ctx();
    // Sequential: (true && false) || true = true.
    let data = ConditionData {
      first: term("record.status", ComparisonOperator::Equals, json!("active"), None),
      conditions: vec![
        term("record.count", ComparisonOperator::GreaterThan, json!(100), Some(LogicOp::And)),
        term("record.name", ComparisonOperator::Contains, json!("Acme"), Some(LogicOp::Or)),
      ],
    };
    assert!(evaluate_chain(&data, &ctx));

    // Standard precedence would bind the AND tighter here.
    // Sequential: (false || true) && false = false.
    let data = ConditionData {
      first: term("record.status", ComparisonOperator::Equals, json!("closed"), None),
      conditions: vec![
        term("record.count", ComparisonOperator::GreaterThan, json!(1), Some(LogicOp::Or)),
        term("record.name", ComparisonOperator::Equals, json!("other"), Some(LogicOp::And)),
      ],
    };
    assert!(!evaluate_chain(&data, &ctx));
  }

  #[test]
  fn missing_logic_defaults_to_and() {
    let ctx = ctx();
    let data = ConditionData {
      first: term("record.status", ComparisonOperator::Equals, json!("active"), None),
      conditions: vec![term("record.count", ComparisonOperator::GreaterThan, json!(100), None)],
    };
    assert!(!evaluate_chain(&data, &ctx));
  }
}
