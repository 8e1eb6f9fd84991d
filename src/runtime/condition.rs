/// Condition node evaluation
///
/// A pure comparison of two already-resolved operands. Unknown operators
/// evaluate to `false`; numeric parse failures are handler errors.

use crate::error::NodeError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    #[default]
    Always,
    #[serde(other)]
    Unknown,
}

pub fn evaluate(operator: ConditionOperator, left: &Value, right: &Value) -> Result<bool, NodeError> {
    let outcome = match operator {
        ConditionOperator::Always => true,
        ConditionOperator::Equals => render(left) == render(right),
        ConditionOperator::NotEquals => render(left) != render(right),
        ConditionOperator::Contains => render(left).contains(render(right).as_str()),
        ConditionOperator::GreaterThan => numeric("left", left)? > numeric("right", right)?,
        ConditionOperator::LessThan => numeric("left", left)? < numeric("right", right)?,
        ConditionOperator::Unknown => false,
    };
    Ok(outcome)
}

/// String form used by the textual operators
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn numeric(operand: &'static str, value: &Value) -> Result<f64, NodeError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| NodeError::NotNumeric {
        operand,
        value: render(value),
    })
}
