//! Branch selection for router nodes.
//!
//! Conditions never raise: type mismatches, bad regexes and unknown operators
//! all evaluate to `false` (the latter two are logged).

use std::cmp::Ordering;
use std::str::FromStr;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::Route;
use crate::resolver::resolve_value;

/// Comparison operators accepted in a route condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// Case-insensitive substring.
    Contains,
    /// Regex search.
    Matches,
}

impl FromStr for Operator {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=="       => Ok(Self::Eq),
            "!="       => Ok(Self::Ne),
            ">"        => Ok(Self::Gt),
            "<"        => Ok(Self::Lt),
            ">="       => Ok(Self::Ge),
            "<="       => Ok(Self::Le),
            "contains" => Ok(Self::Contains),
            "matches"  => Ok(Self::Matches),
            other      => Err(format!("unknown operator: {other}")),
        }
    }
}

/// Plain text form used by `contains` / `matches`.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Ordering between two operands, if they are comparable at all.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => as_f64(left)?.partial_cmp(&as_f64(right)?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

/// Evaluate `value <operator> target`.
///
/// When `target` is numeric and `value` is a number or numeric string, both
/// sides are compared as floats; otherwise the original JSON values are
/// compared as they are.
pub fn evaluate_condition(value: &Value, operator: &str, target: &Value) -> bool {
    let op = match operator.parse::<Operator>() {
        Ok(op) => op,
        Err(e) => {
            warn!("{e}");
            return false;
        }
    };

    let coerced = match (value, target) {
        (Value::String(_) | Value::Number(_), Value::Number(_)) => {
            as_f64(value).zip(as_f64(target))
        }
        _ => None,
    };
    // Coerced floats stay floats: `inf` and `nan` have no JSON form.
    let (ord, eq) = match coerced {
        Some((l, r)) => (l.partial_cmp(&r), l == r),
        None => (compare(value, target), equal(value, target)),
    };
    let ordering = || {
        if ord.is_none() {
            debug!(?value, ?target, "operands are not comparable");
        }
        ord
    };

    match op {
        Operator::Eq => eq,
        Operator::Ne => !eq,
        Operator::Gt => ordering() == Some(Ordering::Greater),
        Operator::Lt => ordering() == Some(Ordering::Less),
        Operator::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        Operator::Contains => text(value).to_lowercase().contains(&text(target).to_lowercase()),
        Operator::Matches => match Regex::new(&text(target)) {
            Ok(re) => re.is_match(&text(value)),
            Err(e) => {
                warn!(pattern = %text(target), "invalid regex in route condition: {e}");
                false
            }
        },
    }
}

/// First route whose condition holds (or the first fallback reached), with
/// its position in `routes`.
pub fn matching_route<'a>(routes: &'a [Route], context: &Value) -> Option<(usize, &'a Route)> {
    routes.iter().enumerate().find(|(_, route)| match &route.condition {
        Some(condition) if !route.is_fallback() => {
            let resolved = resolve_value(&condition.variable, context);
            evaluate_condition(&resolved, &condition.operator, &condition.value)
        }
        _ => true,
    })
}

/// Target node of the first matching route; `None` when nothing matches.
pub fn select_route(routes: &[Route], context: &Value) -> Option<String> {
    matching_route(routes, context).and_then(|(_, route)| route.next_node_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use serde_json::json;

    fn route(variable: &str, operator: &str, value: Value, next: &str) -> Route {
        Route {
            condition: Some(Condition {
                variable: variable.into(),
                operator: operator.into(),
                value,
            }),
            next_node_id: Some(next.into()),
        }
    }

    fn fallback(next: &str) -> Route {
        Route { condition: None, next_node_id: Some(next.into()) }
    }

    #[test]
    fn numeric_strings_are_coerced_against_numeric_targets() {
        assert!(evaluate_condition(&json!("1500"), ">", &json!(1000)));
        assert!(evaluate_condition(&json!(1500), ">=", &json!(1500.0)));
        assert!(evaluate_condition(&json!("999.5"), "<", &json!(1000)));
        assert!(evaluate_condition(&json!("5"), "==", &json!(5)));
    }

    #[test]
    fn infinite_numeric_strings_compare_as_floats() {
        assert!(evaluate_condition(&json!("inf"), ">", &json!(1000)));
        assert!(evaluate_condition(&json!("-inf"), "<", &json!(0)));
        assert!(!evaluate_condition(&json!("nan"), "==", &json!(1)));
        assert!(evaluate_condition(&json!("nan"), "!=", &json!(1)));
    }

    #[test]
    fn failed_coercion_falls_back_without_crashing() {
        assert!(!evaluate_condition(&json!("abc"), "==", &json!(1000)));
        assert!(evaluate_condition(&json!("abc"), "!=", &json!(1000)));
        assert!(!evaluate_condition(&json!("abc"), ">", &json!(1000)));
        assert!(!evaluate_condition(&json!({ "a": 1 }), "<", &json!(2)));
    }

    #[test]
    fn string_comparisons() {
        assert!(evaluate_condition(&json!("negative"), "==", &json!("negative")));
        assert!(!evaluate_condition(&json!("negative"), "==", &json!("positive")));
        assert!(evaluate_condition(&json!("b"), ">", &json!("a")));
    }

    #[test]
    fn contains_is_case_insensitive() {
        assert!(evaluate_condition(&json!("Where is my REFUND?"), "contains", &json!("refund")));
        assert!(!evaluate_condition(&json!("thanks"), "contains", &json!("refund")));
        assert!(evaluate_condition(&json!(12345), "contains", &json!(234)));
    }

    #[test]
    fn matches_searches_regex() {
        assert!(evaluate_condition(&json!("order BIZ-123 delayed"), "matches", &json!(r"BIZ-\d+")));
        assert!(!evaluate_condition(&json!("no order here"), "matches", &json!(r"^BIZ")));
        assert!(!evaluate_condition(&json!("x"), "matches", &json!("(unclosed")));
    }

    #[test]
    fn unknown_operator_is_false() {
        assert!(!evaluate_condition(&json!(1), "≈", &json!(1)));
    }

    #[test]
    fn first_match_wins_and_fallback_catches_the_rest() {
        let routes = vec![
            route("{{sentiment}}", "==", json!("positive"), "N1"),
            route("{{sentiment}}", "==", json!("negative"), "N2"),
            fallback("N3"),
        ];

        assert_eq!(select_route(&routes, &json!({ "sentiment": "neutral" })).as_deref(), Some("N3"));
        assert_eq!(select_route(&routes, &json!({ "sentiment": "negative" })).as_deref(), Some("N2"));
        assert_eq!(select_route(&routes, &json!({ "sentiment": "positive" })).as_deref(), Some("N1"));
    }

    #[test]
    fn fallback_is_taken_immediately_even_before_later_matches() {
        let routes = vec![fallback("first"), route("{{x}}", "==", json!(1), "second")];
        assert_eq!(select_route(&routes, &json!({ "x": 1 })).as_deref(), Some("first"));
    }

    #[test]
    fn no_match_without_fallback_is_none() {
        let routes = vec![route("{{sentiment}}", "==", json!("positive"), "N1")];
        assert_eq!(select_route(&routes, &json!({ "sentiment": "neutral" })), None);
        assert!(matching_route(&routes, &json!({})).is_none());
    }

    #[test]
    fn resolved_value_not_its_text_feeds_the_evaluator() {
        let ctx = json!({ "crm": { "total_spend": 1500.0, "vip": true } });
        let routes = vec![
            route("{{crm.vip}}", "==", json!(true), "vip"),
            fallback("regular"),
        ];
        assert_eq!(select_route(&routes, &ctx).as_deref(), Some("vip"));

        let routes = vec![route("{{crm.total_spend}}", ">", json!(1000), "big")];
        assert_eq!(select_route(&routes, &ctx).as_deref(), Some("big"));
    }
}
