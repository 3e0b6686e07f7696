//! Per-iteration execution context.

use serde_json::{json, Value};

use crate::validate::TRIGGER_DATA_KEY;

/// `{ "trigger_data": ..., "<node_id>": <result>, ... }` for one iteration.
///
/// The only input to template resolution. Rebuilt from `trigger_data` at the
/// start of every iteration, so results never leak between iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    data: Value,
}

impl ExecutionContext {
    pub fn new(trigger_data: Value) -> Self {
        Self { data: json!({ TRIGGER_DATA_KEY: trigger_data }) }
    }

    /// Record a node's result under its id, and under its service name when
    /// that key is still free.
    pub fn insert_result(&mut self, node_id: &str, service: &str, result: Value) {
        if let Value::Object(map) = &mut self.data {
            if !service.is_empty() && !map.contains_key(service) {
                map.insert(service.to_owned(), result.clone());
            }
            map.insert(node_id.to_owned(), result);
        }
    }

    pub fn trigger_data(&self) -> &Value {
        &self.data[TRIGGER_DATA_KEY]
    }

    pub fn as_value(&self) -> &Value {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_with_trigger_data_only() {
        let ctx = ExecutionContext::new(json!({ "phone": "+91999" }));
        assert_eq!(ctx.as_value(), &json!({ "trigger_data": { "phone": "+91999" } }));
        assert_eq!(ctx.trigger_data()["phone"], "+91999");
    }

    #[test]
    fn results_are_aliased_by_service_without_overwriting() {
        let mut ctx = ExecutionContext::new(json!({}));
        ctx.insert_result("rzp_1", "razorpay", json!({ "amount": 1 }));
        ctx.insert_result("rzp_2", "razorpay", json!({ "amount": 2 }));

        let v = ctx.as_value();
        assert_eq!(v["rzp_1"]["amount"], 1);
        assert_eq!(v["rzp_2"]["amount"], 2);
        assert_eq!(v["razorpay"]["amount"], 1);
    }

    #[test]
    fn service_alias_never_shadows_trigger_data() {
        let mut ctx = ExecutionContext::new(json!({ "x": 1 }));
        ctx.insert_result("n", "trigger_data", json!({ "x": 2 }));
        assert_eq!(ctx.trigger_data()["x"], 1);
    }
}
