//! Service invocations

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Context;

/// A call to `domain.service` with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub service_data: Value,
    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// `domain.service`
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Deserialize one field of the payload; `None` when absent or mistyped.
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Targeted entity ids. `entity_id` may be a single string, a
    /// comma-separated string or a list.
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    #[default]
    None,
    Optional,
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(data: Value) -> ServiceCall {
        ServiceCall::new("number", "set_value", data, Context::new())
    }

    #[test]
    fn test_service_id() {
        assert_eq!(call(json!({})).service_id(), "number.set_value");
    }

    #[test]
    fn test_typed_get() {
        let c = call(json!({"value": 42.5, "entity_id": "number.volume"}));
        assert_eq!(c.get::<f64>("value"), Some(42.5));
        assert_eq!(c.get::<i64>("entity_id"), None);
        assert_eq!(c.get::<String>("missing"), None);
    }

    #[test]
    fn test_entity_ids_forms() {
        assert_eq!(
            call(json!({"entity_id": "number.a"})).entity_ids(),
            vec!["number.a"]
        );
        assert_eq!(
            call(json!({"entity_id": "number.a, number.b"})).entity_ids(),
            vec!["number.a", "number.b"]
        );
        assert_eq!(
            call(json!({"entity_id": ["number.a", 3, "number.c"]})).entity_ids(),
            vec!["number.a", "number.c"]
        );
        assert!(call(json!({})).entity_ids().is_empty());
    }
}
