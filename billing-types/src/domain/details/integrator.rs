use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Params;

/// Custom integration payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorDetails {
    pub provider: String,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
    pub data: Params,
    pub error_code: i32,
    pub error_note: String,
}

impl IntegratorDetails {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_data(mut self, data: Params) -> Self {
        self.data = data;
        self
    }

    pub fn with_error(mut self, code: i32, note: impl Into<String>) -> Self {
        self.error_code = code;
        self.error_note = note.into();
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let details = IntegratorDetails::new("acme");
        assert!(details.data.is_empty());
        assert_eq!(details.error_code, 0);
        assert_eq!(details.error_note, "");
    }

    #[test]
    fn test_with_data_replaces_map() {
        let mut first = Params::new();
        first.insert("name".into(), json!("John"));
        let original = IntegratorDetails::new("acme").with_data(first);
        let replaced = original.clone().with_data(Params::new());
        assert_eq!(original.get("name"), Some(&json!("John")));
        assert!(replaced.data.is_empty());
    }
}
