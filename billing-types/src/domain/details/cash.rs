use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Params;

/// Manual cash entry: receipt number, payer name, method and so on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashDetails {
    pub data: Params,
}

impl CashDetails {
    pub fn new(data: Params) -> Self {
        Self { data }
    }

    pub fn with_data(mut self, data: Params) -> Self {
        self.data = data;
        self
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}
