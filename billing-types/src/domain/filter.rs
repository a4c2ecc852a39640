//! Lookup filters over the details document and listing parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::gateway::Gateway;
use super::status::Status;
use super::transaction::TenantId;
use crate::error::DomainError;

/// Comparison applied to the value found at a details path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Text rendering of the value equals the operand.
    Equal(String),
    /// Integer value lies in the inclusive range.
    Between(i64, i64),
}

/// Filter over one field inside the details document, e.g.
/// `["account", "order_id"] = "42"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsFieldFilter {
    pub path: Vec<String>,
    pub op: FilterOp,
}

impl DetailsFieldFilter {
    pub fn equal<I, S>(path: I, value: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            op: FilterOp::Equal(value.into()),
        }
    }

    pub fn between<I, S>(path: I, from: i64, to: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            op: FilterOp::Between(from, to),
        }
    }

    /// Rejects empty paths and segments outside `[A-Za-z0-9_]`.
    ///
    /// Adapters render path segments into SQL, so this must hold before
    /// any query is built.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.path.is_empty() {
            return Err(DomainError::Validation("filter path is empty".into()));
        }
        for segment in &self.path {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(DomainError::Validation(format!(
                    "invalid filter path segment: {segment:?}"
                )));
            }
        }
        Ok(())
    }

    /// Evaluates the filter against a details document in memory.
    pub fn matches(&self, document: &Value) -> bool {
        let mut current = document;
        for segment in &self.path {
            match current.get(segment) {
                Some(next) => current = next,
                None => return false,
            }
        }
        match &self.op {
            FilterOp::Equal(expected) => match current {
                Value::String(s) => s == expected,
                Value::Null => false,
                other => other.to_string() == *expected,
            },
            FilterOp::Between(from, to) => {
                let n = match current {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                };
                n.is_some_and(|n| *from <= n && n <= *to)
            }
        }
    }
}

/// Sort direction on `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

/// Listing criteria for `count` / `get_paginated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindParams {
    pub tenant_id: Option<TenantId>,
    pub gateway: Option<Gateway>,
    pub status: Option<Status>,
    pub limit: i64,
    pub offset: i64,
    pub sort: SortOrder,
}

impl Default for FindParams {
    fn default() -> Self {
        Self {
            tenant_id: None,
            gateway: None,
            status: None,
            limit: 50,
            offset: 0,
            sort: SortOrder::Desc,
        }
    }
}
