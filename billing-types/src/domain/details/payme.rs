use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Params;

/// Numeric transaction states of the Payme merchant protocol.
pub struct PaymeState;

impl PaymeState {
    /// No remote transaction has been opened yet.
    pub const NEW: i32 = 0;
    pub const CREATED: i32 = 1;
    pub const PERFORMED: i32 = 2;
    pub const CANCELLED_BEFORE_PERFORM: i32 = -1;
    pub const CANCELLED_AFTER_PERFORM: i32 = -2;
}

/// Split-payout recipient; `amount` in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymeReceiver {
    pub id: String,
    pub amount: i64,
}

/// Payme payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymeDetails {
    /// Merchant-side transaction reference.
    pub transaction: String,
    pub merchant_id: String,
    /// Payme's remote transaction id, assigned by `CreateTransaction`.
    pub id: Option<String>,
    pub state: i32,
    /// Payme-side creation time (ms since epoch).
    pub time: i64,
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub account: Params,
    pub receivers: Vec<PaymeReceiver>,
    pub additional: Params,
    pub reason: Option<i32>,
    pub error_code: i32,
    pub link: String,
    pub params: Params,
}

impl PaymeDetails {
    pub fn new(transaction: impl Into<String>) -> Self {
        Self {
            transaction: transaction.into(),
            ..Default::default()
        }
    }

    pub fn with_merchant_id(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = merchant_id.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_state(mut self, state: i32) -> Self {
        self.state = state;
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    pub fn with_create_time(mut self, ms: i64) -> Self {
        self.create_time = ms;
        self
    }

    pub fn with_perform_time(mut self, ms: i64) -> Self {
        self.perform_time = ms;
        self
    }

    pub fn with_cancel_time(mut self, ms: i64) -> Self {
        self.cancel_time = ms;
        self
    }

    pub fn with_account(mut self, account: Params) -> Self {
        self.account = account;
        self
    }

    pub fn with_account_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.account.insert(key.into(), value);
        self
    }

    pub fn with_receivers(mut self, receivers: Vec<PaymeReceiver>) -> Self {
        self.receivers = receivers;
        self
    }

    pub fn with_reason(mut self, reason: i32) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = code;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.state < 0
    }
}
