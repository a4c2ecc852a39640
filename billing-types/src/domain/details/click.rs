use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Params;

/// Click payload: merchant identifiers plus the state of the
/// prepare/complete handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickDetails {
    /// Caller-supplied correlation key echoed back by Click.
    pub merchant_trans_id: String,
    pub service_id: i64,
    pub merchant_id: i64,
    pub merchant_user_id: i64,
    pub merchant_prepare_id: Option<i64>,
    pub merchant_confirm_id: Option<i64>,
    /// Click's own transaction id (`click_trans_id`).
    pub payment_id: Option<i64>,
    pub pay_doc_id: Option<i64>,
    pub payment_status: i32,
    pub sign_time: String,
    pub sign_string: String,
    pub error_code: i32,
    pub error_note: String,
    pub link: String,
    pub return_url: Option<String>,
    pub params: Params,
}

impl ClickDetails {
    pub fn new(merchant_trans_id: impl Into<String>) -> Self {
        Self {
            merchant_trans_id: merchant_trans_id.into(),
            ..Default::default()
        }
    }

    pub fn with_merchant(mut self, service_id: i64, merchant_id: i64, merchant_user_id: i64) -> Self {
        self.service_id = service_id;
        self.merchant_id = merchant_id;
        self.merchant_user_id = merchant_user_id;
        self
    }

    pub fn with_merchant_prepare_id(mut self, id: i64) -> Self {
        self.merchant_prepare_id = Some(id);
        self
    }

    pub fn with_merchant_confirm_id(mut self, id: i64) -> Self {
        self.merchant_confirm_id = Some(id);
        self
    }

    pub fn with_payment_id(mut self, id: i64) -> Self {
        self.payment_id = Some(id);
        self
    }

    pub fn with_pay_doc_id(mut self, id: Option<i64>) -> Self {
        self.pay_doc_id = id;
        self
    }

    pub fn with_payment_status(mut self, status: i32) -> Self {
        self.payment_status = status;
        self
    }

    pub fn with_signature(mut self, sign_time: impl Into<String>, sign_string: impl Into<String>) -> Self {
        self.sign_time = sign_time.into();
        self.sign_string = sign_string.into();
        self
    }

    pub fn with_error(mut self, code: i32, note: impl Into<String>) -> Self {
        self.error_code = code;
        self.error_note = note.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_leave_original_untouched() {
        let original = ClickDetails::new("INV-1").with_error(0, "Success");
        let updated = original.clone().with_error(-9, "Transaction cancelled");
        assert_eq!(original.error_code, 0);
        assert_eq!(updated.error_code, -9);
        assert_eq!(updated.merchant_trans_id, "INV-1");
    }

    #[test]
    fn test_handshake_fields() {
        let details = ClickDetails::new("INV-2")
            .with_merchant(100, 200, 300)
            .with_payment_id(777)
            .with_merchant_prepare_id(1_700_000_000)
            .with_payment_status(0)
            .with_signature("2025-01-01 12:00:00", "abc");
        assert_eq!(details.service_id, 100);
        assert_eq!(details.payment_id, Some(777));
        assert_eq!(details.merchant_prepare_id, Some(1_700_000_000));
        assert_eq!(details.sign_string, "abc");
        assert!(details.merchant_confirm_id.is_none());
    }
}
