use serde::{Deserialize, Serialize};

/// Octo payload. Sums reported by Octo are in major units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctoDetails {
    pub octo_shop_id: i64,
    pub shop_transaction_id: String,
    #[serde(rename = "octo_payment_UUID")]
    pub octo_payment_uuid: String,
    pub init_time: String,
    pub auto_capture: bool,
    /// Sandbox flag.
    pub test: bool,
    pub status: String,
    pub description: String,
    pub card_type: String,
    pub card_country: String,
    pub card_is_physical: bool,
    pub card_masked_pan: String,
    pub rrn: String,
    pub risk_level: i32,
    pub refunded_sum: f64,
    pub transfer_sum: f64,
    pub return_url: String,
    pub notify_url: String,
    pub octo_pay_url: String,
    pub signature: String,
    pub hash_key: String,
    pub payed_time: String,
    pub error: i32,
    pub err_message: String,
}

impl OctoDetails {
    pub fn new(shop_transaction_id: impl Into<String>) -> Self {
        Self {
            shop_transaction_id: shop_transaction_id.into(),
            auto_capture: true,
            ..Default::default()
        }
    }

    pub fn with_shop_id(mut self, shop_id: i64) -> Self {
        self.octo_shop_id = shop_id;
        self
    }

    pub fn with_payment(mut self, uuid: impl Into<String>, pay_url: impl Into<String>) -> Self {
        self.octo_payment_uuid = uuid.into();
        self.octo_pay_url = pay_url.into();
        self
    }

    pub fn with_flags(mut self, auto_capture: bool, test: bool) -> Self {
        self.auto_capture = auto_capture;
        self.test = test;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_card(
        mut self,
        card_type: impl Into<String>,
        country: impl Into<String>,
        masked_pan: impl Into<String>,
        is_physical: bool,
    ) -> Self {
        self.card_type = card_type.into();
        self.card_country = country.into();
        self.card_masked_pan = masked_pan.into();
        self.card_is_physical = is_physical;
        self
    }

    pub fn with_rrn(mut self, rrn: impl Into<String>) -> Self {
        self.rrn = rrn.into();
        self
    }

    pub fn with_risk_level(mut self, level: i32) -> Self {
        self.risk_level = level;
        self
    }

    pub fn with_sums(mut self, refunded_sum: f64, transfer_sum: f64) -> Self {
        self.refunded_sum = refunded_sum;
        self.transfer_sum = transfer_sum;
        self
    }

    pub fn with_urls(mut self, return_url: impl Into<String>, notify_url: impl Into<String>) -> Self {
        self.return_url = return_url.into();
        self.notify_url = notify_url.into();
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>, hash_key: impl Into<String>) -> Self {
        self.signature = signature.into();
        self.hash_key = hash_key.into();
        self
    }

    pub fn with_payed_time(mut self, payed_time: impl Into<String>) -> Self {
        self.payed_time = payed_time.into();
        self
    }

    pub fn with_init_time(mut self, init_time: impl Into<String>) -> Self {
        self.init_time = init_time.into();
        self
    }

    pub fn with_error(mut self, code: i32, message: impl Into<String>) -> Self {
        self.error = code;
        self.err_message = message.into();
        self
    }
}
