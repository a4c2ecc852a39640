//! Gateway-specific transaction payloads.
//!
//! Each gateway has exactly one details variant. The persisted JSON document
//! carries no type tag of its own: decoding always dispatches on the
//! transaction's `gateway` column.

mod cash;
mod click;
mod integrator;
mod octo;
mod payme;
mod stripe;

pub use cash::CashDetails;
pub use click::ClickDetails;
pub use integrator::IntegratorDetails;
pub use octo::OctoDetails;
pub use payme::{PaymeDetails, PaymeReceiver, PaymeState};
pub use stripe::{StripeDetails, StripeItem, StripeMode};

use serde::Serialize;
use serde_json::Value;

use super::gateway::Gateway;
use crate::error::DomainError;

/// Free-form key/value map stored inside details documents.
pub type Params = serde_json::Map<String, Value>;

/// Sum type over all gateway payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransactionDetails {
    Stripe(StripeDetails),
    Click(ClickDetails),
    Payme(PaymeDetails),
    Octo(OctoDetails),
    Cash(CashDetails),
    Integrator(IntegratorDetails),
}

impl TransactionDetails {
    /// The gateway this variant belongs to.
    pub fn gateway(&self) -> Gateway {
        match self {
            TransactionDetails::Stripe(_) => Gateway::Stripe,
            TransactionDetails::Click(_) => Gateway::Click,
            TransactionDetails::Payme(_) => Gateway::Payme,
            TransactionDetails::Octo(_) => Gateway::Octo,
            TransactionDetails::Cash(_) => Gateway::Cash,
            TransactionDetails::Integrator(_) => Gateway::Integrator,
        }
    }

    /// Serializes the payload into the stored document shape.
    pub fn to_json(&self) -> Result<Value, DomainError> {
        serde_json::to_value(self).map_err(|e| DomainError::Validation(e.to_string()))
    }

    /// Decodes a stored document into the variant selected by `gateway`.
    pub fn from_json(gateway: Gateway, value: Value) -> Result<Self, DomainError> {
        fn decode<T: serde::de::DeserializeOwned>(
            gateway: Gateway,
            value: Value,
        ) -> Result<T, DomainError> {
            serde_json::from_value(value)
                .map_err(|e| DomainError::Validation(format!("invalid {gateway} details: {e}")))
        }

        Ok(match gateway {
            Gateway::Stripe => TransactionDetails::Stripe(decode(gateway, value)?),
            Gateway::Click => TransactionDetails::Click(decode(gateway, value)?),
            Gateway::Payme => TransactionDetails::Payme(decode(gateway, value)?),
            Gateway::Octo => TransactionDetails::Octo(decode(gateway, value)?),
            Gateway::Cash => TransactionDetails::Cash(decode(gateway, value)?),
            Gateway::Integrator => TransactionDetails::Integrator(decode(gateway, value)?),
        })
    }

    pub fn as_stripe(&self) -> Option<&StripeDetails> {
        match self {
            TransactionDetails::Stripe(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_click(&self) -> Option<&ClickDetails> {
        match self {
            TransactionDetails::Click(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_payme(&self) -> Option<&PaymeDetails> {
        match self {
            TransactionDetails::Payme(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_octo(&self) -> Option<&OctoDetails> {
        match self {
            TransactionDetails::Octo(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_cash(&self) -> Option<&CashDetails> {
        match self {
            TransactionDetails::Cash(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_integrator(&self) -> Option<&IntegratorDetails> {
        match self {
            TransactionDetails::Integrator(d) => Some(d),
            _ => None,
        }
    }
}

impl From<StripeDetails> for TransactionDetails {
    fn from(d: StripeDetails) -> Self {
        TransactionDetails::Stripe(d)
    }
}

impl From<ClickDetails> for TransactionDetails {
    fn from(d: ClickDetails) -> Self {
        TransactionDetails::Click(d)
    }
}

impl From<PaymeDetails> for TransactionDetails {
    fn from(d: PaymeDetails) -> Self {
        TransactionDetails::Payme(d)
    }
}

impl From<OctoDetails> for TransactionDetails {
    fn from(d: OctoDetails) -> Self {
        TransactionDetails::Octo(d)
    }
}

impl From<CashDetails> for TransactionDetails {
    fn from(d: CashDetails) -> Self {
        TransactionDetails::Cash(d)
    }
}

impl From<IntegratorDetails> for TransactionDetails {
    fn from(d: IntegratorDetails) -> Self {
        TransactionDetails::Integrator(d)
    }
}
