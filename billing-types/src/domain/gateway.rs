//! Payment gateway tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// Which payment gateway a transaction belongs to.
///
/// The tag selects the legal `TransactionDetails` variant and whether a
/// remote provider is involved at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Stripe,
    Click,
    Payme,
    Octo,
    Cash,
    Integrator,
}

impl Gateway {
    pub const ALL: [Gateway; 6] = [
        Gateway::Stripe,
        Gateway::Click,
        Gateway::Payme,
        Gateway::Octo,
        Gateway::Cash,
        Gateway::Integrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Stripe => "stripe",
            Gateway::Click => "click",
            Gateway::Payme => "payme",
            Gateway::Octo => "octo",
            Gateway::Cash => "cash",
            Gateway::Integrator => "integrator",
        }
    }

    /// Gateways with a remote counterpart reached through a provider.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Gateway::Cash | Gateway::Integrator)
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gateway {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gateway::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::Validation(format!("unknown gateway: {s}")))
    }
}
