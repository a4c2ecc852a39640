//! Transaction status and its transition table.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// Lifecycle status of a billing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Completed,
    Canceled,
    Refunded,
    PartiallyRefunded,
    Failed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::Completed,
        Status::Canceled,
        Status::Refunded,
        Status::PartiallyRefunded,
        Status::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Canceled => "canceled",
            Status::Refunded => "refunded",
            Status::PartiallyRefunded => "partially_refunded",
            Status::Failed => "failed",
        }
    }

    /// Whether `self -> to` is an allowed edge.
    ///
    /// Re-applying the current status is accepted so that replayed
    /// deliveries become no-op writes.
    pub fn can_transition_to(&self, to: Status) -> bool {
        use Status::*;
        *self == to
            || matches!(
                (self, to),
                (Pending, Completed)
                    | (Pending, Canceled)
                    | (Pending, Failed)
                    | (Completed, Refunded)
                    | (Completed, PartiallyRefunded)
                    | (PartiallyRefunded, Refunded)
            )
    }

    /// Validates `self -> to`, returning the new status.
    pub fn transition(self, to: Status) -> Result<Status, DomainError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(DomainError::InvalidTransition { from: self, to })
        }
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self, Status::Completed | Status::PartiallyRefunded)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    const EDGES: [(Status, Status); 6] = [
        (Pending, Completed),
        (Pending, Canceled),
        (Pending, Failed),
        (Completed, Refunded),
        (Completed, PartiallyRefunded),
        (PartiallyRefunded, Refunded),
    ];

    #[test]
    fn test_listed_edges_are_allowed() {
        for (from, to) in EDGES {
            assert_eq!(from.transition(to).unwrap(), to);
        }
    }

    #[test]
    fn test_every_other_edge_is_rejected() {
        for from in Status::ALL {
            for to in Status::ALL {
                if from == to || EDGES.contains(&(from, to)) {
                    continue;
                }
                assert!(
                    matches!(
                        from.transition(to),
                        Err(DomainError::InvalidTransition { .. })
                    ),
                    "{from} -> {to} must be rejected"
                );
            }
        }
    }

    #[test]
    fn test_replay_is_noop() {
        for status in Status::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_backward_move_rejected() {
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Completed));
    }
}
