use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Acting principal attached to every engine call and audit entry.
///
/// Automated transitions use the reserved [`Principal::System`] variant,
/// which serializes to the all-zero UUID so the audit trail never carries a
/// nullable identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// A human operator identified by their stable account id.
    Human {
        /// Stable account identifier of the operator.
        id: Uuid,
    },
    /// The engine itself, for automated transitions.
    System,
}

impl Principal {
    /// Creates a human principal from an account id.
    #[must_use]
    pub fn human(id: Uuid) -> Self {
        Self::Human { id }
    }

    /// Returns the stable audit identifier; the all-zero UUID denotes the
    /// system sentinel.
    #[must_use]
    pub fn audit_id(&self) -> Uuid {
        match self {
            Self::Human { id } => *id,
            Self::System => Uuid::nil(),
        }
    }

    /// Reconstructs a principal from a stored audit identifier.
    #[must_use]
    pub fn from_audit_id(id: Uuid) -> Self {
        if id.is_nil() {
            Self::System
        } else {
            Self::Human { id }
        }
    }

    /// Returns whether this is the automated system principal.
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl Display for Principal {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human { id } => write!(formatter, "{id}"),
            Self::System => write!(formatter, "system"),
        }
    }
}
