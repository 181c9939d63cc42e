use thiserror::Error;

use crate::types::{EdgeId, PersonId, RelationshipType};

/// Error taxonomy shared by the consistency engine and the finders
#[derive(Error, Debug)]
pub enum KinshipError {
    /// Referenced person absent from the person store
    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),

    /// Referenced edge absent from the edge store
    #[error("Relationship edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Malformed request, rejected before any traversal or write
    #[error("Validation error: {0}")]
    Validation(String),

    /// The gender-dependent inverse of an edge cannot be computed
    #[error("Cannot determine inverse of {relationship_type} for person {person_id}: {reason}")]
    IndeterminateInverse {
        person_id: PersonId,
        relationship_type: RelationshipType,
        reason: String,
    },

    /// Failure reported by an underlying store
    #[error("Store error: {0}")]
    Store(String),

    #[error("Query timed out after {0}s")]
    Timeout(u64),
}

impl KinshipError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KinshipError::PersonNotFound(_) | KinshipError::EdgeNotFound(_)
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        KinshipError::Validation(message.into())
    }
}

/// Convenient Result type using KinshipError
pub type Result<T> = std::result::Result<T, KinshipError>;
