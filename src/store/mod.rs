pub mod memory;
pub mod snapshot;

pub use memory::InMemoryStore;
pub use snapshot::GraphSnapshot;

use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;

/// Read access to person records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn get_person(&self, person_id: PersonId) -> Result<Option<Person>>;
}

/// Kinship edge storage.
///
/// Rows are keyed by `(person_id, related_person_id)`; the mirror of a row is
/// the row with the ids swapped. Pair operations must be atomic: either both
/// rows are written or neither is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Active outgoing edges of a person, in store order
    async fn get_active_edges(&self, person_id: PersonId) -> Result<Vec<KinshipEdge>>;

    async fn get_edge(&self, edge_id: EdgeId) -> Result<Option<KinshipEdge>>;

    async fn find_edge(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
    ) -> Result<Option<KinshipEdge>>;

    /// Every row, active or not
    async fn all_edges(&self) -> Result<Vec<KinshipEdge>>;

    async fn create_edge_pair(&self, primary: NewEdge, inverse: NewEdge) -> Result<EdgePair>;

    /// Apply the update to the edge and, when present, its mirror row
    async fn update_edge_pair(&self, edge_id: EdgeId, update: EdgeUpdate) -> Result<EdgePair>;

    /// Remove the edge and, when present, its mirror row
    async fn delete_edge_pair(&self, edge_id: EdgeId) -> Result<()>;

    /// Write the single missing mirror of an existing row (repair only)
    async fn insert_missing_inverse(&self, edge: NewEdge) -> Result<KinshipEdge>;
}
