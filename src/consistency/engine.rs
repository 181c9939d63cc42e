use crate::consistency::inverse::InverseResolver;
use crate::error::{KinshipError, Result};
use crate::store::{EdgeStore, PersonStore};
use crate::types::*;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Single write path for kinship edges. Every write goes through here so the
/// store never holds an edge without its inverse.
#[derive(Clone)]
pub struct ConsistencyEngine {
    pub(crate) persons: Arc<dyn PersonStore>,
    pub(crate) edges: Arc<dyn EdgeStore>,
    pub(crate) resolver: InverseResolver,
}

impl ConsistencyEngine {
    pub fn new(
        persons: Arc<dyn PersonStore>,
        edges: Arc<dyn EdgeStore>,
        resolver: InverseResolver,
    ) -> Self {
        Self {
            persons,
            edges,
            resolver,
        }
    }

    pub fn resolver(&self) -> &InverseResolver {
        &self.resolver
    }

    /// Create `(person_id, related_person_id, relationship_type)` together with its inverse
    #[instrument(skip(self), fields(relationship = %relationship_type))]
    pub async fn create(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
        relationship_type: RelationshipType,
    ) -> Result<EdgePair> {
        if person_id == related_person_id {
            return Err(KinshipError::validation(format!(
                "person {} cannot be related to themselves",
                person_id
            )));
        }

        let (origin, related) = futures::try_join!(
            self.persons.get_person(person_id),
            self.persons.get_person(related_person_id),
        )?;
        let origin = origin.ok_or(KinshipError::PersonNotFound(person_id))?;
        let related = related.ok_or(KinshipError::PersonNotFound(related_person_id))?;

        let inverse_type = self.resolver.inverse_for(&origin, relationship_type)?;
        self.resolver.check_related_gender(&related, relationship_type)?;

        let (forward, backward) = futures::try_join!(
            self.edges.find_edge(person_id, related_person_id),
            self.edges.find_edge(related_person_id, person_id),
        )?;
        if let Some(existing) = forward.or(backward) {
            return Err(KinshipError::validation(format!(
                "persons {} and {} are already related (edge {}: {})",
                person_id, related_person_id, existing.edge_id, existing.relationship_type
            )));
        }

        let pair = self
            .edges
            .create_edge_pair(
                NewEdge::active(person_id, related_person_id, relationship_type),
                NewEdge::active(related_person_id, person_id, inverse_type),
            )
            .await?;

        metrics::counter!("kinship_edge_pairs_created_total", 1);
        info!(
            "Created edge pair {} -[{}]-> {} / {} -[{}]-> {}",
            person_id, relationship_type, related_person_id, related_person_id, inverse_type, person_id
        );
        Ok(pair)
    }

    /// Update the symmetric fields of an edge and its inverse
    #[instrument(skip(self, update))]
    pub async fn update(&self, edge_id: EdgeId, update: EdgeUpdate) -> Result<EdgePair> {
        if let Some(requested) = update.relationship_type {
            return Err(KinshipError::validation(format!(
                "relationship type of edge {} is immutable (requested {}); delete and recreate the pair instead",
                edge_id, requested
            )));
        }
        if update.is_empty() {
            return Err(KinshipError::validation("update contains no fields"));
        }

        let current = self
            .edges
            .get_edge(edge_id)
            .await?
            .ok_or(KinshipError::EdgeNotFound(edge_id))?;

        let mut preview = current.clone();
        update.apply_to(&mut preview);
        if let (Some(start), Some(end)) = (preview.start_date, preview.end_date) {
            if start > end {
                return Err(KinshipError::validation(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }

        let pair = self.edges.update_edge_pair(edge_id, update).await?;
        if pair.inverse.is_none() {
            debug!("Edge {} has no inverse yet; run repair to restore symmetry", edge_id);
        }

        metrics::counter!("kinship_edge_pairs_updated_total", 1);
        info!("Updated edge pair for edge {}", edge_id);
        Ok(pair)
    }

    /// Delete an edge and its inverse
    #[instrument(skip(self))]
    pub async fn delete(&self, edge_id: EdgeId) -> Result<()> {
        let edge = self
            .edges
            .get_edge(edge_id)
            .await?
            .ok_or(KinshipError::EdgeNotFound(edge_id))?;

        self.edges.delete_edge_pair(edge_id).await?;

        metrics::counter!("kinship_edge_pairs_deleted_total", 1);
        info!(
            "Deleted edge pair between {} and {}",
            edge.person_id, edge.related_person_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, MockPersonStore};
    use crate::test_support::{family_store, person};
    use chrono::NaiveDate;

    fn engine_for(store: Arc<InMemoryStore>) -> ConsistencyEngine {
        ConsistencyEngine::new(store.clone(), store, InverseResolver::default())
    }

    async fn assert_symmetric(store: &InMemoryStore) {
        let resolver = InverseResolver::default();
        for edge in store.all_edges().await.unwrap() {
            if !edge.is_active {
                continue;
            }
            let origin = store.get_person(edge.person_id).await.unwrap().unwrap();
            let expected = resolver.inverse_for(&origin, edge.relationship_type).unwrap();
            let mirror = store
                .find_edge(edge.related_person_id, edge.person_id)
                .await
                .unwrap()
                .expect("mirror row");
            assert!(mirror.is_active);
            assert_eq!(mirror.relationship_type, expected);
        }
    }

    #[tokio::test]
    async fn test_create_writes_gender_correct_inverse() {
        let store = Arc::new(family_store(vec![person(1, Some(2)), person(2, Some(1))], vec![]));
        let engine = engine_for(store.clone());

        // Person 2 is the father of person 1, who is female
        let pair = engine.create(1, 2, RelationshipType::Father).await.unwrap();

        assert_eq!(pair.inverse.unwrap().relationship_type, RelationshipType::Daughter);
        assert_symmetric(&store).await;
    }

    #[tokio::test]
    async fn test_spouse_edges_do_not_need_gender() {
        let store = Arc::new(family_store(vec![person(1, None), person(2, None)], vec![]));
        let engine = engine_for(store.clone());

        let pair = engine.create(1, 2, RelationshipType::Husband).await.unwrap();
        assert_eq!(pair.inverse.unwrap().relationship_type, RelationshipType::Wife);

        let err = engine.delete(pair.primary.edge_id).await;
        assert!(err.is_ok());
        assert_eq!(store.edge_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_gender_blocks_parent_edges() {
        let store = Arc::new(family_store(vec![person(1, None), person(2, Some(1))], vec![]));
        let engine = engine_for(store.clone());

        let err = engine.create(1, 2, RelationshipType::Father).await.unwrap_err();
        assert!(matches!(err, KinshipError::IndeterminateInverse { person_id: 1, .. }));

        // Unknown gender on the related side is also indeterminate
        let err = engine.create(2, 1, RelationshipType::Son).await.unwrap_err();
        assert!(matches!(err, KinshipError::IndeterminateInverse { person_id: 1, .. }));

        assert_eq!(store.edge_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_requests() {
        let store = Arc::new(family_store(vec![person(1, Some(1)), person(2, Some(2))], vec![]));
        let engine = engine_for(store.clone());

        assert!(matches!(
            engine.create(1, 1, RelationshipType::Spouse).await,
            Err(KinshipError::Validation(_))
        ));
        assert!(matches!(
            engine.create(1, 9, RelationshipType::Spouse).await,
            Err(KinshipError::PersonNotFound(9))
        ));
        // Person 2 is female and cannot be a father
        assert!(matches!(
            engine.create(1, 2, RelationshipType::Father).await,
            Err(KinshipError::Validation(_))
        ));

        engine.create(1, 2, RelationshipType::Wife).await.unwrap();
        assert!(matches!(
            engine.create(2, 1, RelationshipType::Husband).await,
            Err(KinshipError::Validation(_))
        ));
        assert_eq!(store.edge_count().await, 2);
    }

    #[tokio::test]
    async fn test_update_mirrors_onto_inverse() {
        let store = Arc::new(family_store(vec![person(1, Some(1)), person(2, Some(2))], vec![]));
        let engine = engine_for(store.clone());
        let pair = engine.create(1, 2, RelationshipType::Wife).await.unwrap();
        let inverse_id = pair.inverse.unwrap().edge_id;

        let updated = engine
            .update(
                pair.primary.edge_id,
                EdgeUpdate {
                    is_active: Some(false),
                    end_date: NaiveDate::from_ymd_opt(2020, 3, 1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.primary.is_active);

        let inverse = store.get_edge(inverse_id).await.unwrap().unwrap();
        assert!(!inverse.is_active);
        assert_eq!(inverse.end_date, NaiveDate::from_ymd_opt(2020, 3, 1));
    }

    #[tokio::test]
    async fn test_update_rejects_retyping_and_bad_dates() {
        let store = Arc::new(family_store(vec![person(1, Some(1)), person(2, Some(2))], vec![]));
        let engine = engine_for(store.clone());
        let pair = engine.create(1, 2, RelationshipType::Wife).await.unwrap();

        let retype = EdgeUpdate {
            relationship_type: Some(RelationshipType::Spouse),
            ..Default::default()
        };
        assert!(matches!(
            engine.update(pair.primary.edge_id, retype).await,
            Err(KinshipError::Validation(_))
        ));

        let inverted_dates = EdgeUpdate {
            start_date: NaiveDate::from_ymd_opt(2010, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2000, 1, 1),
            ..Default::default()
        };
        assert!(matches!(
            engine.update(pair.primary.edge_id, inverted_dates).await,
            Err(KinshipError::Validation(_))
        ));

        assert!(matches!(
            engine
                .update(
                    999,
                    EdgeUpdate {
                        is_active: Some(true),
                        ..Default::default()
                    }
                )
                .await,
            Err(KinshipError::EdgeNotFound(999))
        ));

        let edge = store.get_edge(pair.primary.edge_id).await.unwrap().unwrap();
        assert_eq!(edge.relationship_type, RelationshipType::Wife);
        assert!(edge.start_date.is_none());
    }

    #[tokio::test]
    async fn test_person_store_failure_propagates() {
        let mut persons = MockPersonStore::new();
        persons
            .expect_get_person()
            .returning(|_| Err(KinshipError::Store("connection reset".to_string())));
        let edges = Arc::new(InMemoryStore::new());
        let engine = ConsistencyEngine::new(Arc::new(persons), edges.clone(), InverseResolver::default());

        let err = engine.create(1, 2, RelationshipType::Spouse).await.unwrap_err();
        assert!(matches!(err, KinshipError::Store(_)));
        assert_eq!(edges.edge_count().await, 0);
    }
}
