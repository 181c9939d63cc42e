use crate::config::{Config, TraversalSettings};
use crate::consistency::{ConsistencyEngine, InvariantViolation, InverseResolver, RepairReport};
use crate::error::{KinshipError, Result};
use crate::store::{EdgeStore, InMemoryStore, PersonStore};
use crate::traversal::{
    LineagePathFinder, LineagePathResult, PartnerMatchFinder, PartnerMatchRequest,
    PartnerMatchResult, RelativesFinder, RelativesRequest, RelativesResult,
};
use crate::types::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Entry point wiring the stores, the gender table, the three finders and
/// the consistency engine together
pub struct KinshipService {
    engine: ConsistencyEngine,
    lineage: LineagePathFinder,
    partners: PartnerMatchFinder,
    relatives: RelativesFinder,
    settings: TraversalSettings,
}

impl KinshipService {
    pub fn new(persons: Arc<dyn PersonStore>, edges: Arc<dyn EdgeStore>, config: &Config) -> Self {
        let settings = config.traversal.clone();
        let genders = config.gender_table();

        let engine = ConsistencyEngine::new(
            persons.clone(),
            edges.clone(),
            InverseResolver::new(genders.clone()),
        );
        let lineage = LineagePathFinder::new(persons.clone(), edges.clone());
        let partners = PartnerMatchFinder::new(
            persons.clone(),
            edges.clone(),
            genders,
            settings.default_partner_max_depth,
            settings.max_depth_limit,
        );
        let relatives = RelativesFinder::new(
            persons,
            edges,
            settings.max_depth_limit,
            settings.default_living_only,
        );

        Self {
            engine,
            lineage,
            partners,
            relatives,
            settings,
        }
    }

    /// Service backed by a single in-memory store for both persons and edges
    pub fn in_memory(store: Arc<InMemoryStore>, config: &Config) -> Self {
        Self::new(store.clone(), store, config)
    }

    pub fn engine(&self) -> &ConsistencyEngine {
        &self.engine
    }

    #[instrument(skip(self))]
    pub async fn find_lineage_path(
        &self,
        person_a_id: PersonId,
        person_b_id: PersonId,
    ) -> Result<LineagePathResult> {
        let result = self
            .run_query("lineage", self.lineage.find(person_a_id, person_b_id))
            .await?;
        info!(
            "Lineage {} -> {}: {}",
            person_a_id, person_b_id, result.message
        );
        Ok(result)
    }

    #[instrument(skip(self, request), fields(seeker_id = request.seeker_id))]
    pub async fn find_partner_matches(&self, request: &PartnerMatchRequest) -> Result<PartnerMatchResult> {
        let result = self.run_query("partners", self.partners.find(request)).await?;
        metrics::histogram!("kinship_partner_matches", result.total_matches as f64);
        info!(
            "Partner search for {} found {} matches",
            request.seeker_id, result.total_matches
        );
        Ok(result)
    }

    #[instrument(skip(self, request), fields(person_id = request.person_id))]
    pub async fn find_relatives_network(&self, request: &RelativesRequest) -> Result<RelativesResult> {
        let result = self.run_query("relatives", self.relatives.find(request)).await?;
        info!(
            "Relatives of {} ({} {}): {}",
            request.person_id, result.depth_mode, result.depth, result.total_count
        );
        Ok(result)
    }

    pub async fn create_link(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
        relationship_type: RelationshipType,
    ) -> Result<EdgePair> {
        self.engine
            .create(person_id, related_person_id, relationship_type)
            .await
    }

    pub async fn update_link(&self, edge_id: EdgeId, update: EdgeUpdate) -> Result<EdgePair> {
        self.engine.update(edge_id, update).await
    }

    pub async fn delete_link(&self, edge_id: EdgeId) -> Result<()> {
        self.engine.delete(edge_id).await
    }

    pub async fn check(&self) -> Result<Vec<InvariantViolation>> {
        self.engine.check().await
    }

    pub async fn repair(&self) -> Result<RepairReport> {
        self.engine.repair().await
    }

    /// Run one query under the configured timeout, recording its outcome
    async fn run_query<T, F>(&self, query: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let query_id = Uuid::new_v4();
        let started = Instant::now();
        let timeout_seconds = self.settings.query_timeout_seconds;

        let outcome = match timeout(Duration::from_secs(timeout_seconds), future).await {
            Ok(result) => result,
            Err(_) => Err(KinshipError::Timeout(timeout_seconds)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        metrics::histogram!("kinship_query_duration_seconds", elapsed, "query" => query);
        match &outcome {
            Ok(_) => {
                metrics::counter!("kinship_queries_total", 1, "query" => query, "outcome" => "ok");
                info!("Query {} ({}) completed in {:.3}s", query_id, query, elapsed);
            }
            Err(e) => {
                metrics::counter!("kinship_queries_total", 1, "query" => query, "outcome" => "error");
                warn!("Query {} ({}) failed after {:.3}s: {}", query_id, query, elapsed, e);
            }
        }
        outcome
    }
}
