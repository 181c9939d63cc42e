use crate::error::{KinshipError, Result};
use crate::store::snapshot::{GraphSnapshot, SnapshotEdge};
use crate::store::{EdgeStore, PersonStore};
use crate::types::*;
use async_trait::async_trait;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory reference store backed by a petgraph `StableDiGraph`.
///
/// Nodes carry person ids, edge weights carry edge ids; the full rows live in
/// side tables so that edge indices stay valid across removals.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<GraphState>,
}

#[derive(Debug, Default)]
struct GraphState {
    graph: StableDiGraph<PersonId, EdgeId>,
    node_map: HashMap<PersonId, NodeIndex>,
    persons: HashMap<PersonId, Person>,
    edges: HashMap<EdgeId, KinshipEdge>,
    edge_index: HashMap<EdgeId, EdgeIndex>,
    next_edge_id: EdgeId,
}

impl GraphState {
    fn ensure_node(&mut self, person_id: PersonId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&person_id) {
            return index;
        }
        let index = self.graph.add_node(person_id);
        self.node_map.insert(person_id, index);
        index
    }

    fn find_edge_id(&self, person_id: PersonId, related_person_id: PersonId) -> Option<EdgeId> {
        let from = self.node_map.get(&person_id)?;
        let to = self.node_map.get(&related_person_id)?;
        let edge_index = self.graph.find_edge(*from, *to)?;
        self.graph.edge_weight(edge_index).copied()
    }

    fn key_taken(&self, person_id: PersonId, related_person_id: PersonId) -> bool {
        self.find_edge_id(person_id, related_person_id).is_some()
    }

    fn allocate_edge_id(&mut self) -> EdgeId {
        self.next_edge_id += 1;
        self.next_edge_id
    }

    /// Caller has already checked the key is free
    fn insert_row(&mut self, edge: KinshipEdge) -> KinshipEdge {
        let from = self.ensure_node(edge.person_id);
        let to = self.ensure_node(edge.related_person_id);
        let edge_index = self.graph.add_edge(from, to, edge.edge_id);

        self.next_edge_id = self.next_edge_id.max(edge.edge_id);
        self.edge_index.insert(edge.edge_id, edge_index);
        self.edges.insert(edge.edge_id, edge.clone());
        edge
    }

    fn materialize(&mut self, new_edge: NewEdge) -> KinshipEdge {
        KinshipEdge {
            edge_id: self.allocate_edge_id(),
            person_id: new_edge.person_id,
            related_person_id: new_edge.related_person_id,
            relationship_type: new_edge.relationship_type,
            is_active: new_edge.is_active,
            start_date: new_edge.start_date,
            end_date: new_edge.end_date,
        }
    }

    fn remove_row(&mut self, edge_id: EdgeId) -> Option<KinshipEdge> {
        let edge_index = self.edge_index.remove(&edge_id)?;
        self.graph.remove_edge(edge_index);
        self.edges.remove(&edge_id)
    }

    fn mirror_of(&self, edge: &KinshipEdge) -> Option<EdgeId> {
        let (person_id, related_person_id) = edge.mirror_key();
        self.find_edge_id(person_id, related_person_id)
    }

    fn conflict(person_id: PersonId, related_person_id: PersonId) -> KinshipError {
        KinshipError::Store(format!(
            "edge between {} and {} already exists",
            person_id, related_person_id
        ))
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot. Rows are loaded as given; missing
    /// inverses are not synthesized here.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut state = GraphState::default();

        for person in snapshot.persons {
            state.ensure_node(person.person_id);
            state.persons.insert(person.person_id, person);
        }

        // Rows with explicit ids first so generated ids never collide with them
        let (with_ids, without_ids): (Vec<SnapshotEdge>, Vec<SnapshotEdge>) = snapshot
            .edges
            .into_iter()
            .partition(|row| row.edge_id.is_some());

        for row in with_ids.into_iter().chain(without_ids) {
            if state.key_taken(row.person_id, row.related_person_id) {
                return Err(GraphState::conflict(row.person_id, row.related_person_id));
            }
            let edge_id = match row.edge_id {
                Some(edge_id) if state.edges.contains_key(&edge_id) => {
                    return Err(KinshipError::Store(format!("duplicate edge id {}", edge_id)));
                }
                Some(edge_id) => edge_id,
                None => state.allocate_edge_id(),
            };
            state.insert_row(row.into_edge(edge_id));
        }

        debug!(
            "Loaded in-memory graph with {} nodes and {} edges",
            state.graph.node_count(),
            state.graph.edge_count()
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    pub async fn insert_person(&self, person: Person) {
        let mut state = self.state.write().await;
        state.ensure_node(person.person_id);
        state.persons.insert(person.person_id, person);
    }

    /// Insert a single raw row, bypassing pair semantics (imports, fixtures)
    pub async fn insert_edge_row(&self, new_edge: NewEdge) -> Result<KinshipEdge> {
        let mut state = self.state.write().await;
        if state.key_taken(new_edge.person_id, new_edge.related_person_id) {
            return Err(GraphState::conflict(new_edge.person_id, new_edge.related_person_id));
        }
        let edge = state.materialize(new_edge);
        Ok(state.insert_row(edge))
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read().await;

        let mut persons: Vec<Person> = state.persons.values().cloned().collect();
        persons.sort_by_key(|person| person.person_id);

        let mut edges: Vec<SnapshotEdge> = state.edges.values().map(SnapshotEdge::from).collect();
        edges.sort_by_key(|row| row.edge_id);

        GraphSnapshot { persons, edges }
    }

    pub async fn person_count(&self) -> usize {
        self.state.read().await.persons.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.read().await.graph.edge_count()
    }
}

#[async_trait]
impl PersonStore for InMemoryStore {
    async fn get_person(&self, person_id: PersonId) -> Result<Option<Person>> {
        Ok(self.state.read().await.persons.get(&person_id).cloned())
    }
}

#[async_trait]
impl EdgeStore for InMemoryStore {
    async fn get_active_edges(&self, person_id: PersonId) -> Result<Vec<KinshipEdge>> {
        let state = self.state.read().await;
        let node_index = match state.node_map.get(&person_id) {
            Some(index) => *index,
            None => return Ok(Vec::new()),
        };

        let edges = state
            .graph
            .edges(node_index)
            .filter_map(|edge_ref| state.edges.get(edge_ref.weight()))
            .filter(|edge| edge.is_active)
            .cloned()
            .collect();

        Ok(edges)
    }

    async fn get_edge(&self, edge_id: EdgeId) -> Result<Option<KinshipEdge>> {
        Ok(self.state.read().await.edges.get(&edge_id).cloned())
    }

    async fn find_edge(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
    ) -> Result<Option<KinshipEdge>> {
        let state = self.state.read().await;
        Ok(state
            .find_edge_id(person_id, related_person_id)
            .and_then(|edge_id| state.edges.get(&edge_id))
            .cloned())
    }

    async fn all_edges(&self) -> Result<Vec<KinshipEdge>> {
        let state = self.state.read().await;
        let mut edges: Vec<KinshipEdge> = state.edges.values().cloned().collect();
        edges.sort_by_key(|edge| edge.edge_id);
        Ok(edges)
    }

    async fn create_edge_pair(&self, primary: NewEdge, inverse: NewEdge) -> Result<EdgePair> {
        if primary.person_id != inverse.related_person_id
            || primary.related_person_id != inverse.person_id
        {
            return Err(KinshipError::Store(
                "inverse edge must swap the primary edge's endpoints".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        // Both keys are checked before either row is written
        if state.key_taken(primary.person_id, primary.related_person_id) {
            return Err(GraphState::conflict(primary.person_id, primary.related_person_id));
        }
        if state.key_taken(inverse.person_id, inverse.related_person_id) {
            return Err(GraphState::conflict(inverse.person_id, inverse.related_person_id));
        }

        let primary = state.materialize(primary);
        let primary = state.insert_row(primary);
        let inverse = state.materialize(inverse);
        let inverse = state.insert_row(inverse);

        Ok(EdgePair {
            primary,
            inverse: Some(inverse),
        })
    }

    async fn update_edge_pair(&self, edge_id: EdgeId, update: EdgeUpdate) -> Result<EdgePair> {
        let mut state = self.state.write().await;

        let mut primary = state
            .edges
            .get(&edge_id)
            .cloned()
            .ok_or(KinshipError::EdgeNotFound(edge_id))?;
        let mut inverse = state
            .mirror_of(&primary)
            .and_then(|mirror_id| state.edges.get(&mirror_id))
            .cloned();

        update.apply_to(&mut primary);
        if let Some(inverse) = inverse.as_mut() {
            update.apply_to(inverse);
            state.edges.insert(inverse.edge_id, inverse.clone());
        }
        state.edges.insert(primary.edge_id, primary.clone());

        Ok(EdgePair { primary, inverse })
    }

    async fn delete_edge_pair(&self, edge_id: EdgeId) -> Result<()> {
        let mut state = self.state.write().await;

        let primary = state
            .edges
            .get(&edge_id)
            .cloned()
            .ok_or(KinshipError::EdgeNotFound(edge_id))?;

        if let Some(mirror_id) = state.mirror_of(&primary) {
            state.remove_row(mirror_id);
        } else {
            debug!("Edge {} has no mirror row to delete", edge_id);
        }
        state.remove_row(edge_id);

        Ok(())
    }

    async fn insert_missing_inverse(&self, edge: NewEdge) -> Result<KinshipEdge> {
        let mut state = self.state.write().await;

        if state.find_edge_id(edge.related_person_id, edge.person_id).is_none() {
            return Err(KinshipError::Store(format!(
                "no edge from {} to {} to mirror",
                edge.related_person_id, edge.person_id
            )));
        }
        if state.key_taken(edge.person_id, edge.related_person_id) {
            return Err(GraphState::conflict(edge.person_id, edge.related_person_id));
        }

        let edge = state.materialize(edge);
        Ok(state.insert_row(edge))
    }
}
