use crate::error::{KinshipError, Result};
use crate::store::{EdgeStore, PersonStore};
use crate::traversal::primitives::{neighbors, ActiveEdges, Frontier, Visited};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineagePathResult {
    pub person_a_id: PersonId,
    pub person_b_id: PersonId,
    pub connection_found: bool,
    pub message: String,
    pub common_ancestor_id: Option<PersonId>,
    /// Person where the two searches met; equals the ancestor when there is one
    pub meeting_person_id: Option<PersonId>,
    /// Hop count of the shortest path
    pub distance: Option<Depth>,
    pub graph: BTreeMap<PersonId, LineageNode>,
    /// `[A, ..]` up to, not including, the meeting person
    pub path_a_to_common: Vec<PersonId>,
    /// `[B, ..]` up to, not including, the meeting person
    pub path_b_to_common: Vec<PersonId>,
}

/// Visited person in either search. `from_person` is the predecessor on the
/// side rooted at A, `to_person` the next hop towards B.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageNode {
    pub person_id: PersonId,
    pub depth_from_a: Option<Depth>,
    pub depth_from_b: Option<Depth>,
    pub from_person: Option<Connection>,
    pub to_person: Option<Connection>,
}

#[derive(Debug, Clone)]
struct LineageEntry {
    depth: Depth,
    from_person: Option<PersonId>,
    relationship_label: Option<RelationshipType>,
    /// Reached from the root through FATHER/MOTHER edges only
    ancestral: bool,
}

struct SearchSide {
    root: PersonId,
    frontier: Frontier,
    visited: Visited<LineageEntry>,
}

impl SearchSide {
    fn new(root: PersonId) -> Self {
        let mut visited = Visited::new();
        visited.mark(
            root,
            LineageEntry {
                depth: 0,
                from_person: None,
                relationship_label: None,
                ancestral: true,
            },
        );
        Self {
            root,
            frontier: Frontier::seeded(root),
            visited,
        }
    }

    /// Expand one full level; returns the persons discovered in it
    async fn expand_level(&mut self, edges: &dyn EdgeStore) -> Result<Vec<PersonId>> {
        let mut discovered = Vec::new();

        for (person_id, depth) in self.frontier.drain_level() {
            let parent_ancestral = self
                .visited
                .get(person_id)
                .map(|entry| entry.ancestral)
                .unwrap_or(false);

            for edge in neighbors(edges, person_id, &ActiveEdges).await? {
                let target = edge.related_person_id;
                let entry = LineageEntry {
                    depth: depth + 1,
                    from_person: Some(person_id),
                    relationship_label: Some(edge.relationship_type),
                    ancestral: parent_ancestral && edge.relationship_type.is_parent(),
                };
                if self.visited.mark(target, entry) {
                    self.frontier.push(target, depth + 1);
                    discovered.push(target);
                }
            }
        }

        Ok(discovered)
    }

    fn is_exhausted(&self) -> bool {
        self.frontier.is_empty()
    }

    fn is_ancestral(&self, person_id: PersonId) -> bool {
        self.visited
            .get(person_id)
            .map(|entry| entry.ancestral)
            .unwrap_or(false)
    }

    fn depth_of(&self, person_id: PersonId) -> Option<Depth> {
        self.visited.get(person_id).map(|entry| entry.depth)
    }

    /// Root-first path to `meeting`, excluding `meeting` itself
    fn path_to(&self, meeting: PersonId) -> Vec<PersonId> {
        let mut path = Vec::new();
        let mut current = self.visited.get(meeting).and_then(|entry| entry.from_person);

        while let Some(person_id) = current {
            path.push(person_id);
            current = self.visited.get(person_id).and_then(|entry| entry.from_person);
        }

        path.reverse();
        path
    }

    fn link_of(&self, person_id: PersonId) -> Option<Connection> {
        let entry = self.visited.get(person_id)?;
        Some(Connection {
            person_id: entry.from_person?,
            relationship_type: entry.relationship_label?,
        })
    }
}

/// Bidirectional breadth-first search between two persons
pub struct LineagePathFinder {
    persons: Arc<dyn PersonStore>,
    edges: Arc<dyn EdgeStore>,
}

impl LineagePathFinder {
    pub fn new(persons: Arc<dyn PersonStore>, edges: Arc<dyn EdgeStore>) -> Self {
        Self { persons, edges }
    }

    /// Shortest relationship path between `person_a_id` and `person_b_id`,
    /// plus their nearest common ancestor when the path goes through one
    #[instrument(skip(self))]
    pub async fn find(&self, person_a_id: PersonId, person_b_id: PersonId) -> Result<LineagePathResult> {
        let (person_a, person_b) = futures::try_join!(
            self.persons.get_person(person_a_id),
            self.persons.get_person(person_b_id),
        )?;
        person_a.ok_or(KinshipError::PersonNotFound(person_a_id))?;
        person_b.ok_or(KinshipError::PersonNotFound(person_b_id))?;

        let mut side_a = SearchSide::new(person_a_id);
        let mut side_b = SearchSide::new(person_b_id);

        if person_a_id == person_b_id {
            return Ok(Self::build_result(&side_a, &side_b, None, "Both ids refer to the same person"));
        }

        let edges = self.edges.as_ref();
        let mut meeting = None;

        while meeting.is_none() && !side_a.is_exhausted() && !side_b.is_exhausted() {
            let discovered = side_a.expand_level(edges).await?;
            meeting = Self::pick_meeting(&discovered, &side_a, &side_b);
            if meeting.is_some() || side_a.is_exhausted() {
                break;
            }

            let discovered = side_b.expand_level(edges).await?;
            meeting = Self::pick_meeting(&discovered, &side_b, &side_a);
        }

        debug!(
            "Lineage search visited {} persons from A and {} from B",
            side_a.visited.len(),
            side_b.visited.len()
        );

        let message = match meeting {
            Some(m) if side_a.is_ancestral(m) && side_b.is_ancestral(m) => {
                format!("Common ancestor found: person {}", m)
            }
            Some(m) => format!("Connection found through person {}", m),
            None => "No connection found between the two persons".to_string(),
        };
        Ok(Self::build_result(&side_a, &side_b, meeting, &message))
    }

    /// Among persons just discovered by `expanding`, those already seen by
    /// `other` are meeting points of equal total length. Prefer one that is
    /// an ancestor of both roots.
    fn pick_meeting(discovered: &[PersonId], expanding: &SearchSide, other: &SearchSide) -> Option<PersonId> {
        let mut candidates = discovered
            .iter()
            .copied()
            .filter(|person_id| other.visited.contains(*person_id))
            .peekable();

        let first = *candidates.peek()?;
        let ancestral = candidates
            .find(|person_id| expanding.is_ancestral(*person_id) && other.is_ancestral(*person_id));
        Some(ancestral.unwrap_or(first))
    }

    fn build_result(
        side_a: &SearchSide,
        side_b: &SearchSide,
        meeting: Option<PersonId>,
        message: &str,
    ) -> LineagePathResult {
        let mut graph: BTreeMap<PersonId, LineageNode> = BTreeMap::new();

        for (person_id, entry) in side_a.visited.iter() {
            let node = graph.entry(person_id).or_insert_with(|| LineageNode::empty(person_id));
            node.depth_from_a = Some(entry.depth);
            node.from_person = side_a.link_of(person_id);
        }
        for (person_id, entry) in side_b.visited.iter() {
            let node = graph.entry(person_id).or_insert_with(|| LineageNode::empty(person_id));
            node.depth_from_b = Some(entry.depth);
            node.to_person = side_b.link_of(person_id);
        }

        let same_person = side_a.root == side_b.root;
        let connection_found = same_person || meeting.is_some();
        let meeting = if same_person { Some(side_a.root) } else { meeting };

        let common_ancestor_id = meeting
            .filter(|_| !same_person)
            .filter(|m| side_a.is_ancestral(*m) && side_b.is_ancestral(*m));

        let (path_a_to_common, path_b_to_common) = match meeting {
            Some(m) if !same_person => (side_a.path_to(m), side_b.path_to(m)),
            _ => (Vec::new(), Vec::new()),
        };

        let distance = meeting.and_then(|m| Some(side_a.depth_of(m)? + side_b.depth_of(m)?));

        LineagePathResult {
            person_a_id: side_a.root,
            person_b_id: side_b.root,
            connection_found,
            message: message.to_string(),
            common_ancestor_id,
            meeting_person_id: meeting,
            distance,
            graph,
            path_a_to_common,
            path_b_to_common,
        }
    }
}

impl LineageNode {
    fn empty(person_id: PersonId) -> Self {
        Self {
            person_id,
            depth_from_a: None,
            depth_from_b: None,
            from_person: None,
            to_person: None,
        }
    }
}
