use crate::error::Result;
use crate::store::EdgeStore;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// FIFO queue of `(person_id, depth)` pairs, giving BFS level order
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<(PersonId, Depth)>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(root: PersonId) -> Self {
        let mut frontier = Self::new();
        frontier.push(root, 0);
        frontier
    }

    pub fn push(&mut self, person_id: PersonId, depth: Depth) {
        self.queue.push_back((person_id, depth));
    }

    pub fn pop(&mut self) -> Option<(PersonId, Depth)> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Pop every entry sharing the depth at the head of the queue
    pub fn drain_level(&mut self) -> Vec<(PersonId, Depth)> {
        let level_depth = match self.queue.front() {
            Some(&(_, depth)) => depth,
            None => return Vec::new(),
        };

        let mut level = Vec::new();
        while let Some(&(_, depth)) = self.queue.front() {
            if depth != level_depth {
                break;
            }
            if let Some(entry) = self.queue.pop_front() {
                level.push(entry);
            }
        }
        level
    }
}

/// Insertion-once map of visited persons, remembering discovery order.
/// Nodes are marked when enqueued, not when dequeued.
#[derive(Debug)]
pub struct Visited<T> {
    entries: HashMap<PersonId, T>,
    order: Vec<PersonId>,
}

impl<T> Default for Visited<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> Visited<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the existing entry untouched, if already visited
    pub fn mark(&mut self, person_id: PersonId, value: T) -> bool {
        if self.entries.contains_key(&person_id) {
            return false;
        }
        self.entries.insert(person_id, value);
        self.order.push(person_id);
        true
    }

    pub fn contains(&self, person_id: PersonId) -> bool {
        self.entries.contains_key(&person_id)
    }

    pub fn get(&self, person_id: PersonId) -> Option<&T> {
        self.entries.get(&person_id)
    }

    pub fn get_mut(&mut self, person_id: PersonId) -> Option<&mut T> {
        self.entries.get_mut(&person_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Person ids in discovery order
    pub fn order(&self) -> &[PersonId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (PersonId, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|value| (*id, value)))
    }
}

/// Predicate applied to an edge before it is followed
pub trait EdgeFilter: Send + Sync {
    fn accepts(&self, edge: &KinshipEdge) -> bool;
}

impl<F> EdgeFilter for F
where
    F: Fn(&KinshipEdge) -> bool + Send + Sync,
{
    fn accepts(&self, edge: &KinshipEdge) -> bool {
        self(edge)
    }
}

/// Follows active edges only
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveEdges;

impl EdgeFilter for ActiveEdges {
    fn accepts(&self, edge: &KinshipEdge) -> bool {
        edge.is_active
    }
}

/// Predicate applied to a person before it counts as a result
pub trait NodeFilter: Send + Sync {
    fn accepts(&self, person: &Person) -> bool;
}

impl<F> NodeFilter for F
where
    F: Fn(&Person) -> bool + Send + Sync,
{
    fn accepts(&self, person: &Person) -> bool {
        self(person)
    }
}

/// Conjunction of node filters; empty accepts everyone
#[derive(Default)]
pub struct NodeFilterSet {
    filters: Vec<Box<dyn NodeFilter>>,
}

impl NodeFilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl NodeFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: impl NodeFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl NodeFilter for NodeFilterSet {
    fn accepts(&self, person: &Person) -> bool {
        self.filters.iter().all(|filter| filter.accepts(person))
    }
}

/// Sort edges by `(relationship rank, related person)` so expansion order does
/// not depend on the store
pub fn canonical_order(edges: &mut [KinshipEdge]) {
    edges.sort_by_key(|edge| (edge.relationship_type.rank(), edge.related_person_id));
}

/// Outgoing edges of a person that pass the filter, in canonical order
pub async fn neighbors(
    edges: &dyn EdgeStore,
    person_id: PersonId,
    filter: &dyn EdgeFilter,
) -> Result<Vec<KinshipEdge>> {
    let mut outgoing: Vec<KinshipEdge> = edges
        .get_active_edges(person_id)
        .await?
        .into_iter()
        .filter(|edge| edge.person_id == person_id && filter.accepts(edge))
        .collect();
    canonical_order(&mut outgoing);
    Ok(outgoing)
}

/// Node of a single-source search tree. `from_edge` names the parent and
/// the label of the edge followed from it; `to_edges` the children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchNode {
    pub person_id: PersonId,
    pub depth: Depth,
    pub from_edge: Option<Connection>,
    pub to_edges: Vec<Connection>,
}

/// Result of a depth-bounded BFS from one root
#[derive(Debug)]
pub struct SearchTree {
    pub root: PersonId,
    pub max_depth: Depth,
    nodes: Visited<SearchNode>,
}

impl SearchTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, person_id: PersonId) -> Option<&SearchNode> {
        self.nodes.get(person_id)
    }

    pub fn depth_of(&self, person_id: PersonId) -> Option<Depth> {
        self.nodes.get(person_id).map(|node| node.depth)
    }

    /// Nodes in discovery order, root first
    pub fn nodes(&self) -> impl Iterator<Item = &SearchNode> + '_ {
        self.nodes.iter().map(|(_, node)| node)
    }

    /// Person ids from the root down to `person_id`, both included
    pub fn path_to_root(&self, person_id: PersonId) -> Vec<PersonId> {
        let mut path = Vec::new();
        let mut current = Some(person_id);

        while let Some(id) = current {
            let node = match self.nodes.get(id) {
                Some(node) => node,
                None => break,
            };
            path.push(id);
            current = node.from_edge.as_ref().map(|from| from.person_id);
        }

        path.reverse();
        path
    }

    pub fn into_map(self) -> BTreeMap<PersonId, SearchNode> {
        let Visited { mut entries, order } = self.nodes;
        order
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|node| (id, node)))
            .collect()
    }
}

/// Breadth-first exploration from `root` up to `max_depth` hops.
///
/// Depth recorded for every node is its shortest hop distance from the root;
/// each person is visited at most once, so marriage cycles terminate.
pub async fn explore(
    edges: &dyn EdgeStore,
    root: PersonId,
    max_depth: Depth,
    filter: &dyn EdgeFilter,
) -> Result<SearchTree> {
    let mut nodes = Visited::new();
    let mut frontier = Frontier::seeded(root);
    nodes.mark(
        root,
        SearchNode {
            person_id: root,
            depth: 0,
            from_edge: None,
            to_edges: Vec::new(),
        },
    );

    while let Some((person_id, depth)) = frontier.pop() {
        if depth >= max_depth {
            continue;
        }

        for edge in neighbors(edges, person_id, filter).await? {
            let target = edge.related_person_id;
            let discovered = nodes.mark(
                target,
                SearchNode {
                    person_id: target,
                    depth: depth + 1,
                    from_edge: Some(Connection {
                        person_id,
                        relationship_type: edge.relationship_type,
                    }),
                    to_edges: Vec::new(),
                },
            );
            if !discovered {
                continue;
            }

            if let Some(parent) = nodes.get_mut(person_id) {
                parent.to_edges.push(Connection {
                    person_id: target,
                    relationship_type: edge.relationship_type,
                });
            }
            frontier.push(target, depth + 1);
        }
    }

    debug!(
        "Explored {} persons within {} hops of {}",
        nodes.len(),
        max_depth,
        root
    );

    Ok(SearchTree {
        root,
        max_depth,
        nodes,
    })
}
