use crate::error::{KinshipError, Result};
use crate::store::{EdgeStore, PersonStore};
use crate::traversal::primitives::{explore, ActiveEdges, NodeFilter, NodeFilterSet, SearchTree};
use crate::types::*;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEFAULT_PARTNER_MAX_DEPTH: Depth = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartnerMatchRequest {
    pub seeker_id: PersonId,
    pub target_gender_code: String,
    #[serde(default)]
    pub max_depth: Option<Depth>,
    #[serde(default)]
    pub birth_year_min: Option<i32>,
    #[serde(default)]
    pub birth_year_max: Option<i32>,
    #[serde(default)]
    pub religion_ids: Vec<i64>,
    #[serde(default)]
    pub religion_category_ids: Vec<i64>,
    #[serde(default)]
    pub religion_sub_category_ids: Vec<i64>,
    /// Gotras that veto a candidate regardless of the inclusion lists
    #[serde(default)]
    pub exclude_sub_category_ids: Vec<i64>,
    #[serde(default)]
    pub prune_graph: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartnerMatchResult {
    pub seeker_id: PersonId,
    pub total_matches: usize,
    /// Matched person ids in discovery order
    pub matches: Vec<PersonId>,
    pub exploration_graph: BTreeMap<PersonId, ExplorationNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplorationNode {
    pub person_id: PersonId,
    pub depth: Depth,
    pub is_match: bool,
    pub person: Option<PersonSummary>,
    pub from_person: Option<Connection>,
    pub to_persons: Vec<Connection>,
}

/// Eligibility predicates built from a validated request
struct Eligibility {
    target_gender_id: GenderId,
    birth_year_min: Option<i32>,
    birth_year_max: Option<i32>,
    religion_ids: HashSet<i64>,
    religion_category_ids: HashSet<i64>,
    religion_sub_category_ids: HashSet<i64>,
    exclude_sub_category_ids: HashSet<i64>,
}

fn member(allowed: &HashSet<i64>, value: Option<i64>) -> bool {
    allowed.is_empty() || value.map_or(false, |id| allowed.contains(&id))
}

/// Inclusive bounds; a person without a birth year fails once any bound is set
fn birth_year_within(min: Option<i32>, max: Option<i32>, birth_year: Option<i32>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    match birth_year {
        Some(year) => min.map_or(true, |min| year >= min) && max.map_or(true, |max| year <= max),
        None => false,
    }
}

impl Eligibility {
    fn into_filters(self) -> NodeFilterSet {
        let Eligibility {
            target_gender_id,
            birth_year_min,
            birth_year_max,
            religion_ids,
            religion_category_ids,
            religion_sub_category_ids,
            exclude_sub_category_ids,
        } = self;

        NodeFilterSet::new()
            .with(move |p: &Person| p.gender_id == Some(target_gender_id))
            .with(move |p: &Person| birth_year_within(birth_year_min, birth_year_max, p.birth_year))
            .with(move |p: &Person| member(&religion_ids, p.religion_id))
            .with(move |p: &Person| member(&religion_category_ids, p.religion_category_id))
            .with(move |p: &Person| member(&religion_sub_category_ids, p.religion_sub_category_id))
            .with(move |p: &Person| {
                p.religion_sub_category_id
                    .map_or(true, |gotra| !exclude_sub_category_ids.contains(&gotra))
            })
    }
}

/// Breadth-first search for eligible partners reachable from a seeker
pub struct PartnerMatchFinder {
    persons: Arc<dyn PersonStore>,
    edges: Arc<dyn EdgeStore>,
    genders: GenderTable,
    default_max_depth: Depth,
    max_depth_limit: Depth,
}

impl PartnerMatchFinder {
    pub fn new(
        persons: Arc<dyn PersonStore>,
        edges: Arc<dyn EdgeStore>,
        genders: GenderTable,
        default_max_depth: Depth,
        max_depth_limit: Depth,
    ) -> Self {
        Self {
            persons,
            edges,
            genders,
            default_max_depth,
            max_depth_limit,
        }
    }

    fn validate(&self, request: &PartnerMatchRequest) -> Result<(Depth, Eligibility)> {
        let max_depth = request.max_depth.unwrap_or(self.default_max_depth);
        if max_depth == 0 || max_depth > self.max_depth_limit {
            return Err(KinshipError::validation(format!(
                "max_depth must be between 1 and {}, got {}",
                self.max_depth_limit, max_depth
            )));
        }

        if let (Some(min), Some(max)) = (request.birth_year_min, request.birth_year_max) {
            if min > max {
                return Err(KinshipError::validation(format!(
                    "birth_year_min {} is greater than birth_year_max {}",
                    min, max
                )));
            }
        }

        let target_gender_id = self
            .genders
            .id_for_code(&request.target_gender_code)
            .ok_or_else(|| {
                KinshipError::validation(format!(
                    "unknown target_gender_code '{}'",
                    request.target_gender_code
                ))
            })?;

        let eligibility = Eligibility {
            target_gender_id,
            birth_year_min: request.birth_year_min,
            birth_year_max: request.birth_year_max,
            religion_ids: request.religion_ids.iter().copied().collect(),
            religion_category_ids: request.religion_category_ids.iter().copied().collect(),
            religion_sub_category_ids: request.religion_sub_category_ids.iter().copied().collect(),
            exclude_sub_category_ids: request.exclude_sub_category_ids.iter().copied().collect(),
        };
        Ok((max_depth, eligibility))
    }

    #[instrument(skip(self, request), fields(seeker_id = request.seeker_id))]
    pub async fn find(&self, request: &PartnerMatchRequest) -> Result<PartnerMatchResult> {
        let (max_depth, eligibility) = self.validate(request)?;
        let filters = eligibility.into_filters();

        self.persons
            .get_person(request.seeker_id)
            .await?
            .ok_or(KinshipError::PersonNotFound(request.seeker_id))?;

        let tree = explore(self.edges.as_ref(), request.seeker_id, max_depth, &ActiveEdges).await?;
        let persons = self.load_persons(&tree).await?;

        let matches: Vec<PersonId> = tree
            .nodes()
            .filter(|node| node.person_id != request.seeker_id)
            .filter(|node| {
                persons
                    .get(&node.person_id)
                    .map_or(false, |person| filters.accepts(person))
            })
            .map(|node| node.person_id)
            .collect();

        debug!(
            "Partner search explored {} persons, {} matched",
            tree.len(),
            matches.len()
        );

        let matched: HashSet<PersonId> = matches.iter().copied().collect();
        let retained = if request.prune_graph {
            Some(Self::nodes_on_match_paths(&tree, &matches))
        } else {
            None
        };
        let exploration_graph = Self::build_graph(tree, &persons, &matched, retained.as_ref());

        Ok(PartnerMatchResult {
            seeker_id: request.seeker_id,
            total_matches: matches.len(),
            matches,
            exploration_graph,
        })
    }

    async fn load_persons(&self, tree: &SearchTree) -> Result<HashMap<PersonId, Person>> {
        let lookups = tree.nodes().map(|node| self.persons.get_person(node.person_id));
        let found = try_join_all(lookups).await?;

        let mut persons = HashMap::new();
        for (node, person) in tree.nodes().zip(found) {
            match person {
                Some(person) => {
                    persons.insert(node.person_id, person);
                }
                None => warn!("Edge points to person {} with no person record", node.person_id),
            }
        }
        Ok(persons)
    }

    /// Persons lying on some root-to-match path
    fn nodes_on_match_paths(tree: &SearchTree, matches: &[PersonId]) -> HashSet<PersonId> {
        let mut retained = HashSet::new();
        for &matched in matches {
            retained.extend(tree.path_to_root(matched));
        }
        retained
    }

    fn build_graph(
        tree: SearchTree,
        persons: &HashMap<PersonId, Person>,
        matched: &HashSet<PersonId>,
        retained: Option<&HashSet<PersonId>>,
    ) -> BTreeMap<PersonId, ExplorationNode> {
        let keep = |person_id: PersonId| retained.map_or(true, |set| set.contains(&person_id));

        tree.into_map()
            .into_iter()
            .filter(|(person_id, _)| keep(*person_id))
            .map(|(person_id, node)| {
                let to_persons = node
                    .to_edges
                    .into_iter()
                    .filter(|child| keep(child.person_id))
                    .collect();
                let exploration = ExplorationNode {
                    person_id,
                    depth: node.depth,
                    is_match: matched.contains(&person_id),
                    person: persons.get(&person_id).map(Person::summary),
                    from_person: node.from_edge,
                    to_persons,
                };
                (person_id, exploration)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::test_support::*;
    use RelationshipType::*;

    fn finder(store: InMemoryStore) -> PartnerMatchFinder {
        let store = Arc::new(store);
        PartnerMatchFinder::new(
            store.clone(),
            store,
            GenderTable::default(),
            DEFAULT_PARTNER_MAX_DEPTH,
            10,
        )
    }

    fn request(seeker_id: PersonId, code: &str) -> PartnerMatchRequest {
        PartnerMatchRequest {
            seeker_id,
            target_gender_code: code.to_string(),
            ..Default::default()
        }
    }

    fn with_details(mut p: Person, birth_year: Option<i32>, religion: i64, gotra: i64) -> Person {
        p.birth_year = birth_year;
        p.religion_id = Some(religion);
        p.religion_category_id = Some(religion * 10);
        p.religion_sub_category_id = Some(gotra);
        p
    }

    /// Seeker 1 (male, gotra 100). Sister 2, mother 3, mother's brother 4,
    /// his daughters 5 (gotra 200) and 6 (gotra 100), 6's friend-by-marriage 7.
    fn community() -> InMemoryStore {
        linked_family(
            vec![
                with_details(male(1), Some(1995), 1, 100),
                with_details(female(2), Some(1998), 1, 100),
                with_details(female(3), Some(1970), 1, 300),
                with_details(male(4), Some(1968), 1, 300),
                with_details(female(5), Some(1996), 1, 200),
                with_details(female(6), None, 1, 100),
                with_details(male(7), Some(1994), 2, 400),
                with_details(female(8), Some(1997), 2, 500),
            ],
            &[
                (1, 3, Mother),
                (2, 3, Mother),
                (3, 4, Spouse),
                (5, 4, Father),
                (6, 4, Father),
                (6, 7, Husband),
                (7, 8, Spouse),
            ],
        )
    }

    #[tokio::test]
    async fn test_finds_opposite_gender_relatives_in_order() {
        let result = finder(community()).find(&request(1, "F")).await.unwrap();

        assert_eq!(result.seeker_id, 1);
        assert_eq!(result.matches, vec![3, 2, 5, 6, 8]);
        assert_eq!(result.total_matches, 5);
        assert!(result.exploration_graph[&5].is_match);
        assert!(!result.exploration_graph[&4].is_match);
        assert_eq!(result.exploration_graph.len(), 8);
    }

    #[tokio::test]
    async fn test_seeker_never_matches_itself() {
        let result = finder(community()).find(&request(1, "M")).await.unwrap();

        assert!(!result.matches.contains(&1));
        assert_eq!(result.matches, vec![4, 7]);
        assert!(!result.exploration_graph[&1].is_match);
    }

    #[tokio::test]
    async fn test_same_gender_spouse_is_not_a_match() {
        let store = linked_family(vec![male(1), male(2)], &[(1, 2, Spouse)]);
        let mut req = request(1, "F");
        req.max_depth = Some(1);

        let result = finder(store).find(&req).await.unwrap();
        assert_eq!(result.total_matches, 0);
        assert_eq!(result.exploration_graph.len(), 2);
    }

    #[tokio::test]
    async fn test_birth_year_bounds_are_inclusive_and_need_data() {
        let mut req = request(1, "F");
        req.birth_year_min = Some(1996);
        req.birth_year_max = Some(1998);

        let result = finder(community()).find(&req).await.unwrap();

        // 6 has no birth year; she still appears in the exploration graph
        assert_eq!(result.matches, vec![2, 5, 8]);
        assert!(result.exploration_graph.contains_key(&6));
        assert!(!result.exploration_graph[&6].is_match);
    }

    #[tokio::test]
    async fn test_gotra_exclusion_vetoes_inclusion_filters() {
        let mut req = request(1, "F");
        req.religion_ids = vec![1];
        req.religion_sub_category_ids = vec![100, 200];
        req.exclude_sub_category_ids = vec![100];

        let result = finder(community()).find(&req).await.unwrap();
        assert_eq!(result.matches, vec![5]);
    }

    #[tokio::test]
    async fn test_inclusion_levels_combine_with_and() {
        let mut req = request(1, "F");
        req.religion_ids = vec![1, 2];
        req.religion_category_ids = vec![20];

        let result = finder(community()).find(&req).await.unwrap();
        assert_eq!(result.matches, vec![8]);
    }

    #[tokio::test]
    async fn test_depth_ceiling_limits_reach() {
        let mut req = request(1, "F");
        req.max_depth = Some(2);

        let result = finder(community()).find(&req).await.unwrap();
        assert_eq!(result.matches, vec![3, 2]);
        assert!(!result.exploration_graph.contains_key(&5));
    }

    #[tokio::test]
    async fn test_pruned_graph_keeps_only_match_paths() {
        let mut req = request(1, "F");
        req.religion_ids = vec![2];
        req.prune_graph = true;

        let result = finder(community()).find(&req).await.unwrap();
        assert_eq!(result.matches, vec![8]);

        let mut kept: Vec<PersonId> = result.exploration_graph.keys().copied().collect();
        kept.sort();
        assert_eq!(kept, vec![1, 3, 4, 6, 7, 8]);
        assert_eq!(
            result.exploration_graph[&1].to_persons,
            vec![Connection { person_id: 3, relationship_type: Mother }]
        );
    }

    #[tokio::test]
    async fn test_pruned_graph_is_empty_without_matches() {
        let mut req = request(1, "F");
        req.religion_ids = vec![99];
        req.prune_graph = true;

        let result = finder(community()).find(&req).await.unwrap();
        assert!(result.matches.is_empty());
        assert!(result.exploration_graph.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let finder = finder(community());

        let mut req = request(1, "F");
        req.birth_year_min = Some(2000);
        req.birth_year_max = Some(1990);
        assert!(matches!(finder.find(&req).await, Err(KinshipError::Validation(_))));

        assert!(matches!(
            finder.find(&request(1, "Z")).await,
            Err(KinshipError::Validation(_))
        ));

        let mut req = request(1, "F");
        req.max_depth = Some(0);
        assert!(matches!(finder.find(&req).await, Err(KinshipError::Validation(_))));

        assert!(matches!(
            finder.find(&request(77, "F")).await,
            Err(KinshipError::PersonNotFound(77))
        ));
    }
}
