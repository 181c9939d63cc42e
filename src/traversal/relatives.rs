use crate::error::{KinshipError, Result};
use crate::store::{EdgeStore, PersonStore};
use crate::traversal::primitives::{explore, ActiveEdges, NodeFilter, NodeFilterSet, SearchNode};
use crate::types::*;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    /// Every relative between 1 and `depth` hops away
    UpTo,
    /// Only relatives exactly `depth` hops away
    OnlyAt,
}

impl DepthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepthMode::UpTo => "up_to",
            DepthMode::OnlyAt => "only_at",
        }
    }

    pub fn includes(&self, discovered: Depth, depth: Depth) -> bool {
        match self {
            DepthMode::UpTo => discovered >= 1 && discovered <= depth,
            DepthMode::OnlyAt => discovered == depth,
        }
    }
}

impl fmt::Display for DepthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepthMode {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up_to" => Ok(DepthMode::UpTo),
            "only_at" => Ok(DepthMode::OnlyAt),
            other => Err(KinshipError::validation(format!(
                "depth_mode must be 'up_to' or 'only_at', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelativesRequest {
    pub person_id: PersonId,
    pub depth: Depth,
    /// Parsed at query time so a bad literal is a validation error
    pub depth_mode: String,
    #[serde(default)]
    pub living_only: Option<bool>,
    #[serde(default)]
    pub gender_id: Option<GenderId>,
    #[serde(default)]
    pub country_id: Option<i64>,
    #[serde(default)]
    pub state_id: Option<i64>,
    #[serde(default)]
    pub district_id: Option<i64>,
    #[serde(default)]
    pub sub_district_id: Option<i64>,
    #[serde(default)]
    pub locality_id: Option<i64>,
}

impl RelativesRequest {
    pub fn new(person_id: PersonId, depth: Depth, depth_mode: DepthMode) -> Self {
        Self {
            person_id,
            depth,
            depth_mode: depth_mode.as_str().to_string(),
            living_only: None,
            gender_id: None,
            country_id: None,
            state_id: None,
            district_id: None,
            sub_district_id: None,
            locality_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelativeInfo {
    pub person_id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub gender_id: Option<GenderId>,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
    pub country_id: Option<i64>,
    pub state_id: Option<i64>,
    pub district_id: Option<i64>,
    pub sub_district_id: Option<i64>,
    pub locality_id: Option<i64>,
    pub address_display: Option<String>,
    pub religion_display: Option<String>,
    pub depth: Depth,
    /// Person this relative was reached from
    pub from_person_id: PersonId,
    /// Label of the edge followed from `from_person_id`
    pub relationship_type: RelationshipType,
}

impl RelativeInfo {
    fn new(person: Person, node: &SearchNode, from: &Connection) -> Self {
        Self {
            person_id: person.person_id,
            first_name: person.first_name,
            last_name: person.last_name,
            gender_id: person.gender_id,
            birth_year: person.birth_year,
            death_year: person.death_year,
            country_id: person.country_id,
            state_id: person.state_id,
            district_id: person.district_id,
            sub_district_id: person.sub_district_id,
            locality_id: person.locality_id,
            address_display: person.address_display,
            religion_display: person.religion_display,
            depth: node.depth,
            from_person_id: from.person_id,
            relationship_type: from.relationship_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelativesResult {
    pub person_id: PersonId,
    pub total_count: usize,
    pub depth: Depth,
    pub depth_mode: DepthMode,
    pub relatives: Vec<RelativeInfo>,
}

fn exact(expected: Option<i64>, actual: fn(&Person) -> Option<i64>) -> Option<impl NodeFilter> {
    expected.map(move |value| move |p: &Person| actual(p) == Some(value))
}

/// Depth-bounded relatives listing around one person
pub struct RelativesFinder {
    persons: Arc<dyn PersonStore>,
    edges: Arc<dyn EdgeStore>,
    max_depth_limit: Depth,
    default_living_only: bool,
}

impl RelativesFinder {
    pub fn new(
        persons: Arc<dyn PersonStore>,
        edges: Arc<dyn EdgeStore>,
        max_depth_limit: Depth,
        default_living_only: bool,
    ) -> Self {
        Self {
            persons,
            edges,
            max_depth_limit,
            default_living_only,
        }
    }

    fn filters(&self, request: &RelativesRequest) -> NodeFilterSet {
        let mut filters = NodeFilterSet::new();

        if request.living_only.unwrap_or(self.default_living_only) {
            filters.push(|p: &Person| p.is_living());
        }

        let exact_matches = [
            exact(request.gender_id, |p| p.gender_id),
            exact(request.country_id, |p| p.country_id),
            exact(request.state_id, |p| p.state_id),
            exact(request.district_id, |p| p.district_id),
            exact(request.sub_district_id, |p| p.sub_district_id),
            exact(request.locality_id, |p| p.locality_id),
        ];
        for filter in exact_matches.into_iter().flatten() {
            filters.push(filter);
        }

        filters
    }

    #[instrument(skip(self, request), fields(person_id = request.person_id, depth = request.depth))]
    pub async fn find(&self, request: &RelativesRequest) -> Result<RelativesResult> {
        let depth_mode: DepthMode = request.depth_mode.parse()?;
        if request.depth == 0 || request.depth > self.max_depth_limit {
            return Err(KinshipError::validation(format!(
                "depth must be between 1 and {}, got {}",
                self.max_depth_limit, request.depth
            )));
        }

        self.persons
            .get_person(request.person_id)
            .await?
            .ok_or(KinshipError::PersonNotFound(request.person_id))?;

        let tree = explore(self.edges.as_ref(), request.person_id, request.depth, &ActiveEdges).await?;

        // Filters never prune traversal, only what ends up in the result
        let candidates: Vec<&SearchNode> = tree
            .nodes()
            .filter(|node| depth_mode.includes(node.depth, request.depth))
            .collect();
        let found = try_join_all(
            candidates
                .iter()
                .map(|node| self.persons.get_person(node.person_id)),
        )
        .await?;

        let filters = self.filters(request);
        let mut relatives = Vec::new();
        for (node, person) in candidates.into_iter().zip(found) {
            let person = match person {
                Some(person) => person,
                None => {
                    warn!("Edge points to person {} with no person record", node.person_id);
                    continue;
                }
            };
            let from = match node.from_edge.as_ref() {
                Some(from) => from,
                None => continue,
            };
            if filters.accepts(&person) {
                relatives.push(RelativeInfo::new(person, node, from));
            }
        }

        debug!(
            "Relatives of {}: {} of {} explored persons included",
            request.person_id,
            relatives.len(),
            tree.len()
        );

        Ok(RelativesResult {
            person_id: request.person_id,
            total_count: relatives.len(),
            depth: request.depth,
            depth_mode,
            relatives,
        })
    }
}
