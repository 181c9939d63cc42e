use crate::consistency::engine::ConsistencyEngine;
use crate::error::Result;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    MissingInverse,
    MistypedInverse { found: RelationshipType },
    InactiveInverse,
    IndeterminateInverse { reason: String },
}

/// An active edge whose mirror row is absent or wrong
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvariantViolation {
    pub edge_id: EdgeId,
    pub person_id: PersonId,
    pub related_person_id: PersonId,
    pub relationship_type: RelationshipType,
    pub expected_inverse: Option<RelationshipType>,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

/// Non-fatal finding of the repair pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyRepairWarning {
    pub violation: InvariantViolation,
    /// Id of the inverse row written by the repair, if one was
    pub synthesized_edge_id: Option<EdgeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepairReport {
    pub scanned: usize,
    pub synthesized: usize,
    pub unresolved: usize,
    pub warnings: Vec<ConsistencyRepairWarning>,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edge {} ({} -[{}]-> {}): ",
            self.edge_id, self.person_id, self.relationship_type, self.related_person_id
        )?;
        match &self.kind {
            ViolationKind::MissingInverse => write!(f, "missing inverse"),
            ViolationKind::MistypedInverse { found } => write!(
                f,
                "inverse is {} but should be {}",
                found,
                self.expected_inverse.map(|t| t.as_str()).unwrap_or("?")
            ),
            ViolationKind::InactiveInverse => write!(f, "inverse is inactive"),
            ViolationKind::IndeterminateInverse { reason } => {
                write!(f, "inverse cannot be determined ({})", reason)
            }
        }
    }
}

impl fmt::Display for ConsistencyRepairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.synthesized_edge_id {
            Some(edge_id) => write!(f, "{}; synthesized inverse edge {}", self.violation, edge_id),
            None => write!(f, "{}; left unresolved", self.violation),
        }
    }
}

impl ConsistencyEngine {
    /// Read-only audit of the symmetry invariant
    #[instrument(skip(self))]
    pub async fn check(&self) -> Result<Vec<InvariantViolation>> {
        let edges = self.edges.all_edges().await?;
        let mut genders = GenderCache::default();
        let by_key = index_by_key(&edges);

        let mut violations = Vec::new();
        for edge in edges.iter().filter(|edge| edge.is_active) {
            if let Some(violation) = self.audit_edge(edge, &by_key, &mut genders).await? {
                violations.push(violation);
            }
        }

        info!(
            "Consistency check scanned {} edges, found {} violations",
            edges.len(),
            violations.len()
        );
        Ok(violations)
    }

    /// Synthesize every missing inverse. Running it twice writes nothing the
    /// second time.
    #[instrument(skip(self))]
    pub async fn repair(&self) -> Result<RepairReport> {
        let edges = self.edges.all_edges().await?;
        let mut genders = GenderCache::default();
        let mut by_key = index_by_key(&edges);
        let mut report = RepairReport {
            scanned: edges.len(),
            ..Default::default()
        };

        for edge in edges.iter().filter(|edge| edge.is_active) {
            let violation = match self.audit_edge(edge, &by_key, &mut genders).await? {
                Some(violation) => violation,
                None => continue,
            };

            let synthesized_edge_id = match (&violation.kind, violation.expected_inverse) {
                (ViolationKind::MissingInverse, Some(inverse_type)) => {
                    let inverse = self
                        .edges
                        .insert_missing_inverse(NewEdge {
                            person_id: edge.related_person_id,
                            related_person_id: edge.person_id,
                            relationship_type: inverse_type,
                            is_active: true,
                            start_date: edge.start_date,
                            end_date: edge.end_date,
                        })
                        .await?;
                    by_key.insert(
                        (inverse.person_id, inverse.related_person_id),
                        inverse.clone(),
                    );
                    Some(inverse.edge_id)
                }
                _ => None,
            };

            let warning = ConsistencyRepairWarning {
                violation,
                synthesized_edge_id,
            };
            warn!("Consistency repair: {}", warning);

            if synthesized_edge_id.is_some() {
                report.synthesized += 1;
            } else {
                report.unresolved += 1;
            }
            report.warnings.push(warning);
        }

        metrics::counter!("kinship_repair_synthesized_total", report.synthesized as u64);
        info!(
            "Consistency repair scanned {} edges: {} inverses synthesized, {} unresolved",
            report.scanned, report.synthesized, report.unresolved
        );
        Ok(report)
    }

    async fn audit_edge(
        &self,
        edge: &KinshipEdge,
        by_key: &HashMap<(PersonId, PersonId), KinshipEdge>,
        genders: &mut GenderCache,
    ) -> Result<Option<InvariantViolation>> {
        let gender_id = genders.gender_of(self, edge.person_id).await?;

        let violation = |expected_inverse, kind| InvariantViolation {
            edge_id: edge.edge_id,
            person_id: edge.person_id,
            related_person_id: edge.related_person_id,
            relationship_type: edge.relationship_type,
            expected_inverse,
            kind,
        };

        let expected = match self
            .resolver
            .inverse_for_gender(edge.person_id, gender_id, edge.relationship_type)
        {
            Ok(expected) => expected,
            Err(err) => {
                return Ok(Some(violation(
                    None,
                    ViolationKind::IndeterminateInverse {
                        reason: err.to_string(),
                    },
                )))
            }
        };

        let result = match by_key.get(&edge.mirror_key()) {
            None => Some(violation(Some(expected), ViolationKind::MissingInverse)),
            Some(mirror) if mirror.relationship_type != expected => Some(violation(
                Some(expected),
                ViolationKind::MistypedInverse {
                    found: mirror.relationship_type,
                },
            )),
            Some(mirror) if !mirror.is_active => {
                Some(violation(Some(expected), ViolationKind::InactiveInverse))
            }
            Some(_) => None,
        };
        Ok(result)
    }
}

fn index_by_key(edges: &[KinshipEdge]) -> HashMap<(PersonId, PersonId), KinshipEdge> {
    edges
        .iter()
        .map(|edge| ((edge.person_id, edge.related_person_id), edge.clone()))
        .collect()
}

/// Person gender lookups memoized for one scan
#[derive(Default)]
struct GenderCache {
    genders: HashMap<PersonId, Option<GenderId>>,
}

impl GenderCache {
    async fn gender_of(&mut self, engine: &ConsistencyEngine, person_id: PersonId) -> Result<Option<GenderId>> {
        if let Some(gender_id) = self.genders.get(&person_id) {
            return Ok(*gender_id);
        }
        let gender_id = engine
            .persons
            .get_person(person_id)
            .await?
            .and_then(|person| person.gender_id);
        self.genders.insert(person_id, gender_id);
        Ok(gender_id)
    }
}
