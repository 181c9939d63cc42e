//! Fixture builders shared by the unit tests

use crate::consistency::InverseResolver;
use crate::store::snapshot::{GraphSnapshot, SnapshotEdge};
use crate::store::InMemoryStore;
use crate::types::*;

pub const MALE: GenderId = 1;
pub const FEMALE: GenderId = 2;

pub fn person(person_id: PersonId, gender_id: Option<GenderId>) -> Person {
    Person {
        person_id,
        first_name: format!("Person{}", person_id),
        last_name: "Family".to_string(),
        gender_id,
        ..Default::default()
    }
}

pub fn male(person_id: PersonId) -> Person {
    person(person_id, Some(MALE))
}

pub fn female(person_id: PersonId) -> Person {
    person(person_id, Some(FEMALE))
}

pub fn row(person_id: PersonId, related_person_id: PersonId, relationship_type: RelationshipType) -> SnapshotEdge {
    SnapshotEdge {
        edge_id: None,
        person_id,
        related_person_id,
        relationship_type,
        is_active: true,
        start_date: None,
        end_date: None,
    }
}

/// Store holding exactly the given rows, symmetric or not
pub fn family_store(
    persons: Vec<Person>,
    rows: Vec<(PersonId, PersonId, RelationshipType)>,
) -> InMemoryStore {
    let snapshot = GraphSnapshot {
        persons,
        edges: rows.into_iter().map(|(a, b, rel)| row(a, b, rel)).collect(),
    };
    InMemoryStore::from_snapshot(snapshot).unwrap()
}

/// Store where every link is written together with its gender-correct inverse
pub fn linked_family(
    persons: Vec<Person>,
    links: &[(PersonId, PersonId, RelationshipType)],
) -> InMemoryStore {
    let resolver = InverseResolver::default();
    let mut rows = Vec::new();

    for &(a, b, rel) in links {
        let origin = persons
            .iter()
            .find(|p| p.person_id == a)
            .expect("link origin must be a fixture person");
        let inverse = resolver.inverse_for(origin, rel).unwrap();
        rows.push((a, b, rel));
        rows.push((b, a, inverse));
    }

    family_store(persons, rows)
}
