use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KinshipError;

/// Core types for the kinship graph

pub type PersonId = i64;
pub type EdgeId = i64;
pub type GenderId = i64;
pub type Depth = u32;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub person_id: PersonId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub gender_id: Option<GenderId>,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub death_year: Option<i32>,
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
    #[serde(default)]
    pub religion_id: Option<i64>,
    #[serde(default)]
    pub religion_category_id: Option<i64>,
    /// Gotra
    #[serde(default)]
    pub religion_sub_category_id: Option<i64>,
    #[serde(default)]
    pub address_display: Option<String>,
    #[serde(default)]
    pub religion_display: Option<String>,
}

/// A directed kinship edge. `(A, B, FATHER)` reads "B is A's father".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KinshipEdge {
    pub edge_id: EdgeId,
    pub person_id: PersonId,
    pub related_person_id: PersonId,
    pub relationship_type: RelationshipType,
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Edge row that has not been assigned an id yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEdge {
    pub person_id: PersonId,
    pub related_person_id: PersonId,
    pub relationship_type: RelationshipType,
    pub is_active: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Fields that may change on an existing edge pair
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EdgeUpdate {
    pub is_active: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Always rejected; retyping is a delete followed by a create
    pub relationship_type: Option<RelationshipType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgePair {
    pub primary: KinshipEdge,
    pub inverse: Option<KinshipEdge>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Father,
    Mother,
    Son,
    Daughter,
    Husband,
    Wife,
    Spouse,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::Father,
        RelationshipType::Mother,
        RelationshipType::Son,
        RelationshipType::Daughter,
        RelationshipType::Husband,
        RelationshipType::Wife,
        RelationshipType::Spouse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Father => "FATHER",
            RelationshipType::Mother => "MOTHER",
            RelationshipType::Son => "SON",
            RelationshipType::Daughter => "DAUGHTER",
            RelationshipType::Husband => "HUSBAND",
            RelationshipType::Wife => "WIFE",
            RelationshipType::Spouse => "SPOUSE",
        }
    }

    /// Position used for canonical edge ordering during traversal
    pub fn rank(&self) -> u8 {
        match self {
            RelationshipType::Father => 0,
            RelationshipType::Mother => 1,
            RelationshipType::Son => 2,
            RelationshipType::Daughter => 3,
            RelationshipType::Husband => 4,
            RelationshipType::Wife => 5,
            RelationshipType::Spouse => 6,
        }
    }

    /// Ancestor-direction edge: the related person is a parent
    pub fn is_parent(&self) -> bool {
        matches!(self, RelationshipType::Father | RelationshipType::Mother)
    }

    pub fn is_child(&self) -> bool {
        matches!(self, RelationshipType::Son | RelationshipType::Daughter)
    }

    pub fn is_spouse(&self) -> bool {
        matches!(
            self,
            RelationshipType::Husband | RelationshipType::Wife | RelationshipType::Spouse
        )
    }

    /// Whether the inverse depends on the origin person's gender
    pub fn requires_gender_context(&self) -> bool {
        self.is_parent() || self.is_child()
    }

    /// Sex the related person must have for this type to be valid, if any
    pub fn implied_sex(&self) -> Option<Sex> {
        match self {
            RelationshipType::Father | RelationshipType::Son | RelationshipType::Husband => {
                Some(Sex::Male)
            }
            RelationshipType::Mother | RelationshipType::Daughter | RelationshipType::Wife => {
                Some(Sex::Female)
            }
            RelationshipType::Spouse => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|rel| rel.as_str() == upper)
            .ok_or_else(|| KinshipError::Validation(format!("unknown relationship type '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// One row of gender reference data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenderEntry {
    pub id: GenderId,
    pub code: String,
    /// `None` for genders that carry no parent/child inverse semantics
    #[serde(default)]
    pub sex: Option<Sex>,
}

/// Gender reference data passed explicitly to whoever needs it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenderTable {
    entries: Vec<GenderEntry>,
}

impl GenderTable {
    pub fn new(entries: Vec<GenderEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GenderEntry] {
        &self.entries
    }

    pub fn sex_of(&self, gender_id: Option<GenderId>) -> Option<Sex> {
        let gender_id = gender_id?;
        self.entries
            .iter()
            .find(|entry| entry.id == gender_id)
            .and_then(|entry| entry.sex)
    }

    pub fn id_for_code(&self, code: &str) -> Option<GenderId> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|entry| entry.code.eq_ignore_ascii_case(code))
            .map(|entry| entry.id)
    }
}

impl Default for GenderTable {
    fn default() -> Self {
        Self::new(default_gender_entries())
    }
}

pub fn default_gender_entries() -> Vec<GenderEntry> {
    vec![
        GenderEntry { id: 1, code: "M".to_string(), sex: Some(Sex::Male) },
        GenderEntry { id: 2, code: "F".to_string(), sex: Some(Sex::Female) },
        GenderEntry { id: 3, code: "O".to_string(), sex: None },
    ]
}

/// A hop in a traversal tree: the neighbouring person and the edge label
/// that connects the two.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub person_id: PersonId,
    pub relationship_type: RelationshipType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonSummary {
    pub person_id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub gender_id: Option<GenderId>,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn is_living(&self) -> bool {
        self.death_year.is_none()
    }

    pub fn summary(&self) -> PersonSummary {
        PersonSummary {
            person_id: self.person_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            gender_id: self.gender_id,
            birth_year: self.birth_year,
            death_year: self.death_year,
        }
    }
}

impl KinshipEdge {
    /// Key of the row this edge must be mirrored by
    pub fn mirror_key(&self) -> (PersonId, PersonId) {
        (self.related_person_id, self.person_id)
    }
}

impl NewEdge {
    pub fn active(
        person_id: PersonId,
        related_person_id: PersonId,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            person_id,
            related_person_id,
            relationship_type,
            is_active: true,
            start_date: None,
            end_date: None,
        }
    }
}

impl EdgeUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_active.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.relationship_type.is_none()
    }

    /// Apply the symmetric fields to an edge
    pub fn apply_to(&self, edge: &mut KinshipEdge) {
        if let Some(is_active) = self.is_active {
            edge.is_active = is_active;
        }
        if let Some(start_date) = self.start_date {
            edge.start_date = Some(start_date);
        }
        if let Some(end_date) = self.end_date {
            edge.end_date = Some(end_date);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_parsing() {
        assert_eq!("father".parse::<RelationshipType>().unwrap(), RelationshipType::Father);
        assert_eq!(" WIFE ".parse::<RelationshipType>().unwrap(), RelationshipType::Wife);
        assert!("cousin".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn test_relationship_type_serde_uses_upper_case() {
        let json = serde_json::to_string(&RelationshipType::Daughter).unwrap();
        assert_eq!(json, "\"DAUGHTER\"");
        let back: RelationshipType = serde_json::from_str("\"SPOUSE\"").unwrap();
        assert_eq!(back, RelationshipType::Spouse);
    }

    #[test]
    fn test_gender_table_lookup() {
        let table = GenderTable::default();
        assert_eq!(table.sex_of(Some(1)), Some(Sex::Male));
        assert_eq!(table.sex_of(Some(2)), Some(Sex::Female));
        assert_eq!(table.sex_of(Some(3)), None);
        assert_eq!(table.sex_of(Some(99)), None);
        assert_eq!(table.sex_of(None), None);
        assert_eq!(table.id_for_code("f"), Some(2));
        assert_eq!(table.id_for_code("X"), None);
    }

    #[test]
    fn test_edge_update_applies_only_present_fields() {
        let mut edge = KinshipEdge {
            edge_id: 1,
            person_id: 1,
            related_person_id: 2,
            relationship_type: RelationshipType::Spouse,
            is_active: true,
            start_date: NaiveDate::from_ymd_opt(2001, 5, 1),
            end_date: None,
        };

        let update = EdgeUpdate {
            is_active: Some(false),
            end_date: NaiveDate::from_ymd_opt(2010, 1, 1),
            ..Default::default()
        };
        update.apply_to(&mut edge);

        assert!(!edge.is_active);
        assert_eq!(edge.start_date, NaiveDate::from_ymd_opt(2001, 5, 1));
        assert_eq!(edge.end_date, NaiveDate::from_ymd_opt(2010, 1, 1));
    }
}
