use crate::error::{KinshipError, Result};
use crate::types::*;

/// Inverse of `relationship_type` as named by a person of `origin_sex`.
///
/// Edge `(A, B, T)` is mirrored by `(B, A, inverse(T, sex(A)))`. Returns `None`
/// when the type is gender-dependent and the origin sex is unknown.
pub fn inverse_of(relationship_type: RelationshipType, origin_sex: Option<Sex>) -> Option<RelationshipType> {
    use RelationshipType::*;

    match relationship_type {
        Father | Mother => match origin_sex? {
            Sex::Male => Some(Son),
            Sex::Female => Some(Daughter),
        },
        Son | Daughter => match origin_sex? {
            Sex::Male => Some(Father),
            Sex::Female => Some(Mother),
        },
        Husband => Some(Wife),
        Wife => Some(Husband),
        Spouse => Some(Spouse),
    }
}

/// Computes inverse edge types against an explicit gender table
#[derive(Debug, Clone)]
pub struct InverseResolver {
    genders: GenderTable,
}

impl InverseResolver {
    pub fn new(genders: GenderTable) -> Self {
        Self { genders }
    }

    pub fn genders(&self) -> &GenderTable {
        &self.genders
    }

    /// Inverse type for an edge named by `origin`
    pub fn inverse_for(&self, origin: &Person, relationship_type: RelationshipType) -> Result<RelationshipType> {
        self.inverse_for_gender(origin.person_id, origin.gender_id, relationship_type)
    }

    pub fn inverse_for_gender(
        &self,
        person_id: PersonId,
        gender_id: Option<GenderId>,
        relationship_type: RelationshipType,
    ) -> Result<RelationshipType> {
        let sex = self.genders.sex_of(gender_id);
        inverse_of(relationship_type, sex).ok_or_else(|| KinshipError::IndeterminateInverse {
            person_id,
            relationship_type,
            reason: match gender_id {
                None => "gender is not recorded".to_string(),
                Some(id) => format!("gender id {} has no male/female mapping", id),
            },
        })
    }

    /// Check that the related person's gender agrees with a parent/child type
    pub fn check_related_gender(&self, related: &Person, relationship_type: RelationshipType) -> Result<()> {
        if !relationship_type.requires_gender_context() {
            return Ok(());
        }

        let sex = self.genders.sex_of(related.gender_id).ok_or_else(|| {
            KinshipError::IndeterminateInverse {
                person_id: related.person_id,
                relationship_type,
                reason: "related person's gender is unknown".to_string(),
            }
        })?;

        match relationship_type.implied_sex() {
            Some(expected) if expected != sex => Err(KinshipError::validation(format!(
                "person {} cannot be a {} ({:?} gender recorded)",
                related.person_id, relationship_type, sex
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for InverseResolver {
    fn default() -> Self {
        Self::new(GenderTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RelationshipType::*;

    #[test]
    fn test_inverse_table() {
        assert_eq!(inverse_of(Father, Some(Sex::Male)), Some(Son));
        assert_eq!(inverse_of(Mother, Some(Sex::Male)), Some(Son));
        assert_eq!(inverse_of(Father, Some(Sex::Female)), Some(Daughter));
        assert_eq!(inverse_of(Mother, Some(Sex::Female)), Some(Daughter));
        assert_eq!(inverse_of(Son, Some(Sex::Male)), Some(Father));
        assert_eq!(inverse_of(Daughter, Some(Sex::Male)), Some(Father));
        assert_eq!(inverse_of(Son, Some(Sex::Female)), Some(Mother));
        assert_eq!(inverse_of(Daughter, Some(Sex::Female)), Some(Mother));
        assert_eq!(inverse_of(Husband, Some(Sex::Female)), Some(Wife));
        assert_eq!(inverse_of(Wife, Some(Sex::Male)), Some(Husband));
        assert_eq!(inverse_of(Spouse, Some(Sex::Male)), Some(Spouse));
    }

    #[test]
    fn test_only_parent_child_types_need_gender() {
        for rel in RelationshipType::ALL {
            let result = inverse_of(rel, None);
            assert_eq!(result.is_none(), rel.requires_gender_context(), "{}", rel);
        }
        assert_eq!(inverse_of(Husband, None), Some(Wife));
        assert_eq!(inverse_of(Spouse, None), Some(Spouse));
    }

    #[test]
    fn test_resolver_reports_unsupported_gender() {
        let resolver = InverseResolver::default();

        assert_eq!(resolver.inverse_for_gender(1, Some(2), Father).unwrap(), Daughter);

        let err = resolver.inverse_for_gender(1, Some(3), Father).unwrap_err();
        assert!(matches!(err, KinshipError::IndeterminateInverse { person_id: 1, .. }));

        let err = resolver.inverse_for_gender(1, None, Son).unwrap_err();
        assert!(err.to_string().contains("not recorded"));

        assert_eq!(resolver.inverse_for_gender(1, None, Wife).unwrap(), Husband);
    }

    #[test]
    fn test_related_gender_must_match_parent_child_type() {
        let resolver = InverseResolver::default();
        let mother = Person {
            person_id: 5,
            gender_id: Some(2),
            ..Default::default()
        };

        assert!(resolver.check_related_gender(&mother, Mother).is_ok());
        assert!(resolver.check_related_gender(&mother, Daughter).is_ok());
        assert!(matches!(
            resolver.check_related_gender(&mother, Father),
            Err(KinshipError::Validation(_))
        ));
        // Spouse types are never gender-checked
        assert!(resolver.check_related_gender(&mother, Husband).is_ok());
    }
}
