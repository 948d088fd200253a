//! The clause warehouse: prewritten legal clauses keyed by id and category.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KetavError, KetavResult};

const BUILTIN_CATALOG: &str = include_str!("../data/clauses.json");

/// Which parties' genders a clause's wording depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenderVariables {
    pub principal: bool,
    pub attorney: bool,
}

/// A catalog entry. `content` is template text and is rendered in the scope of
/// the document that includes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseTemplate {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub gender_variables: GenderVariables,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct CatalogFile {
    version: String,
    clauses: Vec<ClauseTemplate>,
}

/// An immutable, versioned set of clauses.
#[derive(Debug, Clone, Default)]
pub struct ClauseCatalog {
    version: String,
    clauses: Vec<ClauseTemplate>,
    index: HashMap<String, usize>,
}

impl ClauseCatalog {
    /// Builds a catalog, rejecting duplicate ids.
    ///
    /// # Errors
    /// Returns [`KetavError::DuplicateClause`] if two clauses share an id.
    pub fn from_clauses<V: Into<String>>(
        version: V,
        clauses: Vec<ClauseTemplate>,
    ) -> KetavResult<Self> {
        let mut index = HashMap::with_capacity(clauses.len());
        for (position, clause) in clauses.iter().enumerate() {
            if index.insert(clause.id.clone(), position).is_some() {
                return Err(KetavError::DuplicateClause {
                    id: clause.id.clone(),
                });
            }
        }

        Ok(Self {
            version: version.into(),
            clauses,
            index,
        })
    }

    /// Parses a catalog from JSON of the form `{"version": .., "clauses": [..]}`.
    ///
    /// # Errors
    /// Returns [`KetavError::Catalog`] for invalid JSON and
    /// [`KetavError::DuplicateClause`] for repeated ids.
    pub fn from_json(json: &str) -> KetavResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::from_clauses(file.version, file.clauses)
    }

    /// The catalog shipped with the crate.
    ///
    /// # Errors
    /// Only if the embedded catalog is invalid.
    pub fn builtin() -> KetavResult<Self> {
        let catalog = Self::from_json(BUILTIN_CATALOG)?;
        info!(
            version = %catalog.version,
            clauses = catalog.len(),
            "loaded builtin clause catalog"
        );
        Ok(catalog)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClauseTemplate> {
        self.clauses.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ClauseTemplate> {
        self.index
            .get(id)
            .and_then(|position| self.clauses.get(*position))
    }

    /// The raw template text of a clause.
    pub fn content(&self, id: &str) -> Option<&str> {
        self.get(id).map(|clause| clause.content.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn by_category<'s>(&'s self, category: &'s str) -> impl Iterator<Item = &'s ClauseTemplate> {
        self.clauses
            .iter()
            .filter(move |clause| clause.category == category)
    }

    /// Distinct categories, sorted.
    pub fn categories(&self) -> Vec<&str> {
        self.clauses
            .iter()
            .map(|clause| clause.category.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn with_tag<'s>(&'s self, tag: &'s str) -> impl Iterator<Item = &'s ClauseTemplate> {
        self.clauses
            .iter()
            .filter(move |clause| clause.tags.iter().any(|t| t == tag))
    }

    /// The ids in `ids` that the catalog does not contain, in the given order.
    ///
    /// Callers that need every clause to resolve should check this before
    /// rendering.
    pub fn unknown_ids<'i, S: AsRef<str>>(&self, ids: &'i [S]) -> Vec<&'i str> {
        ids.iter()
            .map(AsRef::as_ref)
            .filter(|id| !self.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(id: &str, category: &str) -> ClauseTemplate {
        ClauseTemplate {
            id: id.to_string(),
            category: category.to_string(),
            subcategory: None,
            title: id.to_string(),
            content: format!("content of {}", id),
            variables: vec![],
            gender_variables: GenderVariables::default(),
            tags: vec![],
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_builtin_catalog_loads() {
        let catalog = ClauseCatalog::builtin().unwrap();
        assert!(!catalog.is_empty(), "builtin catalog should not be empty");
        assert!(!catalog.version().is_empty());
        for clause in catalog.iter() {
            assert!(
                catalog.contains(&clause.id),
                "clause {} should be indexed",
                clause.id
            );
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_duplicate_ids_rejected() {
        let result = ClauseCatalog::from_clauses("1", vec![clause("a", "x"), clause("a", "y")]);
        assert_eq!(
            result.unwrap_err(),
            KetavError::DuplicateClause {
                id: "a".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_lookup_and_categories() {
        let catalog = ClauseCatalog::from_clauses(
            "1",
            vec![clause("b", "will"), clause("a", "poa"), clause("c", "will")],
        )
        .unwrap();

        assert_eq!(catalog.content("a"), Some("content of a"));
        assert_eq!(catalog.content("zzz"), None);
        assert_eq!(catalog.categories(), vec!["poa", "will"]);
        assert_eq!(
            catalog
                .by_category("will")
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert_eq!(catalog.unknown_ids(&["a", "nope", "c"]), vec!["nope"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_from_json_camel_case_fields() {
        let catalog = ClauseCatalog::from_json(
            r#"{
                "version": "test",
                "clauses": [{
                    "id": "poa-scope",
                    "category": "power_of_attorney",
                    "title": "היקף",
                    "content": "{{gender.attorney:רשאי|רשאית}}",
                    "genderVariables": {"attorney": true},
                    "tags": ["scope"]
                }]
            }"#,
        )
        .unwrap();

        let clause = catalog.get("poa-scope").unwrap();
        assert!(clause.gender_variables.attorney);
        assert!(!clause.gender_variables.principal);
        assert_eq!(catalog.with_tag("scope").count(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_from_json_invalid() {
        assert!(matches!(
            ClauseCatalog::from_json("{not json"),
            Err(KetavError::Catalog { .. })
        ));
    }
}
