//! Seam to the concept ontology: code lookup and descendant expansion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use timeline_core::{CodeSet, ConceptId, LabelError};

/// Read-only view of a concept hierarchy.
pub trait Ontology {
    /// Internal id for a concept code such as `SNOMED/372003004`.
    fn lookup(&self, code: &str) -> Option<ConceptId>;

    /// Descendant closure of `seeds`, seeds included.
    fn expand(&self, seeds: &CodeSet) -> CodeSet;
}

/// Ontology backed by a dictionary and a precomputed descendant closure.
///
/// Built once before labeling starts and shared read-only between workers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaticOntology {
    dictionary: BTreeMap<String, ConceptId>,
    #[serde(default)]
    descendants: BTreeMap<ConceptId, CodeSet>,
}

impl StaticOntology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `code` under `id`.
    pub fn with_code(mut self, code: &str, id: ConceptId) -> Self {
        self.dictionary.insert(code.to_string(), id);
        self
    }

    /// Record the full descendant set of `id` (excluding `id` itself).
    pub fn with_descendants(
        mut self,
        id: ConceptId,
        children: impl IntoIterator<Item = ConceptId>,
    ) -> Self {
        self.descendants.entry(id).or_default().extend(children);
        self
    }
}

impl Ontology for StaticOntology {
    fn lookup(&self, code: &str) -> Option<ConceptId> {
        self.dictionary.get(code).copied()
    }

    fn expand(&self, seeds: &CodeSet) -> CodeSet {
        let mut expanded = seeds.clone();
        for seed in seeds {
            if let Some(children) = self.descendants.get(seed) {
                expanded.extend(children.iter().copied());
            }
        }
        expanded
    }
}

/// Map concept codes to ids, optionally expanding to their descendants.
///
/// A code missing from the ontology is a configuration error unless `silent`
/// is set, in which case it is skipped.
pub fn resolve_codes<O: Ontology + ?Sized>(
    ontology: &O,
    codes: &[&str],
    expand: bool,
    silent: bool,
) -> Result<CodeSet, LabelError> {
    let mut seeds = CodeSet::new();
    for code in codes {
        match ontology.lookup(code) {
            Some(id) => {
                seeds.insert(id);
            }
            None if silent => {
                log::debug!("Concept code {code} not found in ontology, skipping");
            }
            None => return Err(LabelError::UnknownConcept((*code).to_string())),
        }
    }

    if expand {
        Ok(ontology.expand(&seeds))
    } else {
        Ok(seeds)
    }
}
