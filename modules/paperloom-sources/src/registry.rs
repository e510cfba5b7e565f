use std::sync::Arc;

use paperloom_common::{Config, PaperloomError};

use crate::adapter::SourceAdapter;
use crate::arxiv::ArxivAdapter;
use crate::crossref::CrossrefAdapter;
use crate::europepmc::EuropePmcAdapter;
use crate::http::Http;
use crate::openalex::OpenAlexAdapter;
use crate::pubmed::PubMedAdapter;
use crate::semantic_scholar::SemanticScholarAdapter;

/// Discipline keys for default source selection when the caller names no
/// sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    Biomedicine,
    ComputerScience,
    Physics,
    SocialScience,
    General,
}

impl std::str::FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "biomedicine" | "medicine" | "biology" => Ok(Discipline::Biomedicine),
            "computer_science" | "cs" => Ok(Discipline::ComputerScience),
            "physics" | "math" => Ok(Discipline::Physics),
            "social_science" | "psychology" | "economics" => Ok(Discipline::SocialScience),
            "general" => Ok(Discipline::General),
            other => Err(format!("Unknown discipline: {other}")),
        }
    }
}

impl Discipline {
    pub fn default_sources(&self) -> &'static [&'static str] {
        match self {
            Discipline::Biomedicine => &["pubmed", "europepmc", "semantic_scholar"],
            Discipline::ComputerScience => &["arxiv", "semantic_scholar", "openalex"],
            Discipline::Physics => &["arxiv", "openalex", "crossref"],
            Discipline::SocialScience => &["openalex", "crossref", "semantic_scholar"],
            Discipline::General => &["semantic_scholar", "openalex", "crossref"],
        }
    }
}

/// Holds every registered adapter in fixed priority order. Priority
/// decides which record is the dedup base when two providers return the
/// same entity.
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Build the full registry: pubmed, europepmc, semantic_scholar,
    /// openalex, crossref, arxiv.
    pub fn new(config: &Config) -> Self {
        let http = Http::new(config);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(PubMedAdapter::new(http.clone(), config.ncbi_api_key.clone())),
            Arc::new(EuropePmcAdapter::new(http.clone())),
            Arc::new(SemanticScholarAdapter::new(
                http.clone(),
                config.semantic_scholar_api_key.clone(),
            )),
            Arc::new(OpenAlexAdapter::new(http.clone(), config.mailto.clone())),
            Arc::new(CrossrefAdapter::new(http.clone(), config.mailto.clone())),
            Arc::new(ArxivAdapter::new(http)),
        ];
        Self { adapters }
    }

    /// Build a registry from explicit adapters. Used by tests with mocks.
    pub fn from_adapters(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn SourceAdapter>, PaperloomError> {
        self.adapters
            .iter()
            .find(|a| a.id() == id)
            .cloned()
            .ok_or_else(|| PaperloomError::UnknownSource(id.to_string()))
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adapters.iter().any(|a| a.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_registers_six_sources_in_priority_order() {
        let registry = SourceRegistry::new(&Config::default());
        assert_eq!(
            registry.ids(),
            vec![
                "pubmed",
                "europepmc",
                "semantic_scholar",
                "openalex",
                "crossref",
                "arxiv"
            ]
        );
    }

    #[test]
    fn unknown_source_is_a_configuration_error() {
        let registry = SourceRegistry::new(&Config::default());
        let err = registry.get("scopus").err().unwrap();
        assert!(matches!(err, PaperloomError::UnknownSource(_)));
    }

    #[test]
    fn discipline_defaults_only_name_registered_sources() {
        let registry = SourceRegistry::new(&Config::default());
        for discipline in [
            Discipline::Biomedicine,
            Discipline::ComputerScience,
            Discipline::Physics,
            Discipline::SocialScience,
            Discipline::General,
        ] {
            for id in discipline.default_sources() {
                assert!(registry.contains(id), "unregistered default: {id}");
            }
        }
    }
}
