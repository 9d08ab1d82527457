//! Strategy planning
//!
//! Builds the fixed set of search strategies for one request. Planning is
//! pure: it decides queries, target source and skip reasons, and never
//! touches the network. Strategies with no applicable input leave here
//! already `skipped`.

use crate::sources::{PatentSource, SourceSet};
use crate::types::{Country, PatentRecord, QueryDescriptor, QueryField, SearchRequest, SearchStrategy};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::warn;

pub const SKIP_NO_APPLICANTS: &str = "no_applicants_provided";
pub const SKIP_REGISTRY_DISABLED: &str = "secondary_registry_disabled";
pub const SKIP_NATIONAL_OFFICE_NOT_TARGETED: &str = "national_office_not_targeted";
pub const SKIP_SOURCE_NOT_CONFIGURED: &str = "source_not_configured";
pub const SKIP_NO_QUERIES: &str = "no_queries";

/// Development codes searched by the textual strategy
const TEXTUAL_DEV_CODES: usize = 5;

/// Applicants searched by the applicant strategy
const MAX_APPLICANTS: usize = 10;

/// Pharmaceutical classification subclasses and groups
const IPC_TERMS: [&str; 5] = ["A61K", "A61P", "A61K9", "A61K31", "A61K47"];

/// Dosage-form vocabulary used by the national office
const FORMULATION_TERMS: [&str; 8] = [
    "comprimido",
    "capsula",
    "injetavel",
    "formulacao",
    "composicao farmaceutica",
    "liberacao controlada",
    "liberacao sustentada",
    "forma farmaceutica",
];

/// Solid-form and salt vocabulary used by the national office
const DERIVATIVE_TERMS: [&str; 10] = [
    "polimorfo",
    "forma cristalina",
    "sal",
    "hidrato",
    "solvato",
    "anidro",
    "cloridrato",
    "sulfato",
    "fosfato",
    "cristal",
];

/// Post-filter applied to a strategy's extracted records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Keep records filed on or after the date; undated records are dropped
    FiledOnOrAfter(NaiveDate),
}

impl RecordFilter {
    pub fn accepts(&self, record: &PatentRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::FiledOnOrAfter(cutoff) => record.filing_date.is_some_and(|d| d >= *cutoff),
        }
    }
}

/// A strategy together with the source it queries
pub struct StrategyPlan {
    pub strategy: SearchStrategy,
    pub source: Option<Arc<dyn PatentSource>>,
    pub filter: RecordFilter,
}

impl StrategyPlan {
    fn new(strategy: SearchStrategy, source: Option<Arc<dyn PatentSource>>) -> Self {
        Self {
            strategy,
            source,
            filter: RecordFilter::All,
        }
    }

    fn skipped(mut strategy: SearchStrategy, reason: &str) -> Self {
        if let Err(e) = strategy.skip(reason) {
            warn!(error = %e, "Planned strategy was not pending");
        }
        Self::new(strategy, None)
    }

    fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Build every strategy for `request`
///
/// `request` is expected to be validated and synonym-expanded.
pub fn plan_strategies(
    request: &SearchRequest,
    targets: &[Country],
    sources: &SourceSet,
    recent_filing_cutoff: NaiveDate,
) -> Vec<StrategyPlan> {
    let molecule = request.molecule.trim();
    let national_targeted = targets.contains(&Country::Br);
    let national = |id: &str, name: &str, queries: Vec<QueryDescriptor>| {
        let strategy = SearchStrategy::new(id, name, queries);
        if !national_targeted {
            StrategyPlan::skipped(strategy, SKIP_NATIONAL_OFFICE_NOT_TARGETED)
        } else {
            ready(strategy, &sources.national_office)
        }
    };

    let mut plans = Vec::with_capacity(8);

    // 1. Molecule, brand, development codes
    let mut textual = Vec::new();
    push_unique(&mut textual, QueryDescriptor::new(molecule, "molecule", QueryField::TitleAndAbstract));
    if let Some(brand) = brand_name(request) {
        push_unique(&mut textual, QueryDescriptor::new(brand, "brand", QueryField::TitleAndAbstract));
    }
    for code in request.dev_codes.iter().take(TEXTUAL_DEV_CODES) {
        push_unique(
            &mut textual,
            QueryDescriptor::new(code.trim(), format!("dev_code:{}", code.trim()), QueryField::TitleAndAbstract),
        );
    }
    if let Some(brand) = brand_name(request) {
        push_unique(
            &mut textual,
            QueryDescriptor::new(format!("{} {}", molecule, brand), "molecule+brand", QueryField::TitleAndAbstract),
        );
    }
    plans.push(national("textual_multi_term", "Textual Multi-Term", textual));

    // 2. Known applicants
    let applicants: Vec<QueryDescriptor> = request
        .applicants
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .take(MAX_APPLICANTS)
        .map(|a| QueryDescriptor::new(format!("{} {}", a, molecule), format!("applicant:{}", a), QueryField::Applicant))
        .collect();
    if applicants.is_empty() && national_targeted {
        plans.push(StrategyPlan::skipped(
            SearchStrategy::new("applicant", "Applicant/Titular", Vec::new()),
            SKIP_NO_APPLICANTS,
        ));
    } else {
        plans.push(national("applicant", "Applicant/Titular", applicants));
    }

    // 3. Pharmaceutical classification
    let ipc = IPC_TERMS
        .iter()
        .map(|code| QueryDescriptor::new(format!("{} {}", molecule, code), format!("ipc:{}", code), QueryField::Classification))
        .collect();
    plans.push(national("ipc_pharmaceutical", "IPC/CPC Pharmaceutical", ipc));

    // 4. Recent filings
    let recent = vec![QueryDescriptor::new(molecule, "recent", QueryField::TitleAndAbstract)];
    let name = format!("Temporal Recent (since {})", recent_filing_cutoff);
    plans.push(
        national("temporal_recent", &name, recent)
            .with_filter(RecordFilter::FiledOnOrAfter(recent_filing_cutoff)),
    );

    // 5-6. Formulation and solid-form vocabulary
    plans.push(national("formulations", "Formulations", vocabulary_queries(molecule, &FORMULATION_TERMS, "formulation")));
    plans.push(national(
        "polymorphs_salts",
        "Polymorphs & Salts",
        vocabulary_queries(molecule, &DERIVATIVE_TERMS, "derivative"),
    ));

    // 7. Search engine, per target country
    let mut engine_terms: Vec<(String, String)> = vec![(molecule.to_string(), "molecule".to_string())];
    if let Some(brand) = brand_name(request) {
        engine_terms.push((brand.to_string(), "brand".to_string()));
    }
    for code in &request.dev_codes {
        engine_terms.push((code.trim().to_string(), format!("dev_code:{}", code.trim())));
    }
    if let Some(cas) = request.cas_number.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        engine_terms.push((cas.to_string(), "cas".to_string()));
    }
    let mut engine_queries = Vec::new();
    for country in targets {
        for (term, label) in &engine_terms {
            push_unique(
                &mut engine_queries,
                QueryDescriptor::new(term.as_str(), format!("{}@{}", label, country), QueryField::TitleAndAbstract)
                    .in_country(*country),
            );
        }
    }
    plans.push(ready(
        SearchStrategy::new("search_engine", "Search Engine", engine_queries),
        &sources.search_engine,
    ));

    // 8. International registry
    let registry = SearchStrategy::new(
        "international_registry",
        "International Registry",
        std::iter::once((molecule.to_string(), "molecule".to_string()))
            .chain(request.dev_codes.iter().map(|c| (c.trim().to_string(), format!("dev_code:{}", c.trim()))))
            .map(|(term, label)| QueryDescriptor::new(term, label, QueryField::TitleAndAbstract).in_country(Country::Wo))
            .collect(),
    );
    if request.options.include_secondary_registry {
        plans.push(ready(registry, &sources.registry));
    } else {
        plans.push(StrategyPlan::skipped(registry, SKIP_REGISTRY_DISABLED));
    }

    plans
}

fn ready(strategy: SearchStrategy, source: &Option<Arc<dyn PatentSource>>) -> StrategyPlan {
    match source {
        Some(source) if !strategy.queries.is_empty() => StrategyPlan::new(strategy, Some(Arc::clone(source))),
        Some(_) => StrategyPlan::skipped(strategy, SKIP_NO_QUERIES),
        None => StrategyPlan::skipped(strategy, SKIP_SOURCE_NOT_CONFIGURED),
    }
}

fn brand_name(request: &SearchRequest) -> Option<&str> {
    request.brand_name.as_deref().map(str::trim).filter(|b| !b.is_empty())
}

fn vocabulary_queries(molecule: &str, terms: &[&str], kind: &str) -> Vec<QueryDescriptor> {
    terms
        .iter()
        .map(|term| {
            QueryDescriptor::new(format!("{} {}", molecule, term), format!("{}:{}", kind, term), QueryField::TitleAndAbstract)
        })
        .collect()
}

/// Append unless the same term already targets the same country
fn push_unique(queries: &mut Vec<QueryDescriptor>, query: QueryDescriptor) {
    if query.term.trim().is_empty() {
        return;
    }
    let duplicate = queries
        .iter()
        .any(|q| q.country == query.country && q.term.eq_ignore_ascii_case(&query.term));
    if !duplicate {
        queries.push(query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawRecord, SourceError, SourceKind, StrategyStatus};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoopSource;

    #[async_trait]
    impl PatentSource for NoopSource {
        fn kind(&self) -> SourceKind {
            SourceKind::NationalOffice
        }

        fn call_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn search(&self, _query: &QueryDescriptor) -> Result<Vec<RawRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn all_sources() -> SourceSet {
        let source: Arc<dyn PatentSource> = Arc::new(NoopSource);
        SourceSet {
            national_office: Some(source.clone()),
            registry: Some(source.clone()),
            search_engine: Some(source),
        }
    }

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn find<'a>(plans: &'a [StrategyPlan], id: &str) -> &'a StrategyPlan {
        plans.iter().find(|p| p.strategy.id == id).unwrap()
    }

    #[test]
    fn test_plans_eight_strategies() {
        let mut request = SearchRequest::for_molecule("darolutamide");
        request.brand_name = Some("Nubeqa".to_string());
        request.dev_codes = vec!["ODM-201".to_string(), "BAY-1841788".to_string()];

        let plans = plan_strategies(&request, &[Country::Br], &all_sources(), cutoff());
        assert_eq!(plans.len(), 8);

        let textual = find(&plans, "textual_multi_term");
        let terms: Vec<&str> = textual.strategy.queries.iter().map(|q| q.term.as_str()).collect();
        assert_eq!(terms, vec!["darolutamide", "Nubeqa", "ODM-201", "BAY-1841788", "darolutamide Nubeqa"]);
        assert_eq!(find(&plans, "formulations").strategy.queries.len(), 8);
        assert_eq!(find(&plans, "polymorphs_salts").strategy.queries.len(), 10);
        assert_eq!(find(&plans, "ipc_pharmaceutical").strategy.queries.len(), 5);
    }

    #[test]
    fn test_skip_reasons() {
        let request = SearchRequest::for_molecule("darolutamide");
        let plans = plan_strategies(&request, &[Country::Br], &all_sources(), cutoff());

        let applicant = find(&plans, "applicant");
        assert_eq!(applicant.strategy.status, StrategyStatus::Skipped);
        assert_eq!(applicant.strategy.skip_reason.as_deref(), Some(SKIP_NO_APPLICANTS));

        let registry = find(&plans, "international_registry");
        assert_eq!(registry.strategy.skip_reason.as_deref(), Some(SKIP_REGISTRY_DISABLED));
    }

    #[test]
    fn test_national_strategies_skip_without_br_target() {
        let request = SearchRequest::for_molecule("darolutamide");
        let plans = plan_strategies(&request, &[Country::Us, Country::Jp], &all_sources(), cutoff());

        let textual = find(&plans, "textual_multi_term");
        assert_eq!(
            textual.strategy.skip_reason.as_deref(),
            Some(SKIP_NATIONAL_OFFICE_NOT_TARGETED)
        );
        let engine = find(&plans, "search_engine");
        assert_eq!(engine.strategy.status, StrategyStatus::Pending);
        assert_eq!(engine.strategy.queries.len(), 2);
        assert_eq!(engine.strategy.queries[1].country, Some(Country::Jp));
    }

    #[test]
    fn test_missing_source_skips() {
        let request = SearchRequest::for_molecule("darolutamide");
        let plans = plan_strategies(&request, &[Country::Br], &SourceSet::default(), cutoff());
        assert_eq!(
            find(&plans, "search_engine").strategy.skip_reason.as_deref(),
            Some(SKIP_SOURCE_NOT_CONFIGURED)
        );
    }

    #[test]
    fn test_recent_filter() {
        let plans = plan_strategies(
            &SearchRequest::for_molecule("darolutamide"),
            &[Country::Br],
            &all_sources(),
            cutoff(),
        );
        assert_eq!(
            find(&plans, "temporal_recent").filter,
            RecordFilter::FiledOnOrAfter(cutoff())
        );
    }
}
