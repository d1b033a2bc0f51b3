// Local search over cached collections
//
// Matching rules:
// - an id filter wins over text terms (visits also match on their pet id)
// - no id and no terms matches nothing
// - otherwise every term must be a substring of at least one search field

use crate::cache::CollectionCache;
use crate::entities::{Domain, Owner, Pet, Record, Visit};
use crate::query::{ParsedQuery, SearchDomain};
use crate::source::{CollectionSource, FetchError};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<R> {
    pub domain: Domain,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub data: Vec<R>,
}

/// One domain's page of matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResult {
    Owners(Page<Owner>),
    Pets(Page<Pet>),
    Visits(Page<Visit>),
}

impl SearchResult {
    pub fn domain(&self) -> Domain {
        match self {
            SearchResult::Owners(_) => Domain::Owners,
            SearchResult::Pets(_) => Domain::Pets,
            SearchResult::Visits(_) => Domain::Visits,
        }
    }

    pub fn total(&self) -> usize {
        match self {
            SearchResult::Owners(p) => p.total,
            SearchResult::Pets(p) => p.total,
            SearchResult::Visits(p) => p.total,
        }
    }
}

pub fn row_matches_terms<R: Record>(row: &R, terms: &[String]) -> bool {
    if terms.is_empty() {
        return false;
    }

    let fields: Vec<String> = row
        .search_fields()
        .into_iter()
        .map(|f| f.to_lowercase())
        .collect();

    terms
        .iter()
        .all(|term| fields.iter().any(|field| field.contains(term.as_str())))
}

pub fn match_rows<R: Record>(rows: &[R], query: &ParsedQuery) -> Vec<R> {
    match query.id {
        Some(id) if id > 0 => rows.iter().filter(|r| r.matches_id(id)).cloned().collect(),
        _ => rows
            .iter()
            .filter(|r| row_matches_terms(*r, &query.terms))
            .cloned()
            .collect(),
    }
}

pub fn paginate<R>(domain: Domain, items: Vec<R>, page: usize, per_page: usize) -> Page<R> {
    let page = page.max(1);
    let per_page = per_page.max(1);
    let total = items.len();
    let data = items
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    Page {
        domain,
        page,
        per_page,
        total,
        data,
    }
}

/// Searches cached collections; the cache may be shared with live tables.
pub struct SearchEngine<S> {
    cache: Arc<CollectionCache<S>>,
}

impl<S> Clone for SearchEngine<S> {
    fn clone(&self) -> Self {
        SearchEngine {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: CollectionSource> SearchEngine<S> {
    pub fn new(cache: Arc<CollectionCache<S>>) -> Self {
        SearchEngine { cache }
    }

    pub fn cache(&self) -> &Arc<CollectionCache<S>> {
        &self.cache
    }

    /// One result per searched domain, in owners, pets, visits order.
    pub async fn search(&self, query: &ParsedQuery) -> Result<Vec<SearchResult>, FetchError> {
        debug!(id = ?query.id, terms = query.terms.len(), domain = ?query.domain, "search");

        let results = match query.domain {
            SearchDomain::Only(Domain::Owners) => {
                vec![SearchResult::Owners(self.search_domain(query).await?)]
            }
            SearchDomain::Only(Domain::Pets) => {
                vec![SearchResult::Pets(self.search_domain(query).await?)]
            }
            SearchDomain::Only(Domain::Visits) => {
                vec![SearchResult::Visits(self.search_domain(query).await?)]
            }
            SearchDomain::Any => {
                let (owners, pets, visits) = tokio::try_join!(
                    self.search_domain::<Owner>(query),
                    self.search_domain::<Pet>(query),
                    self.search_domain::<Visit>(query),
                )?;
                vec![
                    SearchResult::Owners(owners),
                    SearchResult::Pets(pets),
                    SearchResult::Visits(visits),
                ]
            }
        };

        Ok(results)
    }

    pub async fn search_domain<R: Record>(&self, query: &ParsedQuery) -> Result<Page<R>, FetchError> {
        let rows = self.cache.get::<R>().await?;
        let matched = match_rows(&rows, query);
        Ok(paginate(R::DOMAIN, matched, query.page, query.per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::query::parse_query;
    use crate::source::testing::FakeSource;
    use chrono::NaiveDate;

    fn pet(id: i64, name: &str, species: &str, condition: &str) -> Pet {
        Pet {
            id,
            name: name.to_string(),
            age: 3,
            species: species.to_string(),
            birth_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            condition: condition.to_string(),
            owner_ids: vec![],
        }
    }

    fn visit(id: i64, pet_id: i64, diagnosis: &str) -> Visit {
        Visit {
            id,
            pet_id,
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            diagnosis: diagnosis.to_string(),
            treatment: "Reposo".to_string(),
        }
    }

    fn pets() -> Vec<Pet> {
        vec![
            pet(1, "Negro", "Gato", "Healthy"),
            pet(2, "Negro", "Perro", "Healthy"),
            pet(3, "Blanca", "Gato", "Negro de ánimo"),
            pet(5, "Luna", "Gato", "Healthy"),
        ]
    }

    #[test]
    fn test_id_filter_ignores_terms() {
        let matched = match_rows(&pets(), &parse_query("#5 negro"));
        assert_eq!(matched.iter().map(|p| p.id).collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_terms_are_and_combined() {
        let matched = match_rows(&pets(), &parse_query("negro gato"));
        assert_eq!(matched.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_no_id_and_no_terms_matches_nothing() {
        assert!(match_rows(&pets(), &parse_query("   ")).is_empty());
    }

    #[test]
    fn test_visit_id_filter_matches_pet_id() {
        let visits = vec![visit(1, 9, "Otitis"), visit(9, 2, "Control"), visit(3, 4, "Sarna")];
        let matched = match_rows(&visits, &parse_query("9"));
        assert_eq!(matched.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1, 9]);
    }

    #[test]
    fn test_visit_terms_match_date() {
        let visits = vec![visit(1, 9, "Otitis")];
        assert_eq!(match_rows(&visits, &parse_query("2024-02")).len(), 1);
    }

    #[test]
    fn test_paginate() {
        let page = paginate(Domain::Pets, (1..=25).collect::<Vec<i64>>(), 3, 10);
        assert_eq!(page.total, 25);
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);

        let beyond = paginate(Domain::Pets, vec![1, 2], 4, 10);
        assert!(beyond.data.is_empty());
        assert_eq!(beyond.total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_domain_searches_all_three() {
        let source = FakeSource::default();
        source.set_pets(pets());
        *source.visits.lock().unwrap() = vec![visit(7, 1, "Gato con otitis")];
        let engine = SearchEngine::new(Arc::new(CollectionCache::new(source, DEFAULT_TTL)));

        let results = engine.search(&parse_query("gato")).await.unwrap();

        let domains: Vec<Domain> = results.iter().map(SearchResult::domain).collect();
        assert_eq!(domains, vec![Domain::Owners, Domain::Pets, Domain::Visits]);
        assert_eq!(results[0].total(), 0);
        assert_eq!(results[1].total(), 3);
        assert_eq!(results[2].total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_searches_within_ttl_fetch_once() {
        let source = FakeSource::default();
        source.set_pets(pets());
        let engine = SearchEngine::new(Arc::new(CollectionCache::new(source, DEFAULT_TTL)));
        let query = parse_query("luna").with_domain(SearchDomain::Only(Domain::Pets));

        engine.search(&query).await.unwrap();
        engine.search(&query).await.unwrap();
        assert_eq!(engine.cache().source().calls(), 1);

        tokio::time::advance(DEFAULT_TTL + std::time::Duration::from_millis(1)).await;
        engine.search(&query).await.unwrap();
        assert_eq!(engine.cache().source().calls(), 2);
    }
}
