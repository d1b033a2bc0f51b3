// Search input parsing
//
// Whitespace splits tokens; a "double" or 'single' quoted run is one token.
// `#12` or `12` is an exact-id filter (the last one typed wins). Everything
// else becomes a lowercased text term, and all terms must match.

use crate::entities::Domain;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_PER_PAGE: usize = 10;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""([^"]+)"|'([^']+)'|\S+"#).expect("token pattern compiles")
    })
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#?(\d+)$").expect("id pattern compiles"))
}

/// Which collections a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDomain {
    #[default]
    Any,
    Only(Domain),
}

impl SearchDomain {
    /// Unknown names fall back to `Any`.
    pub fn parse(s: &str) -> SearchDomain {
        match Domain::parse(s) {
            Some(domain) => SearchDomain::Only(domain),
            None => SearchDomain::Any,
        }
    }

    pub fn domains(&self) -> Vec<Domain> {
        match self {
            SearchDomain::Any => Domain::ALL.to_vec(),
            SearchDomain::Only(domain) => vec![*domain],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub raw: String,
    pub tokens: Vec<String>,
    pub terms: Vec<String>,
    pub id: Option<i64>,
    pub page: usize,
    pub per_page: usize,
    pub domain: SearchDomain,
}

impl ParsedQuery {
    /// Terms joined by a space, `None` when there are none.
    pub fn text(&self) -> Option<String> {
        if self.terms.is_empty() {
            None
        } else {
            Some(self.terms.join(" "))
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_domain(mut self, domain: SearchDomain) -> Self {
        self.domain = domain;
        self
    }
}

pub fn tokenize(input: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(input.trim())
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

pub fn parse_query(input: &str) -> ParsedQuery {
    let tokens = tokenize(input);
    let mut id = None;
    let mut terms = Vec::new();

    for token in &tokens {
        if let Some(caps) = id_pattern().captures(token) {
            // Digits too long for i64 are not a usable id; drop the token.
            id = caps[1].parse::<i64>().ok().or(id);
            continue;
        }

        let term = token.trim().to_lowercase();
        if !term.is_empty() {
            terms.push(term);
        }
    }

    ParsedQuery {
        raw: input.to_string(),
        tokens,
        terms,
        id,
        page: 1,
        per_page: DEFAULT_PER_PAGE,
        domain: SearchDomain::Any,
    }
}
