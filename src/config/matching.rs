//! Monitored-value filters.
//!
//! A filter list bounds the cardinality of free-form label values such as
//! request URIs or event-bus addresses. An empty list records every value
//! verbatim. A non-empty list records matching values (or their alias) and
//! folds everything else into [`UriFilter::OTHER`].

use regex::Regex;
use serde::Deserialize;

use super::validation::ValidationError;

/// How a [`Match`] value is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Exact string equality.
    #[default]
    Equals,
    /// Full-string regular expression match.
    Regex,
}

/// A single monitored value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Match {
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: MatchType,
    /// Label value recorded instead of the matched value.
    pub alias: Option<String>,
}

impl Match {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: MatchType::Equals,
            alias: None,
        }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: MatchType::Regex,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

#[derive(Debug)]
enum Rule {
    Equals(String),
    Regex(Regex),
}

/// Compiled form of a `Match` list.
#[derive(Debug, Default)]
pub struct UriFilter {
    rules: Vec<(Rule, Option<String>)>,
}

impl UriFilter {
    /// Label value recorded for values outside a non-empty filter.
    pub const OTHER: &'static str = "*";

    /// Compile a match list. Regex values are anchored to the whole string.
    pub fn new(matches: &[Match]) -> Result<Self, ValidationError> {
        let mut rules = Vec::with_capacity(matches.len());
        for m in matches {
            let rule = match m.kind {
                MatchType::Equals => Rule::Equals(m.value.clone()),
                MatchType::Regex => {
                    let anchored = format!("^(?:{})$", m.value);
                    let re = Regex::new(&anchored).map_err(|e| ValidationError::InvalidPattern {
                        pattern: m.value.clone(),
                        reason: e.to_string(),
                    })?;
                    Rule::Regex(re)
                }
            };
            rules.push((rule, m.alias.clone()));
        }
        Ok(Self { rules })
    }

    /// True when every value is recorded verbatim.
    pub fn is_passthrough(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve the label value recorded for `value`.
    pub fn label<'a>(&'a self, value: &'a str) -> &'a str {
        if self.rules.is_empty() {
            return value;
        }
        for (rule, alias) in &self.rules {
            let hit = match rule {
                Rule::Equals(expected) => expected == value,
                Rule::Regex(re) => re.is_match(value),
            };
            if hit {
                return alias.as_deref().unwrap_or(value);
            }
        }
        Self::OTHER
    }
}
