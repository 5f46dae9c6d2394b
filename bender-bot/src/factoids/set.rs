//! Factoids and the per-keyword deduplicating set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

use super::FactoidError;

/// A single stored fact with its provenance.
///
/// Optional fields are omitted from the database file when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factoid {
    pub value: String,
    /// Nick of whoever stored it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Linking word used when it was stored ("is" / "er").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Factoid {
    /// A fact with no provenance.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: None,
            split_word: None,
            language: None,
            created: None,
        }
    }
}

/// A fact as submitted for storage, before its text has been validated.
#[derive(Debug, Clone, Default)]
pub struct NewFactoid {
    pub value: Vec<u8>,
    pub origin: Option<String>,
    pub split_word: Option<String>,
    pub language: Option<String>,
}

impl NewFactoid {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn split_word(mut self, split_word: impl Into<String>, language: impl Into<String>) -> Self {
        self.split_word = Some(split_word.into());
        self.language = Some(language.into());
        self
    }

    /// Validate the text and stamp the creation time.
    pub(crate) fn into_factoid(self, created: DateTime<Utc>) -> Result<Factoid, FactoidError> {
        let value = String::from_utf8(self.value).map_err(|_| FactoidError::InvalidEncoding)?;
        Ok(Factoid {
            value,
            origin: self.origin,
            split_word: self.split_word,
            language: self.language,
            created: Some(created),
        })
    }
}

/// The facts stored under one keyword, keyed by their own text so the same
/// value can never be stored twice.
///
/// Serialized as a plain list of facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Factoid>", into = "Vec<Factoid>")]
pub struct FactoidSet {
    facts: BTreeMap<String, Factoid>,
}

impl FactoidSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact. Returns false (and leaves the set untouched) if a fact
    /// with identical text is already present.
    pub fn insert(&mut self, fact: Factoid) -> bool {
        if self.facts.contains_key(&fact.value) {
            return false;
        }
        self.facts.insert(fact.value.clone(), fact);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.facts.contains_key(value)
    }

    pub fn remove(&mut self, value: &str) -> Option<Factoid> {
        self.facts.remove(value)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Factoid> {
        self.facts.values()
    }

    /// All fact texts, in sorted order.
    pub fn texts(&self) -> Vec<String> {
        self.facts.keys().cloned().collect()
    }

    /// Facts whose text starts with `prefix`.
    pub fn starting_with<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Factoid> {
        self.facts
            .iter()
            .filter(move |(text, _)| text.starts_with(prefix))
            .map(|(_, fact)| fact)
    }

    /// One fact chosen uniformly at random; `None` if the set is empty.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Factoid> {
        self.facts.values().choose(rng)
    }
}

impl From<Vec<Factoid>> for FactoidSet {
    fn from(facts: Vec<Factoid>) -> Self {
        facts.into_iter().collect()
    }
}

impl From<FactoidSet> for Vec<Factoid> {
    fn from(set: FactoidSet) -> Self {
        set.facts.into_values().collect()
    }
}

impl FromIterator<Factoid> for FactoidSet {
    fn from_iter<I: IntoIterator<Item = Factoid>>(iter: I) -> Self {
        let mut set = Self::new();
        for fact in iter {
            set.insert(fact);
        }
        set
    }
}
