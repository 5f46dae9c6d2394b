//! The keyword -> facts map, kept in memory and mirrored to a JSON file.
//!
//! Writers hold the write lock across both the in-memory edit and the file
//! rewrite, so the file always holds a complete snapshot of some prior
//! state. Readers share the read lock.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{SubsecRound, Utc};
use parking_lot::RwLock;
use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;

use super::FactoidError;
use super::set::{Factoid, FactoidSet, NewFactoid};

type FactMap = BTreeMap<String, FactoidSet>;

/// Result of a database search.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Up to the requested number of `(keyword, fact)` pairs, in no
    /// particular order.
    pub matches: Vec<(String, Factoid)>,
    /// Further matches that were not included.
    pub additional: usize,
}

/// Thread-safe factoid database.
pub struct FactoidStore {
    path: PathBuf,
    facts: RwLock<FactMap>,
}

/// Keywords are trimmed and lowercased on the way in.
pub fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

impl FactoidStore {
    /// Open the database at `path`. A missing file yields an empty store
    /// that will be created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FactoidError> {
        let path = path.into();
        let facts = match std::fs::read(&path) {
            Ok(content) => {
                let on_disk: FactMap = serde_json::from_slice(&content).map_err(|source| {
                    FactoidError::Parse {
                        path: path.clone(),
                        source,
                    }
                })?;
                normalize_map(on_disk)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No factoid database yet, starting empty");
                FactMap::new()
            }
            Err(source) => {
                return Err(FactoidError::Load {
                    path: path.clone(),
                    source,
                });
            }
        };
        tracing::info!(
            path = %path.display(),
            keywords = facts.len(),
            "Loaded factoid database"
        );
        Ok(Self {
            path,
            facts: RwLock::new(facts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keywords.
    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.read().is_empty()
    }

    /// Store a fact under `keyword` and rewrite the database file.
    ///
    /// A [`FactoidError::Sync`] means the fact *is* stored in memory but the
    /// file could not be updated.
    pub fn set(&self, keyword: &str, fact: NewFactoid) -> Result<Factoid, FactoidError> {
        let fact = fact.into_factoid(Utc::now().trunc_subsecs(0))?;
        let keyword = normalize_keyword(keyword);

        let mut facts = self.facts.write();
        if facts.get(&keyword).is_some_and(|set| set.contains(&fact.value)) {
            return Err(FactoidError::AlreadyExists);
        }
        facts.entry(keyword).or_default().insert(fact.clone());
        sync_to_disk(&self.path, &facts).map_err(|e| e.for_fact(&fact))?;
        Ok(fact)
    }

    /// One fact for `keyword`, chosen uniformly at random.
    pub fn get(&self, keyword: &str) -> Result<Factoid, FactoidError> {
        self.get_with(keyword, &mut rand::thread_rng())
    }

    pub fn get_with<R: Rng + ?Sized>(&self, keyword: &str, rng: &mut R) -> Result<Factoid, FactoidError> {
        let facts = self.facts.read();
        facts
            .get(&normalize_keyword(keyword))
            .and_then(|set| set.random(rng))
            .cloned()
            .ok_or(FactoidError::NotFound)
    }

    /// Every fact text stored under `keyword`.
    pub fn get_all(&self, keyword: &str) -> Result<Vec<String>, FactoidError> {
        let facts = self.facts.read();
        match facts.get(&normalize_keyword(keyword)) {
            Some(set) if !set.is_empty() => Ok(set.texts()),
            _ => Err(FactoidError::NotFound),
        }
    }

    /// Delete the one fact under `keyword` whose text starts with `prefix`.
    ///
    /// No match is [`FactoidError::NotFound`]; several matches is
    /// [`FactoidError::Ambiguous`] and nothing is removed.
    pub fn delete(&self, keyword: &str, prefix: &str) -> Result<Factoid, FactoidError> {
        let keyword = normalize_keyword(keyword);

        let mut facts = self.facts.write();
        let set = facts.get_mut(&keyword).ok_or(FactoidError::NotFound)?;
        let mut matches = set.starting_with(prefix).map(|f| f.value.clone());
        let target = match (matches.next(), matches.next()) {
            (None, _) => return Err(FactoidError::NotFound),
            (Some(_), Some(_)) => return Err(FactoidError::Ambiguous),
            (Some(value), None) => value,
        };
        drop(matches);

        let removed = set.remove(&target).ok_or(FactoidError::NotFound)?;
        if set.is_empty() {
            facts.remove(&keyword);
        }
        sync_to_disk(&self.path, &facts).map_err(|e| e.for_fact(&removed))?;
        Ok(removed)
    }

    /// Match `pattern` against every stored fact text.
    pub fn search(&self, pattern: &Regex, max_results: usize) -> SearchResults {
        let facts = self.facts.read();
        let mut results = SearchResults::default();
        for (keyword, set) in facts.iter() {
            for fact in set.iter().filter(|f| pattern.is_match(&f.value)) {
                if results.matches.len() >= max_results {
                    results.additional += 1;
                } else {
                    results.matches.push((keyword.clone(), fact.clone()));
                }
            }
        }
        results
    }

    /// Sorted keywords matching `^prefix`. The prefix is a regular
    /// expression fragment.
    pub fn list_keys(&self, prefix: &str) -> Result<Vec<String>, FactoidError> {
        let pattern = Regex::new(&format!("^{prefix}"))?;
        let facts = self.facts.read();
        // BTreeMap iteration is already sorted.
        Ok(facts
            .keys()
            .filter(|k| pattern.is_match(k))
            .cloned()
            .collect())
    }

    /// A keyword chosen uniformly at random.
    pub fn random_keyword(&self) -> Result<String, FactoidError> {
        self.random_keyword_with(&mut rand::thread_rng())
    }

    pub fn random_keyword_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String, FactoidError> {
        let keys: Vec<String> = self.facts.read().keys().cloned().collect();
        keys.choose(rng).cloned().ok_or(FactoidError::NotFound)
    }

    /// A copy of the whole database.
    pub fn snapshot(&self) -> BTreeMap<String, FactoidSet> {
        self.facts.read().clone()
    }
}

/// Merge keys that normalize to the same keyword and drop empty sets.
fn normalize_map(on_disk: FactMap) -> FactMap {
    let mut facts = FactMap::new();
    for (keyword, set) in on_disk {
        if set.is_empty() {
            continue;
        }
        let entry = facts.entry(normalize_keyword(&keyword)).or_default();
        for fact in Vec::<Factoid>::from(set) {
            entry.insert(fact);
        }
    }
    facts
}

/// Rewrite the whole database. The caller holds the write lock.
fn sync_to_disk(path: &Path, facts: &FactMap) -> Result<(), FactoidError> {
    let data = serde_json::to_vec(facts)?;
    let sync_err = |source| FactoidError::Sync {
        path: path.to_path_buf(),
        source,
        fact: None,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(sync_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, &data).map_err(sync_err)?;
    std::fs::rename(&tmp, path).map_err(sync_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    fn temp_store() -> (tempfile::TempDir, FactoidStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FactoidStore::open(dir.path().join("factoids.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn set_then_get_all_contains_fact_once() {
        let (_dir, store) = temp_store();
        store.set("Foo", NewFactoid::new("bar").origin("alice")).unwrap();
        store.set("foo", NewFactoid::new("baz")).unwrap();
        let all = store.get_all("FOO").unwrap();
        assert_eq!(all, vec!["bar".to_string(), "baz".to_string()]);
    }

    #[test]
    fn duplicate_set_fails_and_keeps_size() {
        let (_dir, store) = temp_store();
        store.set("foo", NewFactoid::new("bar")).unwrap();
        let err = store.set("foo", NewFactoid::new("bar")).unwrap_err();
        assert!(matches!(err, FactoidError::AlreadyExists));
        assert_eq!(store.get_all("foo").unwrap().len(), 1);
    }

    #[test]
    fn invalid_utf8_is_rejected_without_mutation() {
        let (dir, store) = temp_store();
        let err = store.set("foo", NewFactoid::new(vec![0xc3, 0x28])).unwrap_err();
        assert!(matches!(err, FactoidError::InvalidEncoding));
        assert!(store.is_empty());
        assert!(!dir.path().join("factoids.json").exists());
    }

    #[test]
    fn get_unknown_keyword_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.get("nope"), Err(FactoidError::NotFound)));
        assert!(matches!(store.get_all("nope"), Err(FactoidError::NotFound)));
    }

    #[test]
    fn delete_unique_prefix_removes_only_that_fact() {
        let (_dir, store) = temp_store();
        store.set("beer", NewFactoid::new("cold and tasty")).unwrap();
        store.set("beer", NewFactoid::new("a drink")).unwrap();
        let removed = store.delete("beer", "cold").unwrap();
        assert_eq!(removed.value, "cold and tasty");
        assert_eq!(store.get_all("beer").unwrap(), vec!["a drink".to_string()]);
    }

    #[test]
    fn delete_ambiguous_prefix_changes_nothing() {
        let (_dir, store) = temp_store();
        store.set("beer", NewFactoid::new("a drink")).unwrap();
        store.set("beer", NewFactoid::new("a food group")).unwrap();
        let err = store.delete("beer", "a ").unwrap_err();
        assert!(matches!(err, FactoidError::Ambiguous));
        assert_eq!(store.get_all("beer").unwrap().len(), 2);
    }

    #[test]
    fn delete_without_match_is_not_found() {
        let (_dir, store) = temp_store();
        store.set("beer", NewFactoid::new("a drink")).unwrap();
        assert!(matches!(store.delete("beer", "zzz"), Err(FactoidError::NotFound)));
        assert!(matches!(store.delete("wine", "a"), Err(FactoidError::NotFound)));
    }

    #[test]
    fn deleting_last_fact_prunes_keyword() {
        let (_dir, store) = temp_store();
        store.set("beer", NewFactoid::new("a drink")).unwrap();
        store.delete("beer", "a").unwrap();
        assert!(store.is_empty());
        assert!(store.list_keys("").unwrap().is_empty());
    }

    #[test]
    fn get_is_roughly_uniform() {
        let (_dir, store) = temp_store();
        for v in ["one", "two", "three", "four"] {
            store.set("n", NewFactoid::new(v)).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(0xbe7de7);
        let mut counts = std::collections::HashMap::new();
        let trials = 40_000;
        for _ in 0..trials {
            let fact = store.get_with("n", &mut rng).unwrap();
            *counts.entry(fact.value).or_insert(0usize) += 1;
        }
        assert_eq!(counts.len(), 4);
        let expected = trials / 4;
        for (value, count) in counts {
            let deviation = count.abs_diff(expected);
            assert!(deviation < expected / 10, "{value} drawn {count} times");
        }
    }

    #[test]
    fn reload_reproduces_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("factoids.json");
        let store = FactoidStore::open(&path).unwrap();
        store
            .set("foo", NewFactoid::new("bar").origin("alice").split_word("is", "en"))
            .unwrap();
        store.set("foo", NewFactoid::new("baz")).unwrap();
        store
            .set("øl", NewFactoid::new("godt").origin("bob").split_word("er", "da"))
            .unwrap();

        let reloaded = FactoidStore::open(&path).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[test]
    fn on_disk_format_omits_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factoids.json");
        std::fs::write(
            &path,
            r#"{"Foo":[{"value":"bar"}],"empty":[],"foo":[{"value":"qux","origin":"x"}]}"#,
        )
        .unwrap();
        let store = FactoidStore::open(&path).unwrap();
        assert_eq!(store.list_keys("").unwrap(), vec!["foo".to_string()]);
        assert_eq!(store.get_all("foo").unwrap().len(), 2);

        store.delete("foo", "qux").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"foo":[{"value":"bar"}]}"#);
    }

    #[test]
    fn corrupt_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factoids.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(FactoidStore::open(&path), Err(FactoidError::Parse { .. })));
    }

    #[test]
    fn search_limits_and_counts_the_rest() {
        let (_dir, store) = temp_store();
        for i in 0..7 {
            store.set(&format!("key{i}"), NewFactoid::new(format!("beer number {i}"))).unwrap();
        }
        store.set("other", NewFactoid::new("wine")).unwrap();
        let re = Regex::new("beer").unwrap();
        let results = store.search(&re, 5);
        assert_eq!(results.matches.len(), 5);
        assert_eq!(results.additional, 2);
        assert!(results.matches.iter().all(|(_, f)| f.value.contains("beer")));

        let none = store.search(&Regex::new("whisky").unwrap(), 5);
        assert!(none.matches.is_empty());
        assert_eq!(none.additional, 0);
    }

    #[test]
    fn list_keys_is_sorted_and_anchored() {
        let (_dir, store) = temp_store();
        for k in ["beer", "bacon", "abe", "b"] {
            store.set(k, NewFactoid::new("x")).unwrap();
        }
        assert_eq!(store.list_keys("b").unwrap(), vec!["b", "bacon", "beer"]);
        assert!(matches!(store.list_keys("("), Err(FactoidError::InvalidPattern(_))));
    }

    #[test]
    fn random_keyword_covers_all_keys() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.random_keyword(), Err(FactoidError::NotFound)));
        for k in ["a", "b", "c"] {
            store.set(k, NewFactoid::new("x")).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(7);
        let seen: std::collections::HashSet<String> =
            (0..200).map(|_| store.random_keyword_with(&mut rng).unwrap()).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn sync_failure_keeps_fact_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // The database path is a directory, so the rename fails.
        let path = dir.path().join("factoids.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), "x").unwrap();
        let store = FactoidStore {
            path: path.clone(),
            facts: RwLock::new(FactMap::new()),
        };
        let err = store.set("foo", NewFactoid::new("bar")).unwrap_err();
        assert!(matches!(err, FactoidError::Sync { fact: Some(ref f), .. } if f.value == "bar"));
        assert_eq!(store.get_all("foo").unwrap(), vec!["bar".to_string()]);

        let err = store.delete("foo", "b").unwrap_err();
        assert!(matches!(err, FactoidError::Sync { fact: Some(ref f), .. } if f.value == "bar"));
        assert!(store.get_all("foo").is_err());
    }

    #[test]
    fn concurrent_writers_all_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factoids.json");
        let store = Arc::new(FactoidStore::open(&path).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.set("shared", NewFactoid::new(format!("{t}-{i}"))).unwrap();
                        let _ = store.get("shared").unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(store.get_all("shared").unwrap().len(), 80);
        let reloaded = FactoidStore::open(&path).unwrap();
        assert_eq!(reloaded.get_all("shared").unwrap().len(), 80);
    }
}
