//! Evaluator factory: shared configuration plus a bounded MRU cache mapping
//! a definition set's composite key to its evaluator.
//!
//! Grounded on `bingo-core::cache::LruCache`'s hand-rolled MRU container
//! and on `bingo-core::calculator_cache` for the "construct once per
//! fingerprint" shape.

use crate::adapter::ExpressionAdapter;
use crate::definition::{FormulaDefinition, RoundingOptions};
use crate::engine::FormulaEvaluator;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Value-equality key for a definition set: the sorted concatenation of
/// each definition's `formula_id`, joined by a separator byte absent from
/// any reasonable `formula_id` spelling.
///
/// Two definition sets with the same identifiers but different expressions
/// collide unless `formula_id` encodes expression content — that contract
/// lives on [`FormulaDefinition::formula_id`], not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormulaDefinitionsKey(String);

impl FormulaDefinitionsKey {
    pub fn new(definitions: &[FormulaDefinition]) -> Self {
        let mut ids: Vec<&str> = definitions.iter().map(|d| d.formula_id.as_str()).collect();
        ids.sort_unstable();
        Self(ids.join("\u{1f}"))
    }
}

/// A singly-linked most-recently-used cache: `get` moves an entry to the
/// front; insertion past capacity evicts the tail. Modeled on
/// `bingo-core::cache::LruCache`'s `Vec`-backed recency order — appropriate
/// at this cache's expected size (a handful to a few hundred live
/// evaluators), where a doubly-linked intrusive list would be overkill.
struct LruCache<K, V> {
    capacity: usize,
    entries: Vec<(K, V)>,
}

impl<K: PartialEq, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Vec::new() }
    }

    fn get(&mut self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(index);
        let value = entry.1.clone();
        self.entries.push(entry);
        Some(value)
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(index) = self.entries.iter().position(|(k, _)| k == &key) {
            self.entries.remove(index);
        } else if self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push((key, value));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Shared, immutable construction-time policy plus the MRU evaluator cache
/// and a lazily-built standalone parser.
pub struct FormulaEvaluatorFactory {
    denied_names: HashSet<String>,
    rounding_options: Option<RoundingOptions>,
    evaluators: Mutex<LruCache<FormulaDefinitionsKey, Arc<FormulaEvaluator>>>,
    parser: Mutex<Option<Arc<ExpressionAdapter>>>,
}

impl FormulaEvaluatorFactory {
    pub fn new(denied_names: HashSet<String>, rounding_options: Option<RoundingOptions>) -> Self {
        Self {
            denied_names,
            rounding_options,
            evaluators: Mutex::new(LruCache::new(DEFAULT_CACHE_CAPACITY)),
            parser: Mutex::new(None),
        }
    }

    pub fn with_capacity(
        denied_names: HashSet<String>,
        rounding_options: Option<RoundingOptions>,
        capacity: usize,
    ) -> Self {
        Self {
            denied_names,
            rounding_options,
            evaluators: Mutex::new(LruCache::new(capacity)),
            parser: Mutex::new(None),
        }
    }

    /// Return the cached evaluator for `definitions`' composite key,
    /// constructing and inserting one on a miss.
    pub fn get_evaluator(&self, definitions: Vec<FormulaDefinition>) -> Arc<FormulaEvaluator> {
        let key = FormulaDefinitionsKey::new(&definitions);
        let mut cache = self.evaluators.lock().expect("evaluator cache mutex poisoned");
        if let Some(evaluator) = cache.get(&key) {
            debug!("evaluator cache hit");
            return evaluator;
        }
        debug!("evaluator cache miss, constructing");
        let adapter = ExpressionAdapter::new(self.denied_names.clone());
        let evaluator = Arc::new(FormulaEvaluator::new(definitions, adapter, self.rounding_options));
        cache.insert(key, evaluator.clone());
        evaluator
    }

    /// The lazily-constructed, shared standalone parser used for
    /// front-end validation of single expressions against the same
    /// denied-names policy, with no definitions bound.
    pub fn get_parser(&self) -> Arc<ExpressionAdapter> {
        let mut slot = self.parser.lock().expect("parser mutex poisoned");
        if let Some(existing) = &*slot {
            return existing.clone();
        }
        let parser = Arc::new(ExpressionAdapter::new(self.denied_names.clone()));
        *slot = Some(parser.clone());
        parser
    }

    /// Drop every cached evaluator; the next `get_evaluator` call for any
    /// key reconstructs from scratch. For hosts that mutate a definition's
    /// expression without changing its `formula_id`.
    pub fn flush_evaluators_cache(&self) {
        self.evaluators.lock().expect("evaluator cache mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    fn defs() -> Vec<FormulaDefinition> {
        vec![FormulaDefinition::new("a", Type::Integer, "2 + 3")]
    }

    #[test]
    fn same_composite_key_returns_the_same_cached_evaluator() {
        let factory = FormulaEvaluatorFactory::new(HashSet::new(), None);
        let e1 = factory.get_evaluator(defs());
        let e2 = factory.get_evaluator(defs());
        assert!(Arc::ptr_eq(&e1, &e2));
    }

    #[test]
    fn flush_forces_reconstruction() {
        let factory = FormulaEvaluatorFactory::new(HashSet::new(), None);
        let e1 = factory.get_evaluator(defs());
        factory.flush_evaluators_cache();
        let e2 = factory.get_evaluator(defs());
        assert!(!Arc::ptr_eq(&e1, &e2));
    }

    #[test]
    fn composite_key_ignores_definition_order() {
        let mut reordered = defs();
        reordered.push(FormulaDefinition::new("b", Type::Integer, "1"));
        let forward = FormulaDefinitionsKey::new(&reordered);
        reordered.reverse();
        let backward = FormulaDefinitionsKey::new(&reordered);
        assert_eq!(forward, backward);
    }

    #[test]
    fn lru_cache_evicts_least_recently_used_past_capacity() {
        let mut cache: LruCache<i32, &str> = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.get(&1); // 1 is now most-recent
        cache.insert(3, "c"); // evicts 2, not 1
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some("c"));
    }
}
