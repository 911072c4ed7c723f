//! Shared key/value store for passing data between jobs.
//!
//! One [`FlowState`] is created per engine run and handed to every stateful job as an
//! `Arc<FlowState>`. Each method takes the lock once, so individual calls are atomic
//! with respect to each other. Multi-step read-modify-write sequences performed by
//! concurrently running jobs should go through [`FlowState::compare_and_swap`] or
//! [`FlowState::get_or_set`] instead of a separate `get` followed by `set`.

use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

use crate::error::StateError;

/// Concurrency-safe associative store of JSON values.
///
/// # Examples
///
/// ```
/// use jobflow::FlowState;
/// use serde_json::json;
///
/// let state = FlowState::new();
/// state.set("attempts", json!(1));
///
/// assert_eq!(state.get_i64("attempts"), Some(1));
/// assert_eq!(state.get_string("attempts"), None); // no implicit conversion
///
/// // Only one caller can claim an absent key.
/// assert!(state.compare_and_swap("owner", json!(null), json!("job_a")));
/// assert!(!state.compare_and_swap("owner", json!(null), json!("job_b")));
/// ```
#[derive(Debug, Default)]
pub struct FlowState {
    values: RwLock<HashMap<String, JsonValue>>,
}

impl FlowState {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given values.
    pub fn from_values(values: HashMap<String, JsonValue>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: JsonValue) {
        self.values.write().insert(key.into(), value);
    }

    /// Removes a key, returning its previous value.
    pub fn delete(&self, key: &str) -> Option<JsonValue> {
        self.values.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    }

    /// Returns the value if it is stored as an integer.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.read().get(key).and_then(JsonValue::as_i64)
    }

    /// Returns the value if it is stored as a floating-point number.
    ///
    /// Integers are not converted.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values
            .read()
            .get(key)
            .filter(|value| value.is_f64())
            .and_then(JsonValue::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).and_then(JsonValue::as_bool)
    }

    pub fn get_map(&self, key: &str) -> Option<Map<String, JsonValue>> {
        self.values.read().get(key).and_then(JsonValue::as_object).cloned()
    }

    pub fn get_slice(&self, key: &str) -> Option<Vec<JsonValue>> {
        self.values.read().get(key).and_then(JsonValue::as_array).cloned()
    }

    /// Inserts every entry, overwriting existing keys, under a single lock.
    pub fn set_all(&self, entries: impl IntoIterator<Item = (String, JsonValue)>) {
        let mut values = self.values.write();
        for (key, value) in entries {
            values.insert(key, value);
        }
    }

    /// Returns a snapshot copy of every entry.
    pub fn get_all(&self) -> HashMap<String, JsonValue> {
        self.values.read().clone()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }

    /// Replaces the value at `key` with `new` if the current value equals `old`.
    ///
    /// An absent key matches an `old` of `null`. Returns `true` if the swap happened;
    /// otherwise the store is left untouched.
    pub fn compare_and_swap(&self, key: &str, old: JsonValue, new: JsonValue) -> bool {
        let mut values = self.values.write();
        let matches = match values.get(key) {
            Some(current) => *current == old,
            None => old.is_null(),
        };
        if matches {
            values.insert(key.to_string(), new);
        }
        matches
    }

    /// Returns the value at `key`, inserting `default` first if the key is absent.
    pub fn get_or_set(&self, key: &str, default: JsonValue) -> JsonValue {
        if let Some(value) = self.values.read().get(key) {
            return value.clone();
        }
        self.values
            .write()
            .entry(key.to_string())
            .or_insert(default)
            .clone()
    }

    /// Applies `f` to the current value (if any) and stores the returned value, atomically.
    pub fn update<F>(&self, key: &str, f: F) -> JsonValue
    where
        F: FnOnce(Option<&JsonValue>) -> JsonValue,
    {
        let mut values = self.values.write();
        let next = f(values.get(key));
        values.insert(key.to_string(), next.clone());
        next
    }

    /// Copies every entry of `other` into `self`, overwriting keys present in both.
    pub fn merge(&self, other: &FlowState) {
        // Snapshot first so merging a state into itself does not deadlock.
        let incoming = other.get_all();
        self.set_all(incoming);
    }

    /// Renders a minijinja template against a snapshot of the store.
    pub fn render(&self, template: &str) -> Result<String, StateError> {
        use minijinja::Environment;

        let snapshot = self.get_all();
        let env = Environment::new();
        let tmpl = env
            .template_from_str(template)
            .map_err(|e| StateError::TemplateRender(e.to_string()))?;

        tmpl.render(&snapshot)
            .map_err(|e| StateError::TemplateRender(e.to_string()))
    }
}

impl Clone for FlowState {
    /// Produces an independent copy; later mutations on either side are not shared.
    fn clone(&self) -> Self {
        Self::from_values(self.get_all())
    }
}

impl From<HashMap<String, JsonValue>> for FlowState {
    fn from(values: HashMap<String, JsonValue>) -> Self {
        Self::from_values(values)
    }
}
