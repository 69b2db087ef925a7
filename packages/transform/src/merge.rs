//! Deterministic merging of partial results.
//!
//! When several transform processors (or visitors) annotate the same
//! element, their contributions are combined with [`merge_objects`]:
//!
//! - arrays concatenate when `merge_arrays` is set
//! - objects merge recursively when `deep_merge` is set
//! - everything else is a conflict, settled by `custom_merge` first and
//!   then by `conflict_strategy`

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ConflictStrategy {
    FirstWins,
    #[default]
    LastWins,
}

/// Consulted for every key before the built-in rules; `Some` wins.
pub type CustomMergeFn = Arc<dyn Fn(&str, &Value, &Value) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub struct MergeOptions {
    pub deep_merge: bool,
    pub merge_arrays: bool,
    pub conflict_strategy: ConflictStrategy,
    pub custom_merge: Option<CustomMergeFn>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            deep_merge: true,
            merge_arrays: false,
            conflict_strategy: ConflictStrategy::LastWins,
            custom_merge: None,
        }
    }
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deep_merge(mut self, deep: bool) -> Self {
        self.deep_merge = deep;
        self
    }

    pub fn with_merge_arrays(mut self, merge: bool) -> Self {
        self.merge_arrays = merge;
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    pub fn with_custom_merge(
        mut self,
        f: impl Fn(&str, &Value, &Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.custom_merge = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("deep_merge", &self.deep_merge)
            .field("merge_arrays", &self.merge_arrays)
            .field("conflict_strategy", &self.conflict_strategy)
            .field("custom_merge", &self.custom_merge.is_some())
            .finish()
    }
}

/// Merge two values found under `key`.
pub fn merge_values(key: &str, first: &Value, last: &Value, options: &MergeOptions) -> Value {
    if let Some(custom) = &options.custom_merge {
        if let Some(merged) = custom(key, first, last) {
            return merged;
        }
    }

    match (first, last) {
        (Value::Array(a), Value::Array(b)) if options.merge_arrays => {
            Value::Array(a.iter().chain(b).cloned().collect())
        }
        (Value::Object(a), Value::Object(b)) if options.deep_merge => {
            Value::Object(merge_objects(a, b, options))
        }
        _ => resolve_conflict(first, last, options.conflict_strategy),
    }
}

/// Merge two objects key by key. Keys keep their first-seen order.
pub fn merge_objects(
    first: &Map<String, Value>,
    last: &Map<String, Value>,
    options: &MergeOptions,
) -> Map<String, Value> {
    let mut merged = first.clone();
    for (key, value) in last {
        let combined = match first.get(key) {
            Some(existing) => merge_values(key, existing, value, options),
            None => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

/// Fold a sequence of partial results, left to right.
pub fn merge_all<'a>(
    values: impl IntoIterator<Item = &'a Map<String, Value>>,
    options: &MergeOptions,
) -> Map<String, Value> {
    values
        .into_iter()
        .fold(Map::new(), |acc, next| merge_objects(&acc, next, options))
}

fn resolve_conflict(first: &Value, last: &Value, strategy: ConflictStrategy) -> Value {
    match strategy {
        ConflictStrategy::FirstWins => first.clone(),
        ConflictStrategy::LastWins => last.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_deep_merge_last_wins() {
        let a = object(json!({"style": {"color": "red", "size": "large"}, "tags": ["a"]}));
        let b = object(json!({"style": {"size": "small"}, "tags": ["b"], "new": 1}));

        let merged = merge_objects(&a, &b, &MergeOptions::default());
        assert_eq!(
            Value::Object(merged),
            json!({"style": {"color": "red", "size": "small"}, "tags": ["b"], "new": 1})
        );
    }

    #[test]
    fn test_shallow_merge_replaces_nested_objects() {
        let a = object(json!({"style": {"color": "red"}}));
        let b = object(json!({"style": {"size": "small"}}));

        let merged = merge_objects(&a, &b, &MergeOptions::new().with_deep_merge(false));
        assert_eq!(Value::Object(merged), json!({"style": {"size": "small"}}));
    }

    #[test]
    fn test_array_concatenation() {
        let merged = merge_values(
            "tags",
            &json!(["a"]),
            &json!(["b", "c"]),
            &MergeOptions::new().with_merge_arrays(true),
        );
        assert_eq!(merged, json!(["a", "b", "c"]));
    }

    #[test]
    fn test_first_wins() {
        let options = MergeOptions::new().with_conflict_strategy(ConflictStrategy::FirstWins);
        assert_eq!(merge_values("k", &json!(1), &json!(2), &options), json!(1));
        // Mismatched shapes are conflicts too
        assert_eq!(
            merge_values("k", &json!({"a": 1}), &json!([1]), &options),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_custom_merge_consulted_at_every_level() {
        let options = MergeOptions::new().with_custom_merge(|key, a, b| match (key, a, b) {
            ("count", Value::Number(a), Value::Number(b)) => {
                Some(json!(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0)))
            }
            _ => None,
        });

        let a = object(json!({"count": 1, "nested": {"count": 10, "name": "x"}}));
        let b = object(json!({"count": 2, "nested": {"count": 5, "name": "y"}}));
        let merged = merge_objects(&a, &b, &options);
        assert_eq!(
            Value::Object(merged),
            json!({"count": 3, "nested": {"count": 15, "name": "y"}})
        );
    }

    #[test]
    fn test_merge_is_idempotent_for_last_wins() {
        let options = MergeOptions::default();
        let a = object(json!({"a": 1, "list": [1, 2], "deep": {"x": 1, "y": {"z": 1}}}));
        let b = object(json!({"a": 2, "list": [3], "deep": {"y": {"z": 2, "w": 3}}, "b": null}));

        let once = merge_objects(&a, &b, &options);
        let twice = merge_objects(&once, &b, &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_all() {
        let parts = [
            object(json!({"language": "rust"})),
            object(json!({"lineCount": 3})),
            object(json!({"language": "python"})),
        ];
        let merged = merge_all(&parts, &MergeOptions::default());
        assert_eq!(
            Value::Object(merged),
            json!({"language": "python", "lineCount": 3})
        );
    }
}
