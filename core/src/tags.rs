//! Tag diffing primitives.
//!
//! Everything in this module is pure: the audit coordinator and the update
//! worker both call into it, and the correctness of the whole pipeline rests
//! on these two functions returning exactly the right map in every edge case.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// A set of resource tags: unique, case-sensitive keys mapped to values.
///
/// Iteration order is not meaningful. "No tags at all" (a resource or group
/// whose tag collection is absent) is modeled as `Option<TagSet>` at call
/// sites, which is a different state than an empty `TagSet`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Returns the subset of `group_tags` whose key appears in `required_keys`.
///
/// An empty result means "nothing to sync for this group". The distinct case
/// of a group with no tag collection at all is handled by the caller before
/// this is reached.
pub fn required_tags_present(group_tags: &TagSet, required_keys: &[String]) -> TagSet {
    group_tags
        .iter()
        .filter(|(key, _)| required_keys.iter().any(|required| required == key))
        .collect()
}

/// Computes the tag set to write to a resource so it converges with `target`.
///
/// Returns an empty set when the resource already carries every target key
/// with an equal value ("no update needed"). Otherwise returns the **full**
/// merged set: all of the resource's existing tags plus the added/corrected
/// target entries. The downstream patch replaces the resource's entire tag
/// collection, so a bare delta would wipe unrelated tags.
///
/// A resource with no tag collection at all (`resource_tags` is `None`) gets
/// `target` verbatim.
pub fn compute_tag_update(resource_tags: Option<&TagSet>, target: &TagSet) -> TagSet {
    let Some(current) = resource_tags else {
        return target.clone();
    };

    let mut merged = current.clone();
    let mut changed = false;
    for (key, value) in target.iter() {
        if current.get(key) != Some(value) {
            merged.insert(key, value);
            changed = true;
        }
    }

    if changed { merged } else { TagSet::new() }
}
