//! Reverse index from tags to the cache keys that provide them.

use std::collections::{HashMap, HashSet};

use super::traits::Tag;

#[derive(Debug, Default)]
pub struct TagIndex {
  by_tag: HashMap<Tag, HashSet<String>>,
  by_key: HashMap<String, HashSet<Tag>>,
}

impl TagIndex {
  /// Replace the tags provided by `key`.
  pub fn provide(&mut self, key: &str, tags: impl IntoIterator<Item = Tag>) {
    self.remove_key(key);

    let tags: HashSet<Tag> = tags.into_iter().collect();
    if tags.is_empty() {
      return;
    }
    for tag in &tags {
      self
        .by_tag
        .entry(tag.clone())
        .or_default()
        .insert(key.to_string());
    }
    self.by_key.insert(key.to_string(), tags);
  }

  /// Keys providing any of `tags`, each reported once.
  pub fn keys_for<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for tag in tags {
      if let Some(set) = self.by_tag.get(tag) {
        for key in set {
          if seen.insert(key.as_str()) {
            keys.push(key.clone());
          }
        }
      }
    }
    keys
  }

  pub fn remove_key(&mut self, key: &str) {
    let Some(tags) = self.by_key.remove(key) else {
      return;
    };
    for tag in tags {
      if let Some(set) = self.by_tag.get_mut(&tag) {
        set.remove(key);
        if set.is_empty() {
          self.by_tag.remove(&tag);
        }
      }
    }
  }

  pub fn clear(&mut self) {
    self.by_tag.clear();
    self.by_key.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  impl TagIndex {
    fn is_empty(&self) -> bool {
      self.by_key.is_empty() && self.by_tag.is_empty()
    }
  }

  #[test]
  fn test_lookup_by_tag() {
    let mut index = TagIndex::default();
    index.provide("list-a", [Tag::list("Products")]);
    index.provide("list-b", [Tag::list("Products")]);
    index.provide("detail-p1", [Tag::id("Products", "p1")]);

    let mut keys = index.keys_for(&[Tag::list("Products")]);
    keys.sort();
    assert_eq!(keys, vec!["list-a", "list-b"]);

    let keys = index.keys_for(&[Tag::id("Products", "p1"), Tag::list("Products")]);
    assert_eq!(keys.len(), 3);

    assert!(index.keys_for(&[Tag::list("Categories")]).is_empty());
  }

  #[test]
  fn test_provide_replaces_previous_tags() {
    let mut index = TagIndex::default();
    index.provide("k", [Tag::id("Products", "p1")]);
    index.provide("k", [Tag::id("Products", "p2")]);

    assert!(index.keys_for(&[Tag::id("Products", "p1")]).is_empty());
    assert_eq!(index.keys_for(&[Tag::id("Products", "p2")]), vec!["k"]);
  }

  #[test]
  fn test_remove_key_cleans_both_sides() {
    let mut index = TagIndex::default();
    index.provide("k", [Tag::list("Products"), Tag::id("Products", "p1")]);
    index.remove_key("k");

    assert!(index.is_empty());
    assert!(index.keys_for(&[Tag::list("Products")]).is_empty());
    assert!(!index.by_key.contains_key("k"));
  }
}
